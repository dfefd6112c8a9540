//! Deterministic tar containers.
//!
//! An artifact is a plain tar whose entries are either small documents or
//! gzip-compressed tars built with the same primitive. Every header is fixed
//! (mtime 0, uid/gid 0, mode 0644) so identical inputs give identical bytes.

use crate::config::BuildOptions;
use crate::error::Result;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::io::{self, Read, Write};
use tar::{Archive, Builder, EntryType, Header};

/// A tar archive under construction.
pub(crate) struct Container<W: Write> {
    tar: Builder<W>,
    owner: String,
}

impl<W: Write> Container<W> {
    pub(crate) fn new(writer: W, owner: &str) -> Self {
        let mut tar = Builder::new(writer);
        tar.mode(tar::HeaderMode::Deterministic);
        Self {
            tar,
            owner: owner.to_string(),
        }
    }

    /// Append `len` bytes read from `data` as a regular file named `path`.
    pub(crate) fn write_entry<R: Read>(&mut self, path: &str, data: R, len: u64) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(len);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);
        header.set_username(&self.owner)?;
        header.set_groupname(&self.owner)?;

        let mut counted = CountingReader::new(data.take(len));
        self.tar.append_data(&mut header, path, &mut counted)?;
        if counted.count != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{path}: expected {len} bytes, stream ended after {}", counted.count),
            )
            .into());
        }
        Ok(())
    }

    pub(crate) fn write_bytes(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.write_entry(path, data, data.len() as u64)
    }

    /// Write the end-of-archive marker and return the underlying writer.
    pub(crate) fn into_inner(self) -> Result<W> {
        Ok(self.tar.into_inner()?)
    }
}

/// A gzip-compressed tar built in memory, embedded as one entry of its parent.
pub(crate) type CompressedContainer = Container<GzEncoder<Vec<u8>>>;

pub(crate) fn compressed(options: &BuildOptions) -> CompressedContainer {
    let encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(Vec::new(), Compression::new(options.compression_level));
    Container::new(encoder, &options.owner_name)
}

impl CompressedContainer {
    pub(crate) fn finish(self) -> Result<Vec<u8>> {
        let encoder = self.into_inner()?;
        Ok(encoder.finish()?)
    }
}

/// Byte offset of the data of entry `name` inside a finished, uncompressed tar.
pub(crate) fn entry_data_offset(archive: &[u8], name: &str) -> Result<Option<u64>> {
    let mut reader = Archive::new(archive);
    for entry in reader.entries()? {
        let entry = entry?;
        if entry.path_bytes().as_ref() == name.as_bytes() {
            return Ok(Some(entry.raw_file_position()));
        }
    }
    Ok(None)
}

/// Counts bytes so short streams are reported instead of silently zero-padded.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
