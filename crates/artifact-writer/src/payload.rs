//! Payloads: the update components carried by an artifact.
//!
//! Payload `N` (0-based, in insertion order) is addressed as
//! `data/NNNN/<basename>`; its file is embedded in the structural entry
//! `data/NNNN.tar.gz` and its metadata lives under `headers/NNNN/`.

use crate::archive::{self, Container};
use crate::checksum::{digest_stream, Checksum};
use crate::config::BuildOptions;
use crate::error::{ArtifactError, Result};
use crate::Metadata;
use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// Payload type used when none is given.
pub const DEFAULT_PAYLOAD_TYPE: &str = "rootfs-image";

/// Any seekable byte stream can back a payload: files, cursors, ...
pub trait PayloadSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> PayloadSource for T {}

/// One update component.
pub struct Payload {
    source: Box<dyn PayloadSource>,
    name: Option<String>,
    payload_type: String,
    depends: Option<Metadata>,
    provides: Option<Metadata>,
}

impl Payload {
    pub fn new(source: impl PayloadSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            name: None,
            payload_type: DEFAULT_PAYLOAD_TYPE.to_string(),
            depends: None,
            provides: None,
        }
    }

    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Self {
        Self::new(Cursor::new(content.into()))
    }

    /// File name inside the payload archive. Defaults to `rootfs-NNNN.ext4`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, payload_type: impl Into<String>) -> Self {
        self.payload_type = payload_type.into();
        self
    }

    pub fn with_depends(mut self, depends: Metadata) -> Self {
        self.depends = Some(depends);
        self
    }

    pub fn with_provides(mut self, provides: Metadata) -> Self {
        self.provides = Some(provides);
        self
    }

    pub fn payload_type(&self) -> &str {
        &self.payload_type
    }

    pub fn depends(&self) -> Option<&Metadata> {
        self.depends.as_ref()
    }

    pub fn provides(&self) -> Option<&Metadata> {
        self.provides.as_ref()
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Rewind the content stream so callers can re-read it.
    pub fn rewind(&mut self) -> std::io::Result<()> {
        self.source.seek(SeekFrom::Start(0)).map(|_| ())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("name", &self.name)
            .field("payload_type", &self.payload_type)
            .field("depends", &self.depends)
            .field("provides", &self.provides)
            .finish_non_exhaustive()
    }
}

/// Position and file name of a payload inside the artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PayloadEntry {
    index: usize,
    basename: String,
}

impl PayloadEntry {
    pub(crate) fn new(index: usize, name: Option<&str>) -> Result<Self> {
        let basename = match name {
            Some(name) => name.to_string(),
            None => format!("rootfs-{index:04}.ext4"),
        };
        if basename.is_empty() || basename.contains('/') || basename == "." || basename == ".." {
            return Err(ArtifactError::validation(format!(
                "payload {index}: invalid file name '{basename}'"
            )));
        }
        if index > 9999 {
            return Err(ArtifactError::validation(format!(
                "payload {index}: at most 10000 payloads are supported"
            )));
        }
        Ok(Self { index, basename })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// `data/NNNN`
    pub fn directory(&self) -> String {
        format!("data/{:04}", self.index)
    }

    /// `data/NNNN/<basename>`: the manifest key of this payload.
    pub fn entry_name(&self) -> String {
        format!("{}/{}", self.directory(), self.basename)
    }

    /// `data/NNNN.tar.gz`: the structural entry holding the payload.
    pub fn archive_name(&self) -> String {
        format!("{}.tar.gz", self.directory())
    }

    /// `headers/NNNN`: where the payload's metadata lives in `header.tar.gz`.
    pub fn header_directory(&self) -> String {
        format!("headers/{:04}", self.index)
    }
}

/// Embed `payload` into `outer` as `data/NNNN.tar.gz` and return the
/// checksum of its raw content.
///
/// The content is hashed first, then rewound and streamed into the embedded
/// archive, so the embedded bytes are exactly the hashed bytes.
pub(crate) fn write_payload<W: Write>(
    outer: &mut Container<W>,
    entry: &PayloadEntry,
    payload: &mut Payload,
    options: &BuildOptions,
) -> Result<Checksum> {
    let (checksum, len) = digest_stream(&mut payload.source, options.read_block_size)?;

    let mut inner = archive::compressed(options);
    inner.write_entry(entry.basename(), &mut payload.source, len)?;
    let compressed = inner.finish()?;
    payload.rewind()?;

    outer.write_bytes(&entry.archive_name(), &compressed)?;
    tracing::debug!(
        entry = %entry.entry_name(),
        raw_bytes = len,
        compressed_bytes = compressed.len(),
        "payload written"
    );
    Ok(checksum)
}
