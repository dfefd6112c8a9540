//! SHA-256 checksums over seekable streams.
//!
//! Streams are always hashed from the start, one block at a time, and are
//! rewound afterwards so the same bytes can be written into the archive.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

/// Width of a hex-encoded checksum. Manifest backpatching relies on it.
pub const CHECKSUM_HEX_LEN: usize = 64;

/// A SHA-256 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Hash an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self::from_digest(&Sha256::digest(data))
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, always `CHECKSUM_HEX_LEN` characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash `reader` from its start to EOF in blocks of `block_size` bytes.
///
/// Returns the checksum and the number of bytes hashed. The stream is left
/// positioned at its start.
pub fn digest_stream<R: Read + Seek + ?Sized>(
    reader: &mut R,
    block_size: usize,
) -> io::Result<(Checksum, u64)> {
    reader.seek(SeekFrom::Start(0))?;

    let mut hasher = Sha256::new();
    let mut block = vec![0u8; block_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&block[..n]);
        total += n as u64;
    }

    reader.seek(SeekFrom::Start(0))?;
    Ok((Checksum::from_digest(&hasher.finalize()), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // sha256("abc")
    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn known_vector() {
        assert_eq!(Checksum::of_bytes(b"abc").to_hex(), ABC);
        assert_eq!(Checksum::of_bytes(b"abc").to_hex().len(), CHECKSUM_HEX_LEN);
        assert_eq!(hex::encode(Checksum::of_bytes(b"abc").as_bytes()), ABC);
    }

    #[test]
    fn stream_digest_matches_buffer_digest_for_any_block_size() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = Checksum::of_bytes(&data);
        for block in [1, 7, 512, 4096, 1 << 20] {
            let mut cursor = Cursor::new(data.clone());
            let (sum, len) = digest_stream(&mut cursor, block).unwrap();
            assert_eq!(sum, expected, "block size {block}");
            assert_eq!(len, data.len() as u64);
        }
    }

    #[test]
    fn stream_is_rewound_and_hashed_from_start() {
        let mut cursor = Cursor::new(b"abc".to_vec());
        cursor.set_position(2);
        let (sum, len) = digest_stream(&mut cursor, 16).unwrap();
        assert_eq!(sum.to_hex(), ABC);
        assert_eq!(len, 3);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn empty_stream() {
        let (sum, len) = digest_stream(&mut Cursor::new(Vec::new()), 16).unwrap();
        assert_eq!(len, 0);
        assert_eq!(
            sum.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
