//! The integrity manifest and its backpatching.
//!
//! The manifest entry is written into the outer archive before any of the
//! checksums it lists are known. Each line starts out as
//! `<64 zeros>  <filename>\n`; the offset of the zero field is recorded, and
//! once every entry has been appended the zeros are overwritten in place
//! inside the finished archive. Checksums are fixed width, so patching never
//! changes the archive length.
//!
//! States: [`ManifestDraft`] (placeholders serialized) -> [`PendingManifest`]
//! (collecting checksums) -> `Vec<ManifestEntry>` (patched).

use crate::archive;
use crate::checksum::{Checksum, CHECKSUM_HEX_LEN};
use crate::error::{ArtifactError, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the manifest entry in the outer archive.
pub const MANIFEST_ENTRY: &str = "manifest";

/// Name of the format descriptor entry in the outer archive.
pub const VERSION_ENTRY: &str = "version";

const PLACEHOLDER: [u8; CHECKSUM_HEX_LEN] = [b'0'; CHECKSUM_HEX_LEN];

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub checksum: Checksum,
    pub filename: String,
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}", self.checksum, self.filename)
    }
}

/// Order of the manifest lines: payloads last-added first, then the
/// header, then the format descriptor.
pub fn manifest_order<I, S>(payload_entry_names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    I::IntoIter: DoubleEndedIterator,
    S: Into<String>,
{
    payload_entry_names
        .into_iter()
        .rev()
        .map(Into::into)
        .chain([
            crate::header::HEADER_ENTRY.to_string(),
            VERSION_ENTRY.to_string(),
        ])
        .collect()
}

#[derive(Debug, Clone)]
struct Slot {
    filename: String,
    /// Offset of the checksum field, relative to the manifest's first byte.
    offset: usize,
}

/// Manifest content with zero-filled checksum fields.
#[derive(Debug)]
pub(crate) struct ManifestDraft {
    body: Vec<u8>,
    slots: Vec<Slot>,
}

impl ManifestDraft {
    pub(crate) fn new(order: &[String]) -> Result<Self> {
        let mut body = Vec::new();
        let mut slots: Vec<Slot> = Vec::with_capacity(order.len());
        for filename in order {
            if slots.iter().any(|slot| &slot.filename == filename) {
                return Err(ArtifactError::validation(format!(
                    "duplicate manifest entry '{filename}'"
                )));
            }
            slots.push(Slot {
                filename: filename.clone(),
                offset: body.len(),
            });
            body.extend_from_slice(&PLACEHOLDER);
            body.extend_from_slice(b"  ");
            body.extend_from_slice(filename.as_bytes());
            body.push(b'\n');
        }
        Ok(Self { body, slots })
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    /// The manifest has been written; start collecting checksums.
    pub(crate) fn into_pending(self) -> PendingManifest {
        PendingManifest {
            slots: self.slots,
            checksums: BTreeMap::new(),
        }
    }
}

/// Checksums computed after the manifest entry was written.
#[derive(Debug)]
pub(crate) struct PendingManifest {
    slots: Vec<Slot>,
    checksums: BTreeMap<String, Checksum>,
}

impl PendingManifest {
    pub(crate) fn record(&mut self, filename: &str, checksum: Checksum) -> Result<()> {
        if !self.slots.iter().any(|slot| slot.filename == filename) {
            return Err(ArtifactError::backpatch(filename, "no manifest line for entry"));
        }
        if self.checksums.insert(filename.to_string(), checksum).is_some() {
            return Err(ArtifactError::backpatch(filename, "checksum recorded twice"));
        }
        Ok(())
    }

    /// Overwrite every placeholder inside the finished outer archive.
    ///
    /// Takes a slice: finalizing can only overwrite bytes, never resize.
    pub(crate) fn finalize(self, buffer: &mut [u8]) -> Result<Vec<ManifestEntry>> {
        let start = archive::entry_data_offset(buffer, MANIFEST_ENTRY)?
            .ok_or(ArtifactError::ManifestNotFound)? as usize;

        let mut entries = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            let checksum = *self
                .checksums
                .get(&slot.filename)
                .ok_or_else(|| ArtifactError::backpatch(&slot.filename, "checksum missing"))?;

            let at = start + slot.offset;
            let field = buffer
                .get_mut(at..at + CHECKSUM_HEX_LEN)
                .ok_or_else(|| ArtifactError::backpatch(&slot.filename, "offset out of range"))?;
            if field != PLACEHOLDER {
                return Err(ArtifactError::backpatch(
                    &slot.filename,
                    format!("no placeholder at offset {at}"),
                ));
            }
            field.copy_from_slice(checksum.to_hex().as_bytes());
            tracing::trace!(
                entry = %slot.filename,
                offset = at,
                %checksum,
                "manifest line patched"
            );

            entries.push(ManifestEntry {
                checksum,
                filename: slot.filename,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Container;

    fn order() -> Vec<String> {
        manifest_order(["data/0000/a", "data/0001/b", "data/0002/c"])
    }

    #[test]
    fn order_is_reverse_structural() {
        assert_eq!(
            order(),
            vec![
                "data/0002/c",
                "data/0001/b",
                "data/0000/a",
                "header.tar.gz",
                "version"
            ]
        );
        assert_eq!(
            manifest_order(Vec::<String>::new()),
            vec!["header.tar.gz", "version"]
        );
    }

    #[test]
    fn draft_lines_and_offsets() {
        let draft = ManifestDraft::new(&manifest_order(["data/0000/a"])).unwrap();
        let text = std::str::from_utf8(draft.as_bytes()).unwrap();
        let zeros = "0".repeat(64);
        assert_eq!(
            text,
            format!("{zeros}  data/0000/a\n{zeros}  header.tar.gz\n{zeros}  version\n")
        );
        let offsets: Vec<usize> = draft.slots.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 78, 158]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ManifestDraft::new(&manifest_order(["version"])).unwrap_err();
        assert!(err.is_validation());
    }

    fn archive_with(draft: &ManifestDraft) -> Vec<u8> {
        let mut outer = Container::new(Vec::new(), "root");
        outer.write_bytes(VERSION_ENTRY, b"{}").unwrap();
        outer.write_bytes(MANIFEST_ENTRY, draft.as_bytes()).unwrap();
        outer.write_bytes("header.tar.gz", b"hdr").unwrap();
        outer.into_inner().unwrap()
    }

    #[test]
    fn finalize_patches_in_place_without_resizing() {
        let draft = ManifestDraft::new(&order()).unwrap();
        let mut bytes = archive_with(&draft);
        let len_before = bytes.len();

        let mut pending = draft.into_pending();
        for name in order() {
            pending.record(&name, Checksum::of_bytes(name.as_bytes())).unwrap();
        }
        let entries = pending.finalize(&mut bytes).unwrap();
        assert_eq!(bytes.len(), len_before);

        let start = archive::entry_data_offset(&bytes, MANIFEST_ENTRY)
            .unwrap()
            .unwrap() as usize;
        let expected: String = entries.iter().map(|e| format!("{e}\n")).collect();
        assert_eq!(
            std::str::from_utf8(&bytes[start..start + expected.len()]).unwrap(),
            expected
        );
        assert_eq!(entries[0].filename, "data/0002/c");
        assert_eq!(entries[0].checksum, Checksum::of_bytes(b"data/0002/c"));
    }

    #[test]
    fn missing_checksum_fails() {
        let draft = ManifestDraft::new(&order()).unwrap();
        let mut bytes = archive_with(&draft);
        let mut pending = draft.into_pending();
        pending.record("version", Checksum::of_bytes(b"")).unwrap();
        let err = pending.finalize(&mut bytes).unwrap_err();
        assert!(matches!(err, ArtifactError::Backpatch { .. }));
    }

    #[test]
    fn unknown_and_repeated_records_fail() {
        let mut pending = ManifestDraft::new(&order()).unwrap().into_pending();
        assert!(pending.record("data/0009/z", Checksum::of_bytes(b"")).is_err());
        pending.record("version", Checksum::of_bytes(b"")).unwrap();
        assert!(pending.record("version", Checksum::of_bytes(b"")).is_err());
    }

    #[test]
    fn missing_manifest_entry_fails() {
        let pending = ManifestDraft::new(&order()).unwrap().into_pending();
        let mut outer = Container::new(Vec::new(), "root");
        outer.write_bytes(VERSION_ENTRY, b"{}").unwrap();
        let mut bytes = outer.into_inner().unwrap();
        let err = pending.finalize(&mut bytes).unwrap_err();
        assert!(matches!(err, ArtifactError::ManifestNotFound));
    }
}
