//! Build options for artifact assembly.
//!
//! Every option keeps the output deterministic: tar entries always carry
//! mtime 0, uid/gid 0 and mode 0644, gzip streams carry mtime 0 and OS 255.

use serde::Deserialize;

/// Default block size used when hashing streams (1 MiB).
pub const DEFAULT_READ_BLOCK_SIZE: usize = 1024 * 1024;

/// Options controlling how an artifact is serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// gzip level for `header.tar.gz` and the payload archives (0-9).
    pub compression_level: u32,
    /// Block size used when hashing payload streams.
    pub read_block_size: usize,
    /// User and group name written into every tar header.
    pub owner_name: String,
    /// Value of the `version` field in the format descriptor.
    pub format_version: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            compression_level: 9,
            read_block_size: DEFAULT_READ_BLOCK_SIZE,
            owner_name: "root".into(),
            format_version: 3,
        }
    }
}

/// Partial overrides for `BuildOptions`. Used for config JSON parsing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildOptionsOverrides {
    pub compression_level: Option<u32>,
    pub read_block_size: Option<usize>,
    pub owner_name: Option<String>,
    pub format_version: Option<u32>,
}

impl BuildOptions {
    /// Apply overrides onto these options. Only `Some` values override.
    pub fn apply(self, overrides: BuildOptionsOverrides) -> Self {
        Self {
            compression_level: overrides
                .compression_level
                .map(|level| level.min(9))
                .unwrap_or(self.compression_level),
            read_block_size: overrides
                .read_block_size
                .filter(|size| *size > 0)
                .unwrap_or(self.read_block_size),
            owner_name: overrides.owner_name.unwrap_or(self.owner_name),
            format_version: overrides.format_version.unwrap_or(self.format_version),
        }
    }
}
