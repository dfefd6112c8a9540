//! In-memory builder for update artifacts.
//!
//! An artifact is an uncompressed tar holding, in order:
//!
//! - `version`: format descriptor (`{"format":"mender","version":3}`)
//! - `manifest`: `<sha256>  <name>` per structural file
//! - `header.tar.gz`: global and per-payload metadata
//! - `data/NNNN.tar.gz`: one compressed archive per payload
//!
//! The manifest is written before the checksums it lists are known and is
//! backpatched once the archive is complete. See [`manifest`].
//!
//! # Example
//!
//! ```no_run
//! use artifact_writer::{Artifact, Payload};
//! use serde_json::json;
//!
//! let depends = json!({"rootfs-image.checksum": "checksum"});
//! let payload = Payload::from_bytes(vec![0u8; 256])
//!     .with_depends(depends.as_object().cloned().unwrap());
//!
//! let mut artifact = Artifact::new("test", ["arm1"]).with_payload(payload).unwrap();
//! let bytes = artifact.build().unwrap().into_inner();
//! assert!(!bytes.is_empty());
//! ```

mod archive;
pub mod artifact;
pub mod checksum;
pub mod config;
pub mod error;
pub mod header;
pub mod manifest;
pub mod payload;

/// Key/value constraints (`artifact_depends` / `artifact_provides`).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// Convenience re-exports
pub use artifact::Artifact;
pub use checksum::{digest_stream, Checksum, CHECKSUM_HEX_LEN};
pub use config::{BuildOptions, BuildOptionsOverrides};
pub use error::{ArtifactError, Result};
pub use header::{HeaderInfo, ScriptState, TypeInfo, HEADER_ENTRY};
pub use manifest::{manifest_order, ManifestEntry, MANIFEST_ENTRY, VERSION_ENTRY};
pub use payload::{Payload, PayloadEntry, PayloadSource, DEFAULT_PAYLOAD_TYPE};
