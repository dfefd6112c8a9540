//! Error types for artifact assembly.

use thiserror::Error;

/// Result type for artifact operations.
pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Errors that can occur while assembling an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// A caller-side invariant was violated (empty name, empty device types,
    /// colliding entry names or metadata keys).
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// A payload or script stream could not be read, or an archive write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A metadata document could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The finished archive has no `manifest` entry to patch.
    #[error("manifest entry not found in finished archive")]
    ManifestNotFound,

    /// A manifest placeholder could not be replaced with its checksum.
    #[error("cannot backpatch manifest line for '{entry}': {reason}")]
    Backpatch { entry: String, reason: String },
}

impl ArtifactError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn backpatch(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backpatch {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error is a caller-side validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
