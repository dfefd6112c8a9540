//! The `header.tar.gz` entry.
//!
//! Layout of the embedded archive:
//!
//! ```text
//! header-info                  global payload types, provides and depends
//! scripts/<State>              optional state scripts
//! headers/NNNN/type-info       per-payload type, depends and provides
//! headers/NNNN/meta-data       empty placeholder, always present
//! ```

use crate::archive;
use crate::config::BuildOptions;
use crate::error::{ArtifactError, Result};
use crate::payload::{Payload, PayloadEntry};
use crate::Metadata;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::str::FromStr;

/// Name of the header entry in the outer archive.
pub const HEADER_ENTRY: &str = "header.tar.gz";

/// Global artifact description (`header-info`).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HeaderInfo {
    pub payloads: Vec<PayloadTypeRef>,
    pub artifact_provides: Metadata,
    pub artifact_depends: Metadata,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PayloadTypeRef {
    #[serde(rename = "type")]
    pub payload_type: String,
}

/// Per-payload description (`headers/NNNN/type-info`).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TypeInfo {
    #[serde(rename = "type")]
    pub payload_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_depends: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_provides: Option<Metadata>,
}

impl TypeInfo {
    pub(crate) fn for_payload(payload: &Payload) -> Self {
        Self {
            payload_type: payload.payload_type().to_string(),
            artifact_depends: payload.depends().cloned(),
            artifact_provides: payload.provides().cloned(),
        }
    }
}

/// States an install script can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScriptState {
    ArtifactInstallEnter,
    ArtifactInstallLeave,
    ArtifactInstallError,
    ArtifactRebootEnter,
    ArtifactRebootLeave,
    ArtifactRebootError,
    ArtifactCommitEnter,
    ArtifactCommitLeave,
    ArtifactCommitError,
    ArtifactRollbackEnter,
    ArtifactRollbackLeave,
    ArtifactRollbackRebootEnter,
    ArtifactRollbackRebootLeave,
    ArtifactFailureEnter,
    ArtifactFailureLeave,
}

impl ScriptState {
    pub const ALL: [ScriptState; 15] = [
        Self::ArtifactInstallEnter,
        Self::ArtifactInstallLeave,
        Self::ArtifactInstallError,
        Self::ArtifactRebootEnter,
        Self::ArtifactRebootLeave,
        Self::ArtifactRebootError,
        Self::ArtifactCommitEnter,
        Self::ArtifactCommitLeave,
        Self::ArtifactCommitError,
        Self::ArtifactRollbackEnter,
        Self::ArtifactRollbackLeave,
        Self::ArtifactRollbackRebootEnter,
        Self::ArtifactRollbackRebootLeave,
        Self::ArtifactFailureEnter,
        Self::ArtifactFailureLeave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArtifactInstallEnter => "ArtifactInstall_Enter",
            Self::ArtifactInstallLeave => "ArtifactInstall_Leave",
            Self::ArtifactInstallError => "ArtifactInstall_Error",
            Self::ArtifactRebootEnter => "ArtifactReboot_Enter",
            Self::ArtifactRebootLeave => "ArtifactReboot_Leave",
            Self::ArtifactRebootError => "ArtifactReboot_Error",
            Self::ArtifactCommitEnter => "ArtifactCommit_Enter",
            Self::ArtifactCommitLeave => "ArtifactCommit_Leave",
            Self::ArtifactCommitError => "ArtifactCommit_Error",
            Self::ArtifactRollbackEnter => "ArtifactRollback_Enter",
            Self::ArtifactRollbackLeave => "ArtifactRollback_Leave",
            Self::ArtifactRollbackRebootEnter => "ArtifactRollbackReboot_Enter",
            Self::ArtifactRollbackRebootLeave => "ArtifactRollbackReboot_Leave",
            Self::ArtifactFailureEnter => "ArtifactFailure_Enter",
            Self::ArtifactFailureLeave => "ArtifactFailure_Leave",
        }
    }

    /// Path of the script inside `header.tar.gz`.
    pub fn script_path(&self) -> String {
        format!("scripts/{}", self.as_str())
    }
}

impl fmt::Display for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptState {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ArtifactError::validation(format!("'{s}' is not a valid script state")))
    }
}

/// Everything `header.tar.gz` is assembled from.
pub(crate) struct HeaderParts<'a> {
    pub(crate) provides: Metadata,
    pub(crate) depends: Metadata,
    pub(crate) payloads: Vec<(&'a PayloadEntry, &'a Payload)>,
    pub(crate) scripts: &'a [(ScriptState, Vec<u8>)],
}

impl HeaderParts<'_> {
    pub(crate) fn header_info(&self) -> HeaderInfo {
        HeaderInfo {
            payloads: self
                .payloads
                .iter()
                .map(|(_, payload)| PayloadTypeRef {
                    payload_type: payload.payload_type().to_string(),
                })
                .collect(),
            artifact_provides: self.provides.clone(),
            artifact_depends: self.depends.clone(),
        }
    }

    /// Serialize the compressed header archive.
    pub(crate) fn assemble(&self, options: &BuildOptions) -> Result<Vec<u8>> {
        let mut seen = BTreeSet::new();
        for (entry, _) in &self.payloads {
            if !seen.insert(entry.entry_name()) {
                return Err(ArtifactError::validation(format!(
                    "duplicate payload entry name '{}'",
                    entry.entry_name()
                )));
            }
        }

        let mut tar = archive::compressed(options);
        tar.write_bytes("header-info", &serde_json::to_vec(&self.header_info())?)?;

        for (state, script) in self.scripts {
            tar.write_bytes(&state.script_path(), script)?;
        }

        for (entry, payload) in &self.payloads {
            let dir = entry.header_directory();
            let type_info = serde_json::to_vec(&TypeInfo::for_payload(payload))?;
            tar.write_bytes(&format!("{dir}/type-info"), &type_info)?;
            tar.write_entry(&format!("{dir}/meta-data"), io::empty(), 0)?;
        }

        let bytes = tar.finish()?;
        tracing::debug!(
            payloads = self.payloads.len(),
            scripts = self.scripts.len(),
            bytes = bytes.len(),
            "header assembled"
        );
        Ok(bytes)
    }
}
