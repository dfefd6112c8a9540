//! The artifact builder.
//!
//! `build()` runs five phases against one outer tar:
//!
//! 1. `version` format descriptor
//! 2. `manifest` with placeholder checksums
//! 3. `header.tar.gz`
//! 4. one `data/NNNN.tar.gz` per payload
//! 5. backpatch the manifest in the finished buffer

use crate::archive::Container;
use crate::checksum::digest_stream;
use crate::config::BuildOptions;
use crate::error::{ArtifactError, Result};
use crate::header::{HeaderParts, ScriptState, HEADER_ENTRY};
use crate::manifest::{manifest_order, ManifestDraft, MANIFEST_ENTRY, VERSION_ENTRY};
use crate::payload::{write_payload, Payload, PayloadEntry};
use crate::Metadata;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Cursor;

/// Depends key owned by the builder (`device_type`).
const DEVICE_TYPE_KEY: &str = "device_type";

/// Provides keys owned by the builder.
const ARTIFACT_NAME_KEY: &str = "artifact_name";
const ARTIFACT_GROUP_KEY: &str = "artifact_group";

/// Longest user/group name a tar header can hold.
const MAX_OWNER_NAME_LEN: usize = 32;

/// Format descriptor written to the `version` entry.
#[derive(Debug, Serialize)]
struct VersionInfo {
    format: &'static str,
    version: u32,
}

#[derive(Debug)]
struct Staged {
    entry: PayloadEntry,
    payload: Payload,
}

/// An update artifact under construction.
///
/// # Example
///
/// ```no_run
/// use artifact_writer::{Artifact, Payload};
///
/// let mut artifact = Artifact::new("release-1", ["raspberrypi4"]);
/// artifact
///     .add_payload(Payload::from_bytes(vec![0u8; 256]).with_name("rootfs.ext4"))
///     .unwrap();
/// let bytes = artifact.build().unwrap().into_inner();
/// std::fs::write("release-1.mender", bytes).unwrap();
/// ```
#[derive(Debug)]
pub struct Artifact {
    name: String,
    device_types: Vec<String>,
    group: Option<String>,
    provides: Metadata,
    depends: Metadata,
    payloads: Vec<Staged>,
    scripts: Vec<(ScriptState, Vec<u8>)>,
    options: BuildOptions,
}

impl Artifact {
    pub fn new<I, S>(name: impl Into<String>, device_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            device_types: device_types.into_iter().map(Into::into).collect(),
            group: None,
            provides: Metadata::new(),
            depends: Metadata::new(),
            payloads: Vec::new(),
            scripts: Vec::new(),
            options: BuildOptions::default(),
        }
    }

    /// Construct with one initial payload.
    pub fn with_payload(mut self, payload: Payload) -> Result<Self> {
        self.add_payload(payload)?;
        Ok(self)
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Extra artifact-level provides, written after `artifact_name`/`artifact_group`.
    pub fn with_provides(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.provides.insert(key.into(), value.into());
        self
    }

    /// Extra artifact-level depends, written after `device_type`.
    pub fn with_depends(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.depends.insert(key.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_types(&self) -> &[String] {
        &self.device_types
    }

    pub fn payload_count(&self) -> usize {
        self.payloads.len()
    }

    /// Entry names (`data/NNNN/<basename>`) in insertion order.
    pub fn payload_entries(&self) -> impl Iterator<Item = &PayloadEntry> {
        self.payloads.iter().map(|staged| &staged.entry)
    }

    /// Append a payload. Its depends/provides keys must not be claimed at
    /// artifact level or by an earlier payload.
    pub fn add_payload(&mut self, payload: Payload) -> Result<()> {
        let entry = PayloadEntry::new(self.payloads.len(), payload.name())?;
        if payload.payload_type().is_empty() {
            return Err(ArtifactError::validation(format!(
                "payload {}: payload type cannot be empty",
                entry.index()
            )));
        }
        if self.payload_entries().any(|e| e.entry_name() == entry.entry_name()) {
            return Err(ArtifactError::validation(format!(
                "duplicate payload entry name '{}'",
                entry.entry_name()
            )));
        }

        let (mut depend_keys, mut provide_keys) = self.claimed_keys();
        claim(&mut depend_keys, payload.depends(), "depends")?;
        claim(&mut provide_keys, payload.provides(), "provides")?;

        tracing::debug!(
            entry = %entry.entry_name(),
            payload_type = payload.payload_type(),
            "payload added"
        );
        self.payloads.push(Staged { entry, payload });
        Ok(())
    }

    pub fn add_state_script(
        &mut self,
        state: ScriptState,
        script: impl Into<Vec<u8>>,
    ) -> Result<()> {
        if self.scripts.iter().any(|(existing, _)| *existing == state) {
            return Err(ArtifactError::validation(format!(
                "state script {state} already added"
            )));
        }
        self.scripts.push((state, script.into()));
        Ok(())
    }

    fn reserved_depends(&self) -> Vec<&str> {
        vec![DEVICE_TYPE_KEY]
    }

    /// `artifact_group` is only owned by the builder once a group is set.
    fn reserved_provides(&self) -> Vec<&str> {
        let mut keys = vec![ARTIFACT_NAME_KEY];
        if self.group.is_some() {
            keys.push(ARTIFACT_GROUP_KEY);
        }
        keys
    }

    fn claimed_keys(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut depends: BTreeSet<String> =
            self.reserved_depends().into_iter().map(String::from).collect();
        let mut provides: BTreeSet<String> =
            self.reserved_provides().into_iter().map(String::from).collect();
        depends.extend(self.depends.keys().cloned());
        provides.extend(self.provides.keys().cloned());
        for staged in &self.payloads {
            depends.extend(staged.payload.depends().into_iter().flat_map(|m| m.keys().cloned()));
            provides.extend(staged.payload.provides().into_iter().flat_map(|m| m.keys().cloned()));
        }
        (depends, provides)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ArtifactError::validation("artifact name cannot be empty"));
        }
        if self.device_types.is_empty() {
            return Err(ArtifactError::validation("device_types cannot be empty"));
        }
        if self.device_types.iter().any(String::is_empty) {
            return Err(ArtifactError::validation("device type cannot be an empty string"));
        }
        if self.group.as_deref() == Some("") {
            return Err(ArtifactError::validation("artifact group cannot be empty"));
        }
        if self.options.owner_name.len() > MAX_OWNER_NAME_LEN {
            return Err(ArtifactError::validation(format!(
                "owner name '{}' exceeds {MAX_OWNER_NAME_LEN} bytes",
                self.options.owner_name
            )));
        }
        let sides = [
            ("provides", &self.provides, self.reserved_provides()),
            ("depends", &self.depends, self.reserved_depends()),
        ];
        for (kind, extra, reserved) in sides {
            if let Some(key) = extra.keys().find(|k| reserved.contains(&k.as_str())) {
                return Err(ArtifactError::validation(format!(
                    "artifact {kind} key '{key}' is reserved"
                )));
            }
            let claimed_by_payload = self.payloads.iter().find_map(|staged| {
                let own = if kind == "provides" {
                    staged.payload.provides()
                } else {
                    staged.payload.depends()
                };
                own.and_then(|m| {
                    m.keys()
                        .find(|k| extra.contains_key(*k) || reserved.contains(&k.as_str()))
                })
            });
            if let Some(key) = claimed_by_payload {
                return Err(ArtifactError::validation(format!(
                    "{kind} key '{key}' already present at artifact level"
                )));
            }
        }
        Ok(())
    }

    /// `artifact_provides` of `header-info`.
    fn global_provides(&self) -> Metadata {
        let mut provides = Metadata::new();
        provides.insert("artifact_name".into(), Value::from(self.name.clone()));
        if let Some(group) = &self.group {
            provides.insert("artifact_group".into(), Value::from(group.clone()));
        }
        provides.extend(self.provides.clone());
        provides
    }

    /// `artifact_depends` of `header-info`.
    fn global_depends(&self) -> Metadata {
        let mut depends = Metadata::new();
        depends.insert("device_type".into(), Value::from(self.device_types.clone()));
        depends.extend(self.depends.clone());
        depends
    }

    /// Assemble the complete artifact in memory.
    ///
    /// The returned cursor is positioned at the start. Building twice from
    /// the same inputs yields identical bytes; payload streams are left
    /// rewound.
    pub fn build(&mut self) -> Result<Cursor<Vec<u8>>> {
        self.validate()?;

        let span = tracing::info_span!(
            "artifact_build",
            artifact = %self.name,
            payloads = self.payloads.len()
        );
        let _enter = span.enter();
        let block = self.options.read_block_size;
        let mut outer = Container::new(Vec::new(), &self.options.owner_name);

        // 1. format descriptor
        let version = serde_json::to_vec(&VersionInfo {
            format: "mender",
            version: self.options.format_version,
        })?;
        let (version_sum, _) = digest_stream(&mut Cursor::new(&version), block)?;
        outer.write_bytes(VERSION_ENTRY, &version)?;

        // 2. manifest placeholders
        let order = manifest_order(
            self.payloads
                .iter()
                .map(|staged| staged.entry.entry_name())
                .collect::<Vec<_>>(),
        );
        let draft = ManifestDraft::new(&order)?;
        outer.write_bytes(MANIFEST_ENTRY, draft.as_bytes())?;
        tracing::debug!(
            lines = order.len(),
            bytes = draft.as_bytes().len(),
            "manifest placeholders written"
        );
        let mut manifest = draft.into_pending();
        manifest.record(VERSION_ENTRY, version_sum)?;

        // 3. header
        let header = HeaderParts {
            provides: self.global_provides(),
            depends: self.global_depends(),
            payloads: self
                .payloads
                .iter()
                .map(|staged| (&staged.entry, &staged.payload))
                .collect(),
            scripts: &self.scripts,
        }
        .assemble(&self.options)?;
        let (header_sum, _) = digest_stream(&mut Cursor::new(&header), block)?;
        outer.write_bytes(HEADER_ENTRY, &header)?;
        manifest.record(HEADER_ENTRY, header_sum)?;

        // 4. payloads
        for staged in &mut self.payloads {
            let checksum =
                write_payload(&mut outer, &staged.entry, &mut staged.payload, &self.options)?;
            manifest.record(&staged.entry.entry_name(), checksum)?;
        }
        let mut bytes = outer.into_inner()?;

        // 5. backpatch
        let entries = manifest.finalize(&mut bytes)?;
        tracing::info!(bytes = bytes.len(), manifest_lines = entries.len(), "artifact built");

        Ok(Cursor::new(bytes))
    }
}

fn claim(claimed: &mut BTreeSet<String>, metadata: Option<&Metadata>, kind: &str) -> Result<()> {
    for key in metadata.into_iter().flat_map(|m| m.keys()) {
        if !claimed.insert(key.clone()) {
            return Err(ArtifactError::validation(format!(
                "{kind} key '{key}' already present"
            )));
        }
    }
    Ok(())
}
