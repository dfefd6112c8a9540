//! Compile-test for the crate facade: ensures public API symbols are re-exported.

#[test]
fn public_api_smoke() {
    use artifact_writer::{
        digest_stream, manifest_order, Artifact, ArtifactError, BuildOptions,
        BuildOptionsOverrides, Checksum, HeaderInfo, ManifestEntry, Payload, PayloadEntry,
        ScriptState, TypeInfo, CHECKSUM_HEX_LEN, DEFAULT_PAYLOAD_TYPE, HEADER_ENTRY,
        MANIFEST_ENTRY, VERSION_ENTRY,
    };

    let _ = BuildOptions::default().apply(BuildOptionsOverrides::default());
    let _ = digest_stream::<std::io::Cursor<Vec<u8>>>;
    assert_eq!(
        manifest_order(["data/0000/a"]),
        vec!["data/0000/a", HEADER_ENTRY, VERSION_ENTRY]
    );
    assert_eq!(MANIFEST_ENTRY, "manifest");
    assert_eq!(CHECKSUM_HEX_LEN, 64);
    assert_eq!(DEFAULT_PAYLOAD_TYPE, "rootfs-image");
    assert_eq!(ScriptState::ALL.len(), 15);

    let _ = std::mem::size_of::<Artifact>();
    let _ = std::mem::size_of::<ArtifactError>();
    let _ = std::mem::size_of::<Checksum>();
    let _ = std::mem::size_of::<HeaderInfo>();
    let _ = std::mem::size_of::<ManifestEntry>();
    let _ = std::mem::size_of::<Payload>();
    let _ = std::mem::size_of::<PayloadEntry>();
    let _ = std::mem::size_of::<TypeInfo>();
}
