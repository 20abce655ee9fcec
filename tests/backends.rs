use std::sync::Arc;

use chrono::Utc;
use grove::backends::{
    BackendError, CacheBackend, ConfigBackend, FsConfigBackend, FsOutputBackend, FsSecretBackend,
    HandlerRegistry, MemoryCacheBackend, OutputBackend, SecretBackend, SetConstraint,
};
use grove::runtime::{LockMarker, identity_hash, lock_pk, pointer_pk};
use rustc_hash::FxHashMap;

#[tokio::test]
async fn memory_cache_round_trips_and_deletes() {
    let cache = MemoryCacheBackend::new();
    assert_eq!(cache.get("pk", "sk").await.unwrap(), None);

    cache.set("pk", "sk", "v1", SetConstraint::None).await.unwrap();
    assert_eq!(cache.get("pk", "sk").await.unwrap().as_deref(), Some("v1"));

    cache.delete("pk", "sk").await.unwrap();
    assert_eq!(cache.get("pk", "sk").await.unwrap(), None);
}

#[tokio::test]
async fn conditional_set_enforces_absent_and_equals() {
    let cache = MemoryCacheBackend::new();

    cache.set("pk", "sk", "v1", SetConstraint::Absent).await.unwrap();
    let err = cache
        .set("pk", "sk", "v2", SetConstraint::Absent)
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Conflict { .. }));
    assert_eq!(cache.get("pk", "sk").await.unwrap().as_deref(), Some("v1"));

    cache
        .set("pk", "sk", "v2", SetConstraint::Equals("v1".to_string()))
        .await
        .unwrap();
    let err = cache
        .set("pk", "sk", "v3", SetConstraint::Equals("v1".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Conflict { .. }));
    assert_eq!(cache.get("pk", "sk").await.unwrap().as_deref(), Some("v2"));

    // Equals against an absent slot conflicts too.
    let err = cache
        .set("other", "sk", "v1", SetConstraint::Equals("v0".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Conflict { .. }));
}

#[tokio::test]
async fn fs_config_backend_lists_only_json_documents_sorted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.json"), b"{\"b\":1}").unwrap();
    std::fs::write(dir.path().join("a.json"), b"{\"a\":1}").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let backend = FsConfigBackend::new(dir.path());
    assert_eq!(backend.list().await.unwrap(), vec!["a.json", "b.json"]);
    assert_eq!(backend.get("a.json").await.unwrap(), b"{\"a\":1}");
}

#[tokio::test]
async fn fs_output_backend_creates_key_directories() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FsOutputBackend::new(dir.path());
    let metadata = FxHashMap::default();
    backend
        .write("conn/tenant/all/2020/12/08/103000_0000.json", b"{}\n".to_vec(), &metadata)
        .await
        .unwrap();

    let written = dir
        .path()
        .join("conn/tenant/all/2020/12/08/103000_0000.json");
    assert_eq!(std::fs::read(written).unwrap(), b"{}\n");
}

#[tokio::test]
async fn fs_secret_backend_trims_trailing_newlines() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("token"), b"s3cr3t\n").unwrap();

    let backend = FsSecretBackend::new(Some(dir.path().to_path_buf()));
    assert_eq!(backend.fetch("token").await.unwrap(), b"s3cr3t");

    let err = backend.fetch("missing").await.unwrap_err();
    assert!(matches!(err, BackendError::NotFound { .. }));
}

#[tokio::test]
async fn handler_registry_builds_by_name() {
    let mut registry: HandlerRegistry<dyn CacheBackend> = HandlerRegistry::new();
    registry.register("local_memory", || Ok(Arc::new(MemoryCacheBackend::new())));

    assert!(registry.contains("local_memory"));
    assert_eq!(registry.names(), vec!["local_memory"]);
    let cache = registry.build("local_memory").unwrap();
    cache.set("pk", "sk", "v", SetConstraint::None).await.unwrap();

    let err = match registry.build("dynamodb") {
        Err(err) => err,
        Ok(_) => panic!("expected build(\"dynamodb\") to fail"),
    };
    assert!(matches!(err, BackendError::NotFound { .. }));
}

#[test]
fn identity_hashes_use_md5_hex() {
    assert_eq!(identity_hash("abc"), "900150983cd24fb0d6963f7d28e17f72");
    assert_eq!(identity_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
}

#[test]
fn cache_keys_follow_the_documented_layout() {
    assert_eq!(
        pointer_pk("example_audit", "abc"),
        "pointer.example_audit.900150983cd24fb0d6963f7d28e17f72"
    );
    assert_eq!(
        lock_pk("example_audit", "abc"),
        "lock.example_audit.900150983cd24fb0d6963f7d28e17f72"
    );
}

#[test]
fn lock_markers_round_trip_and_expire() {
    let now = Utc::now();
    let marker = LockMarker::new("runtime-1", now + chrono::Duration::seconds(90));
    let decoded = LockMarker::decode(&marker.encode()).unwrap();
    assert_eq!(decoded, marker);
    assert!(!decoded.is_expired(now));
    assert!(decoded.is_expired(now + chrono::Duration::seconds(91)));

    assert_eq!(LockMarker::decode("not json"), None);
}
