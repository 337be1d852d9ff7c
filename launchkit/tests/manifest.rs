use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use launchkit::manifest::{Error, ManifestCache, VersionChannel};
use launchkit::store::{BlobStore, DirStore};

use tempfile::TempDir;

use mockito::{Server, ServerGuard};

use tracing_subscriber::EnvFilter;


/// Print library logs while testing, filtered by `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("launchkit=debug,hyper=warn,reqwest=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

const MANIFEST: &str = r#"{
    "latest": { "release": "1.21.4", "snapshot": "1.21.4" },
    "versions": [
        {
            "id": "1.21.4",
            "type": "release",
            "url": "https://piston-meta.mojang.com/v1/packages/bb/1.21.4.json",
            "time": "2025-01-07T09:44:44+00:00",
            "releaseTime": "2024-12-03T10:12:57+00:00",
            "sha1": "a3bcba436caa849622fd7e1e5b89489ed6c9ac63"
        },
        {
            "id": "b1.7.3",
            "type": "old_beta",
            "url": "https://piston-meta.mojang.com/v1/packages/cc/b1.7.3.json",
            "time": "2019-06-28T07:06:16+00:00",
            "releaseTime": "2011-07-07T22:00:00+00:00"
        }
    ]
}"#;

fn temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("")
        .suffix(".manifest")
        .tempdir_in(env!("CARGO_TARGET_TMPDIR"))
        .unwrap()
}

fn cache(server: &ServerGuard, dir: &TempDir) -> ManifestCache<DirStore> {
    let mut cache = ManifestCache::new(DirStore::new(dir.path()));
    cache.set_url(format!("{}/manifest.json", server.url()))
        .set_timeout(Some(Duration::from_secs(5)));
    cache
}

#[test]
fn download_and_mirror() {

    init_tracing();

    let mut server = Server::new();
    let dir = temp_dir();
    let mock = server.mock("GET", "/manifest.json")
        .with_body(MANIFEST)
        .create();

    let cache = cache(&server, &dir);
    let manifest = cache.get_or_create().unwrap();
    mock.assert();

    assert_eq!(manifest.versions().len(), 2);
    assert_eq!(manifest.latest_release(), Some("1.21.4"));
    assert_eq!(manifest.find("b1.7.3").unwrap().channel, VersionChannel::OldBeta);

    let mirrored = DirStore::new(dir.path()).get(Path::new("version_manifest_v2.json")).unwrap();
    assert_eq!(mirrored.as_deref(), Some(MANIFEST.as_bytes()));

}

#[test]
fn memoized() {

    init_tracing();

    let mut server = Server::new();
    let dir = temp_dir();
    let mock = server.mock("GET", "/manifest.json")
        .with_body(MANIFEST)
        .expect(2)
        .create();

    let cache = cache(&server, &dir);
    let first = cache.get_or_create().unwrap();
    let second = cache.get_or_create().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(cache.cached().is_some());

    cache.invalidate();
    assert!(cache.cached().is_none());
    let third = cache.get_or_create().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));

    mock.assert();

}

#[test]
fn fallback_without_mirror() {

    init_tracing();

    let mut server = Server::new();
    let dir = temp_dir();
    let mock = server.mock("GET", "/manifest.json")
        .with_status(500)
        .create();

    let cache = cache(&server, &dir);
    assert!(matches!(cache.get_or_create(), Err(Error::NoCacheFound)));
    assert!(cache.cached().is_none());
    mock.assert();

}

#[test]
fn fallback_to_mirror() {

    init_tracing();

    let mut server = Server::new();
    let dir = temp_dir();

    let mut cache = cache(&server, &dir);
    cache.set_cache_key("mirror/manifest.json");

    server.mock("GET", "/manifest.json")
        .with_body(MANIFEST)
        .create();
    cache.download().unwrap();

    server.reset();
    let failing = server.mock("GET", "/manifest.json")
        .with_body("{ not json")
        .create();

    let manifest = cache.get_or_create().unwrap();
    failing.assert();
    assert_eq!(manifest.versions().len(), 2);
    assert!(manifest.find("1.21.4").unwrap().sha1.is_some());

}

#[test]
fn invalid_mirror() {

    init_tracing();

    let mut server = Server::new();
    let dir = temp_dir();
    server.mock("GET", "/manifest.json")
        .with_status(404)
        .create();

    let store = DirStore::new(dir.path());
    store.set(Path::new("version_manifest_v2.json"), b"garbage").unwrap();

    let cache = cache(&server, &dir);
    assert!(matches!(cache.fetch_cache(), Err(Error::NoCacheFound)));
    assert!(matches!(cache.download(), Err(Error::NoCacheFound)));

}

#[test]
fn minimal_index() {

    init_tracing();

    let mut server = Server::new();
    let dir = temp_dir();
    server.mock("GET", "/manifest.json")
        .with_body(r#"{
            "versions": [
                {
                    "id": "1.21.4",
                    "type": "release",
                    "url": "https://piston-meta.mojang.com/v1/packages/bb/1.21.4.json",
                    "sha1": "a3bcba436caa849622fd7e1e5b89489ed6c9ac63",
                    "releaseTime": "2024-12-03T10:12:57+00:00"
                },
                {
                    "id": "experimental",
                    "type": "pending",
                    "url": "https://example.com/experimental.json",
                    "releaseTime": "2025-01-01T00:00:00+00:00"
                }
            ]
        }"#)
        .create();

    let manifest = cache(&server, &dir).download().unwrap();
    assert_eq!(manifest.versions().len(), 2);
    assert_eq!(manifest.latest_release(), None);

    let entry = manifest.find("1.21.4").unwrap();
    assert_eq!(entry.channel, VersionChannel::Release);
    assert!(entry.time.is_none());
    assert_eq!(manifest.find("experimental").unwrap().channel, VersionChannel::Unknown);

}
