//! The versions manifest provided by Mojang, listing every known version with the
//! location of its descriptor. The manifest is mirrored in a blob store so that it
//! stays available when offline.

use std::sync::{Arc, Mutex, PoisonError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::io;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use crate::serde::Sha1HashString;
use crate::store::{BlobStore, DirStore};


/// Static URL to the version manifest provided by Mojang.
pub const VERSION_MANIFEST_URL: &str = "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Default key of the manifest mirror in the blob store.
pub const DEFAULT_CACHE_KEY: &str = "version_manifest_v2.json";

/// An owned, memoizing handle to the versions manifest. The manifest is downloaded at
/// most once during the lifetime of this object, unless explicitly invalidated, and
/// every successful download is mirrored to the blob store.
#[derive(Debug)]
pub struct ManifestCache<S: BlobStore = DirStore> {
    store: S,
    url: String,
    cache_key: PathBuf,
    timeout: Option<Duration>,
    cached: Mutex<Option<Arc<Manifest>>>,
}

impl ManifestCache<DirStore> {

    /// Create a manifest cache mirrored in the default user cache directory.
    pub fn new_with_default() -> Self {
        Self::new(DirStore::new_with_default())
    }

}

impl<S: BlobStore> ManifestCache<S> {

    /// Create a new manifest cache mirrored into the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            url: VERSION_MANIFEST_URL.to_string(),
            cache_key: PathBuf::from(DEFAULT_CACHE_KEY),
            timeout: None,
            cached: Mutex::new(None),
        }
    }

    /// The URL the manifest is downloaded from.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// See [`Self::url`].
    #[inline]
    pub fn set_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.url = url.into();
        self
    }

    /// The key of the manifest mirror in the blob store.
    #[inline]
    pub fn cache_key(&self) -> &Path {
        &self.cache_key
    }

    /// See [`Self::cache_key`].
    #[inline]
    pub fn set_cache_key(&mut self, key: impl Into<PathBuf>) -> &mut Self {
        self.cache_key = key.into();
        self
    }

    /// The timeout of the manifest request, none to use the transport default.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// See [`Self::timeout`].
    #[inline]
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Return the memoized manifest if it has already been obtained, or download it.
    /// Concurrent callers wait for the first download instead of starting their own.
    pub fn get_or_create(&self) -> Result<Arc<Manifest>> {

        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(manifest) = &*cached {
            return Ok(Arc::clone(manifest));
        }

        let manifest = Arc::new(self.download()?);
        *cached = Some(Arc::clone(&manifest));
        Ok(manifest)

    }

    /// Return the memoized manifest, if any, without downloading.
    pub fn cached(&self) -> Option<Arc<Manifest>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Forget the memoized manifest, the next [`Self::get_or_create`] will download.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Download the manifest, ignoring the memoized one. If the manifest can't be
    /// downloaded or decoded then the mirrored copy is returned instead, if any.
    pub fn download(&self) -> Result<Manifest> {

        let (manifest, raw) = match request_manifest(&self.url, self.timeout) {
            Ok(ret) => ret,
            Err(e) => {
                warn!(url = %self.url, error = %e, "could not download version manifest, trying cached copy");
                return self.fetch_cache();
            }
        };

        debug!(url = %self.url, count = manifest.versions.len(), "downloaded version manifest");

        if let Err(e) = self.store.set(&self.cache_key, &raw) {
            warn!(key = %self.cache_key.display(), error = %e, "could not save version manifest cache");
        }

        Ok(manifest)

    }

    /// Load the mirrored copy of the manifest from the blob store.
    pub fn fetch_cache(&self) -> Result<Manifest> {

        let raw = match self.store.get(&self.cache_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!(key = %self.cache_key.display(), "did not find cached version manifest");
                return Err(Error::NoCacheFound);
            }
            Err(e) => return Err(Error::new_io(e, format!("get cache: {}", self.cache_key.display()))),
        };

        match decode_manifest(&raw) {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                warn!(key = %self.cache_key.display(), error = %e, "cached version manifest is invalid");
                Err(Error::NoCacheFound)
            }
        }

    }

}

/// Request and decode the manifest, returning it with its raw bytes.
fn request_manifest(url: &str, timeout: Option<Duration>) -> Result<(Manifest, Vec<u8>)> {

    let raw = crate::tokio::sync(async move {
        crate::http::client(timeout)?
            .get(url)
            .send().await?
            .error_for_status()?
            .bytes().await
    }).map_err(|e| Error::new_io(e, "runtime"))?
        .map_err(|e| Error::new_reqwest(e, url))?;

    let manifest = decode_manifest(&raw)
        .map_err(|e| Error::new_json(e, url))?;

    Ok((manifest, raw.to_vec()))

}

fn decode_manifest(raw: &[u8]) -> std::result::Result<Manifest, serde_path_to_error::Error<serde_json::Error>> {
    let mut deserializer = serde_json::Deserializer::from_slice(raw);
    serde_path_to_error::deserialize(&mut deserializer)
}

/// The versions manifest.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct Manifest {
    #[serde(default)]
    latest: ManifestLatest,
    versions: Vec<ManifestEntry>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
struct ManifestLatest {
    release: Option<String>,
    snapshot: Option<String>,
}

impl Manifest {

    /// All entries, newest versions first.
    #[inline]
    pub fn versions(&self) -> &[ManifestEntry] {
        &self.versions
    }

    /// Find the entry of the given version id.
    pub fn find(&self, id: &str) -> Option<&ManifestEntry> {
        self.versions.iter().find(|entry| entry.id == id)
    }

    /// The id of the latest release, if known.
    #[inline]
    pub fn latest_release(&self) -> Option<&str> {
        self.latest.release.as_deref()
    }

    /// The id of the latest snapshot, if known.
    #[inline]
    pub fn latest_snapshot(&self) -> Option<&str> {
        self.latest.snapshot.as_deref()
    }

}

/// One version listed in the manifest.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub channel: VersionChannel,
    /// URL of the version descriptor.
    pub url: String,
    /// Expected SHA-1 of the version descriptor, only given by the v2 manifest.
    #[serde(default)]
    pub sha1: Option<Sha1HashString>,
    /// Last update of the version, not listed by every manifest.
    #[serde(default)]
    pub time: Option<DateTime<FixedOffset>>,
    pub release_time: DateTime<FixedOffset>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VersionChannel {
    Release,
    Snapshot,
    OldBeta,
    OldAlpha,
    /// Any channel this crate doesn't know about.
    #[serde(other)]
    Unknown,
}

impl VersionChannel {

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionChannel::Release => "release",
            VersionChannel::Snapshot => "snapshot",
            VersionChannel::OldBeta => "old_beta",
            VersionChannel::OldAlpha => "old_alpha",
            VersionChannel::Unknown => "unknown",
        }
    }

}

/// The manifest could neither be downloaded nor loaded from its mirror.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The download failed and there is no valid mirrored copy of the manifest.
    #[error("no cache found")]
    NoCacheFound,
    /// A generic error that originates from third-party dependencies, associated to an
    /// origin string that helps knowing the location of the issue.
    #[error("internal: {error} @ {origin}")]
    Internal {
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
        origin: Box<str>,
    },
}

/// Type alias for a result with the manifest error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {

    #[inline]
    pub(crate) fn new_io(error: io::Error, origin: impl Into<Box<str>>) -> Self {
        Self::Internal { error: Box::new(error), origin: origin.into() }
    }

    #[inline]
    pub(crate) fn new_json(error: serde_path_to_error::Error<serde_json::Error>, origin: impl Into<Box<str>>) -> Self {
        Self::Internal { error: Box::new(error), origin: origin.into() }
    }

    #[inline]
    pub(crate) fn new_reqwest(error: reqwest::Error, origin: impl Into<Box<str>>) -> Self {
        Self::Internal { error: Box::new(error), origin: origin.into() }
    }

}
