//! Downloading and resolving version descriptors listed in the versions manifest.

use std::sync::Arc;
use std::time::Duration;

use sha1::{Digest, Sha1};
use tracing::{debug, trace};

use crate::manifest::Manifest;

use super::{Error, ParentProvider, Result, VersionDescriptor};


/// Download version descriptors listed in a manifest and flatten them with their
/// whole ancestry, parents being looked up by id in the same manifest.
#[derive(Debug, Clone)]
pub struct Resolver {
    manifest: Arc<Manifest>,
    timeout: Option<Duration>,
}

impl Resolver {

    pub fn new(manifest: Arc<Manifest>) -> Self {
        Self {
            manifest,
            timeout: None,
        }
    }

    /// The manifest used to look up versions.
    #[inline]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The timeout of each descriptor request, none to use the transport default.
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

    /// Download the descriptor of the given version from the manifest and resolve it.
    pub fn download_version(&self, id: &str) -> Result<VersionDescriptor> {
        let entry = self.manifest.find(id)
            .ok_or_else(|| Error::VersionNotFound { id: id.to_string() })?;
        self.download(&entry.url, entry.sha1.as_deref())
    }

    /// Download the descriptor at the given URL, verifying its SHA-1 if given, and
    /// flatten it with its ancestry.
    pub fn download(&self, url: &str, sha1: Option<&[u8; 20]>) -> Result<VersionDescriptor> {
        let descriptor = self.download_raw(url, sha1)?;
        let mut provider = self;
        descriptor.flatten(&mut provider)
    }

    /// Download the descriptor at the given URL, verifying its SHA-1 if given, without
    /// resolving it.
    pub fn download_raw(&self, url: &str, sha1: Option<&[u8; 20]>) -> Result<VersionDescriptor> {

        trace!(url, "requesting version descriptor");

        let timeout = self.timeout;
        let raw = crate::tokio::sync(async move {
            crate::http::client(timeout)?
                .get(url)
                .send().await?
                .error_for_status()?
                .bytes().await
        }).map_err(|e| Error::new_io(e, "runtime"))?
            .map_err(|e| Error::new_reqwest(e, url))?;

        if let Some(expected) = sha1 {
            if Sha1::digest(&raw).as_slice() != &expected[..] {
                return Err(Error::InvalidShaHash { url: url.to_string() });
            }
        }

        let descriptor = VersionDescriptor::decode(&raw)
            .map_err(|e| Error::new_json(e, url))?;

        debug!(id = %descriptor.id, url, "downloaded version descriptor");
        Ok(descriptor)

    }

}

/// Parents are downloaded from the manifest, a parent absent from it is invalid.
impl ParentProvider for &Resolver {
    fn provide(&mut self, id: &str) -> Result<VersionDescriptor> {
        let entry = self.manifest.find(id)
            .ok_or_else(|| Error::InvalidParent { id: id.to_string() })?;
        self.download_raw(&entry.url, entry.sha1.as_deref())
    }
}
