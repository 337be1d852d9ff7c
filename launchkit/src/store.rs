//! Persisted key-value blob storage, used to mirror remote documents on disk so that
//! they remain available offline.

use std::path::{Path, PathBuf};
use std::{env, fs, io};


/// A store of arbitrary bytes blobs addressed by relative paths.
pub trait BlobStore {

    /// Get the blob at the given key, returning none if it has never been set.
    fn get(&self, key: &Path) -> io::Result<Option<Vec<u8>>>;

    /// Set the blob at the given key, replacing any previous one.
    fn set(&self, key: &Path, data: &[u8]) -> io::Result<()>;

}

impl<S: BlobStore + ?Sized> BlobStore for &S {

    #[inline]
    fn get(&self, key: &Path) -> io::Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    #[inline]
    fn set(&self, key: &Path, data: &[u8]) -> io::Result<()> {
        (**self).set(key, data)
    }

}

/// A blob store where each key is a file relative to a root directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {

    /// Create a store rooted at the given directory, it's created lazily on first set.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store in a `launchkit` directory inside the standard user cache
    /// directory, or the system temporary directory as a fallback.
    pub fn new_with_default() -> Self {
        let mut root = dirs::cache_dir().unwrap_or_else(env::temp_dir);
        root.push(env!("CARGO_PKG_NAME"));
        Self::new(root)
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

}

impl BlobStore for DirStore {

    fn get(&self, key: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.root.join(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &Path, data: &[u8]) -> io::Result<()> {

        let file = self.root.join(key);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write next to the file and rename, so a reader never sees a partial blob.
        let mut tmp = tempfile::NamedTempFile::new_in(file.parent().unwrap_or(&self.root))?;
        io::Write::write_all(&mut tmp, data)?;
        tmp.persist(&file).map_err(|e| e.error)?;
        Ok(())

    }

}
