//! Installation layout of the game files, deriving the download tasks required by a
//! resolved version descriptor.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::io::{self, BufReader};
use std::fs::File;
use std::env;

use tracing::{debug, trace};

use crate::download::Task;
use crate::serde::Sha1HashString;
use crate::version::{self, Download, Library, Rule, RuleAction, RuleOs, VersionDescriptor};


/// Base URL for downloading game's assets.
pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net/";

/// Directories where each kind of game file is installed.
#[derive(Debug, Clone)]
pub struct Layout {
    main_dir: PathBuf,
    versions_dir: PathBuf,
    libraries_dir: PathBuf,
    assets_dir: PathBuf,
}

impl Layout {

    /// Create a new layout with all directories derived from the given main directory.
    pub fn new(main_dir: impl Into<PathBuf>) -> Self {
        let main_dir = main_dir.into();
        Self {
            versions_dir: main_dir.join("versions"),
            libraries_dir: main_dir.join("libraries"),
            assets_dir: main_dir.join("assets"),
            main_dir,
        }
    }

    /// Same as [`Self::new`] but using the default main directory in your system,
    /// returning none if there is no default main directory on your system.
    #[inline]
    pub fn new_with_default() -> Option<Self> {
        Some(Self::new(default_main_dir()?))
    }

    #[inline]
    pub fn main_dir(&self) -> &Path {
        &self.main_dir
    }

    /// Change the main directory and derive the `versions`, `libraries` and `assets`
    /// directories from it.
    pub fn set_main_dir(&mut self, main_dir: impl Into<PathBuf>) -> &mut Self {
        *self = Self::new(main_dir);
        self
    }

    /// The directory where versions are stored.
    #[inline]
    pub fn versions_dir(&self) -> &Path {
        &self.versions_dir
    }

    /// See [`Self::versions_dir`].
    #[inline]
    pub fn set_versions_dir(&mut self, versions_dir: impl Into<PathBuf>) -> &mut Self {
        self.versions_dir = versions_dir.into();
        self
    }

    /// The directory where libraries are stored, organized like a maven repository.
    #[inline]
    pub fn libraries_dir(&self) -> &Path {
        &self.libraries_dir
    }

    /// See [`Self::libraries_dir`].
    #[inline]
    pub fn set_libraries_dir(&mut self, libraries_dir: impl Into<PathBuf>) -> &mut Self {
        self.libraries_dir = libraries_dir.into();
        self
    }

    /// The directory where asset indexes, objects and log configs are stored.
    #[inline]
    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// See [`Self::assets_dir`].
    #[inline]
    pub fn set_assets_dir(&mut self, assets_dir: impl Into<PathBuf>) -> &mut Self {
        self.assets_dir = assets_dir.into();
        self
    }

    /// The directory of the given version.
    #[inline]
    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir.join(id)
    }

    /// The descriptor file of the given version, `versions/<id>/<id>.json`.
    #[inline]
    pub fn descriptor_file(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{id}.json"))
    }

    /// The client JAR file of the given version, `versions/<id>/<id>.jar`.
    #[inline]
    pub fn client_file(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{id}.jar"))
    }

    /// The file of the given asset index, `assets/indexes/<id>.json`.
    #[inline]
    pub fn asset_index_file(&self, id: &str) -> PathBuf {
        self.assets_dir.join("indexes").join(format!("{id}.json"))
    }

    /// The file of an asset object from its hash, `assets/objects/<hh>/<hash>`.
    pub fn asset_object_file(&self, hash: &Sha1HashString) -> PathBuf {
        let name = hash.to_string();
        let mut file = self.assets_dir.join("objects");
        file.push(&name[..2]);
        file.push(&name);
        file
    }

    /// Write the given resolved descriptor to its file in the versions directory,
    /// returning the written file.
    pub fn write_descriptor(&self, descriptor: &VersionDescriptor) -> Result<PathBuf> {

        if descriptor.is_inheritor() {
            return Err(Error::NotResolved { id: descriptor.id.clone() });
        }

        let file = self.descriptor_file(&descriptor.id);
        descriptor.write(&file)?;
        debug!(id = %descriptor.id, file = %file.display(), "wrote version descriptor");
        Ok(file)

    }

    /// Derive download tasks of the given resolved descriptor: its client JAR, the
    /// libraries allowed on the current OS, its logging configurations and its asset
    /// index. Asset objects are derived separately with [`Self::asset_tasks`] once the
    /// asset index is installed.
    pub fn version_tasks(&self, descriptor: &VersionDescriptor) -> Result<Vec<Task>> {

        if descriptor.is_inheritor() {
            return Err(Error::NotResolved { id: descriptor.id.clone() });
        }

        let mut tasks = Vec::new();
        let mut files = HashSet::new();
        let mut push = |task: Task| {
            if files.insert(task.file.clone()) {
                tasks.push(task);
            }
        };

        let client = descriptor.downloads.get("client")
            .ok_or_else(|| Error::ClientNotFound { id: descriptor.id.clone() })?;
        push(download_task(client, self.client_file(&descriptor.id)));

        for lib in &descriptor.libraries {
            if let Some(task) = self.library_task(lib) {
                push(task);
            }
        }

        if let Some(logging) = &descriptor.logging {
            for config in logging.values() {
                let file = self.assets_dir.join("log_configs").join(&config.file.id);
                push(download_task(&config.file.download, file));
            }
        }

        if let Some(asset_index) = &descriptor.asset_index {
            push(download_task(&asset_index.download, self.asset_index_file(&asset_index.id)));
        }

        debug!(id = %descriptor.id, count = tasks.len(), "derived version tasks");
        Ok(tasks)

    }

    /// Derive the download task of a library, none if its rules disallow it on the
    /// current OS or if it has no download information.
    fn library_task(&self, lib: &Library) -> Option<Task> {

        let mut classifier = None;

        if let Some(natives) = &lib.natives {
            // Natives are missing for this OS, the library is skipped.
            let platform = Platform::current();
            let (Some(name), Some(bits)) = (platform.name, platform.bits) else {
                return None;
            };
            classifier = Some(natives.get(name)?.replace("${arch}", bits));
        }

        if let Some(rules) = &lib.rules {
            if !check_rules(rules, &HashSet::new()) {
                trace!(name = %lib.name, "library rejected by rules");
                return None;
            }
        }

        let lib_dl = match &classifier {
            Some(classifier) => lib.downloads.classifiers.get(classifier),
            None => lib.downloads.artifact.as_ref(),
        };

        let maven_path = || maven_file_path(&lib.name, classifier.as_deref());

        let (rel_path, url, sha1) = if let Some(lib_dl) = lib_dl {
            let rel_path = match &lib_dl.path {
                Some(path) => path.clone(),
                None => maven_path()?,
            };
            (rel_path, lib_dl.download.url.clone(), lib_dl.download.sha1.as_deref().copied())
        } else if let Some(repo_url) = &lib.url {
            let rel_path = maven_path()?;
            let url = format!("{}/{rel_path}", repo_url.trim_end_matches('/'));
            (rel_path, url, None)
        } else {
            debug!(name = %lib.name, "library has no download information");
            return None;
        };

        // Libraries with empty URLs have been seen in the wild.
        if url.is_empty() {
            debug!(name = %lib.name, "library has an empty download url");
            return None;
        }

        let file = self.libraries_dir.join(rel_path);
        Some(Task::new(url, file).with_sha1(sha1))

    }

    /// Read and decode the given asset index from its installed file.
    pub fn load_asset_index(&self, id: &str) -> Result<AssetIndexFile> {

        let file = self.asset_index_file(id);
        let reader = match File::open(&file) {
            Ok(reader) => BufReader::new(reader),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::AssetsNotFound { id: id.to_string() }),
            Err(e) => return Err(Error::new_io(e, file.display().to_string())),
        };

        let mut deserializer = serde_json::Deserializer::from_reader(reader);
        serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|e| Error::new_json(e, file.display().to_string()))

    }

    /// Derive download tasks of all objects of the given asset index, objects sharing
    /// the same hash are only downloaded once.
    pub fn asset_tasks(&self, index: &AssetIndexFile) -> Vec<Task> {

        let mut unique_hashes = HashSet::new();
        let mut tasks = Vec::new();

        for object in index.objects.values() {

            if !unique_hashes.insert(object.hash) {
                continue;
            }

            let file = self.asset_object_file(&object.hash);
            let name = object.hash.to_string();
            let url = format!("{RESOURCES_URL}{}/{name}", &name[..2]);
            tasks.push(Task::new(url, file).with_sha1(Some(*object.hash)));

        }

        tasks

    }

}

fn download_task(download: &Download, file: PathBuf) -> Task {
    Task::new(download.url.clone(), file).with_sha1(download.sha1.as_deref().copied())
}

/// Return the relative file path of a maven-style library name in a repository,
/// `group:artifact:version[:classifier][@extension]`, the given classifier overrides
/// the name's one.
fn maven_file_path(name: &str, classifier: Option<&str>) -> Option<String> {

    let (name, extension) = name.split_once('@').unwrap_or((name, "jar"));

    let mut parts = name.split(':');
    let group = parts.next().filter(|s| !s.is_empty())?;
    let artifact = parts.next().filter(|s| !s.is_empty())?;
    let version = parts.next().filter(|s| !s.is_empty())?;
    let classifier = classifier.or(parts.next()).filter(|s| !s.is_empty());

    let mut path = group.replace('.', "/");
    path.push('/');
    path.push_str(artifact);
    path.push('/');
    path.push_str(version);
    path.push('/');
    path.push_str(artifact);
    path.push('-');
    path.push_str(version);
    if let Some(classifier) = classifier {
        path.push('-');
        path.push_str(classifier);
    }
    path.push('.');
    path.push_str(extension);

    Some(path)

}

/// Return true if the given rules allow the current platform with the given enabled
/// features. The last matching rule decides, and nothing is allowed without a match.
pub fn check_rules(rules: &[Rule], features: &HashSet<String>) -> bool {
    let platform = Platform::current();
    rules.iter()
        .rev()
        .find(|rule| platform.matches(&rule.os) && features_match(rule, features))
        .is_some_and(|rule| rule.action == RuleAction::Allow)
}

fn features_match(rule: &Rule, features: &HashSet<String>) -> bool {
    rule.features.iter().all(|(name, enabled)| features.contains(name) == *enabled)
}

/// Return the default main directory for Minecraft, so called ".minecraft".
pub fn default_main_dir() -> Option<PathBuf> {
    let (base, name) = if cfg!(target_os = "windows") {
        (dirs::data_dir(), ".minecraft")
    } else if cfg!(target_os = "macos") {
        (dirs::data_dir(), "minecraft")
    } else {
        (dirs::home_dir(), ".minecraft")
    };
    base.map(|dir| dir.join(name))
}

/// The platform this crate has been compiled for, named like in rules and natives,
/// none if unknown to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Platform {
    name: Option<&'static str>,
    arch: Option<&'static str>,
    bits: Option<&'static str>,
}

impl Platform {

    fn current() -> Self {

        let name = match env::consts::OS {
            "macos" => Some("osx"),
            os @ ("windows" | "linux" | "freebsd" | "openbsd" | "netbsd") => Some(os),
            _ => None,
        };

        let (arch, bits) = match env::consts::ARCH {
            "x86" => (Some("x86"), Some("32")),
            "x86_64" => (Some("x86_64"), Some("64")),
            "arm" => (Some("arm32"), Some("32")),
            "aarch64" => (Some("arm64"), Some("64")),
            _ => (None, None),
        };

        Self { name, arch, bits }

    }

    /// Return true if this platform satisfies the OS constraint of a rule. The OS
    /// version isn't known so a version constraint is ignored, but a name or arch
    /// constraint never matches an unknown platform.
    fn matches(&self, os: &RuleOs) -> bool {
        os.name.as_deref().is_none_or(|name| self.name == Some(name))
            && os.arch.as_deref().is_none_or(|arch| self.arch == Some(arch))
    }

}

/// An asset index, mapping asset paths to their objects.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct AssetIndexFile {
    /// For versions <= 13w23b (1.6.1).
    #[serde(default)]
    pub map_to_resources: bool,
    /// For 13w23b (1.6.1) < version <= 13w48b (1.7.2).
    #[serde(default)]
    pub r#virtual: bool,
    pub objects: HashMap<String, AssetObject>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct AssetObject {
    pub size: u64,
    pub hash: Sha1HashString,
}

/// The install tasks could not be derived.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The descriptor still has a parent, it must be flattened first.
    #[error("not resolved: {id}")]
    NotResolved {
        id: String,
    },
    /// The descriptor has no client download.
    #[error("client not found: {id}")]
    ClientNotFound {
        id: String,
    },
    /// The asset index has not been installed.
    #[error("assets not found: {id}")]
    AssetsNotFound {
        id: String,
    },
    /// A version error while writing a descriptor.
    #[error("version: {0}")]
    Version(#[from] version::Error),
    /// A generic error that originates from third-party dependencies, associated to an
    /// origin string that helps knowing the location of the issue.
    #[error("internal: {error} @ {origin}")]
    Internal {
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
        origin: Box<str>,
    },
}

/// Type alias for a result with the install error type.
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

}
