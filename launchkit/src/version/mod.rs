//! Version descriptors and their resolution. A version descriptor may inherit from a
//! parent version, in which case it must be flattened with its whole ancestry before
//! being usable.

mod raw;
mod resolver;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::io;

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::serde::Sha1HashString;

pub use resolver::Resolver;


/// The main class value of a descriptor that doesn't define one.
pub const NO_MAIN_CLASS: &str = "none";

/// Launch metadata of a single version. Values absent from the decoded document are
/// replaced by defaults (no asset index, empty downloads, `"none"` main class, empty
/// type...) so that a child descriptor can be merged onto its parent field by field.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", from = "raw::RawVersionDescriptor")]
pub struct VersionDescriptor {
    pub id: String,
    /// If present, the descriptor is unresolved and this is its parent version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    pub arguments: Arguments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndex>,
    /// Legacy asset index id.
    pub assets: String,
    pub compliance_level: u32,
    /// Entry point JAR files, such as the client or the server.
    pub downloads: HashMap<String, Download>,
    /// Class path libraries, their order is kept across merges.
    pub libraries: Vec<Library>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<HashMap<String, Logging>>,
    pub main_class: String,
    pub minimum_launcher_version: u32,
    pub release_time: DateTime<FixedOffset>,
    pub time: DateTime<FixedOffset>,
    /// The version type, such as 'release' or 'snapshot', empty if unknown.
    #[serde(rename = "type")]
    pub r#type: String,
}

impl VersionDescriptor {

    /// Decode a descriptor from its JSON document.
    pub fn decode(raw: &[u8]) -> std::result::Result<Self, serde_path_to_error::Error<serde_json::Error>> {
        let mut deserializer = serde_json::Deserializer::from_slice(raw);
        serde_path_to_error::deserialize(&mut deserializer)
    }

    /// Write this descriptor as a JSON document to the given file, creating its parent
    /// directories if needed.
    pub fn write(&self, file: &Path) -> Result<()> {

        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::new_io(e, parent.display().to_string()))?;
        }

        let data = serde_json::to_vec(self)
            .map_err(|e| Error::Internal { error: Box::new(e), origin: file.display().to_string().into() })?;
        std::fs::write(file, data)
            .map_err(|e| Error::new_io(e, file.display().to_string()))

    }

    /// Return true if this descriptor has a parent and must be flattened before use.
    #[inline]
    pub fn is_inheritor(&self) -> bool {
        self.inherits_from.is_some()
    }

    /// Return true if this descriptor is resolved (has no parent) and defines all the
    /// fields required to launch it.
    pub fn validate(&self) -> bool {
        match self.invalid_reason() {
            Some(reason) => {
                debug!(id = %self.id, reason, "invalid version descriptor");
                false
            }
            None => true,
        }
    }

    fn invalid_reason(&self) -> Option<&'static str> {
        if self.is_inheritor() {
            Some("has a parent")
        } else if self.arguments.is_empty() {
            Some("no arguments")
        } else if self.asset_index.is_none() {
            Some("no asset index")
        } else if self.downloads.is_empty() {
            Some("no downloads")
        } else if self.r#type.is_empty() {
            Some("no type")
        } else if self.main_class == NO_MAIN_CLASS {
            Some("no main class")
        } else {
            None
        }
    }

    /// Flatten this descriptor with its whole ancestry, parents are obtained from the
    /// given provider and are themselves flattened before the child is merged onto
    /// them. A descriptor without parent is returned unchanged if valid.
    pub fn flatten<P>(self, provider: &mut P) -> Result<Self>
    where
        P: ParentProvider + ?Sized,
    {
        let mut visited = HashSet::new();
        self.flatten_inner(provider, &mut visited)
    }

    fn flatten_inner<P>(self, provider: &mut P, visited: &mut HashSet<String>) -> Result<Self>
    where
        P: ParentProvider + ?Sized,
    {

        let Some(parent_id) = self.inherits_from.clone() else {
            if !self.validate() {
                return Err(Error::InvalidVersionData { id: self.id });
            }
            return Ok(self);
        };

        visited.insert(self.id.clone());
        if !visited.insert(parent_id.clone()) {
            return Err(Error::CyclicInheritance { id: parent_id });
        }

        debug!(id = %self.id, parent = %parent_id, "flattening version descriptor");

        let parent = provider.provide(&parent_id)?;
        let parent = parent.flatten_inner(provider, visited)?;
        Ok(self.merge_onto(parent))

    }

    /// Merge this child descriptor onto its already resolved parent.
    fn merge_onto(self, parent: Self) -> Self {

        let mut arguments = parent.arguments;
        arguments.jvm.extend(self.arguments.jvm);
        arguments.game.extend(self.arguments.game);

        let mut downloads = parent.downloads;
        downloads.extend(self.downloads);

        let mut libraries = parent.libraries;
        libraries.extend(self.libraries);

        Self {
            id: self.id,
            inherits_from: None,
            arguments,
            asset_index: self.asset_index.or(parent.asset_index),
            assets: parent.assets,
            compliance_level: self.compliance_level,
            downloads,
            libraries,
            logging: self.logging.or(parent.logging),
            main_class: if self.main_class == NO_MAIN_CLASS { parent.main_class } else { self.main_class },
            minimum_launcher_version: self.minimum_launcher_version,
            release_time: self.release_time,
            time: self.time,
            r#type: if self.r#type.is_empty() { parent.r#type } else { self.r#type },
        }

    }

}

/// Provider of parent descriptors when flattening.
pub trait ParentProvider {

    /// Return the (possibly unresolved) descriptor of the given parent version, failing
    /// with [`Error::InvalidParent`] if it doesn't exist.
    fn provide(&mut self, id: &str) -> Result<VersionDescriptor>;

}

/// Adapter to use a closure as a parent provider.
#[derive(Debug, Clone)]
pub struct FnProvider<F>(pub F);

impl<F> ParentProvider for FnProvider<F>
where
    F: FnMut(&str) -> Result<VersionDescriptor>,
{
    fn provide(&mut self, id: &str) -> Result<VersionDescriptor> {
        (self.0)(id)
    }
}

/// Descriptors known in advance, mapped by their id.
impl ParentProvider for HashMap<String, VersionDescriptor> {
    fn provide(&mut self, id: &str) -> Result<VersionDescriptor> {
        self.get(id)
            .cloned()
            .ok_or_else(|| Error::InvalidParent { id: id.to_string() })
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Default)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Argument>,
    #[serde(default)]
    pub jvm: Vec<Argument>,
}

impl Arguments {

    /// Arguments of legacy descriptors that only define a game command line, it's
    /// split on whitespaces.
    pub fn from_legacy(line: &str) -> Self {
        Self {
            game: line.split_whitespace().map(|arg| Argument::Raw(arg.to_string())).collect(),
            jvm: Vec::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.game.is_empty() && self.jvm.is_empty()
    }

}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Argument {
    Raw(String),
    Conditional(ConditionalArgument),
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct ConditionalArgument {
    pub value: SingleOrVec<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
}

/// Describe the asset index to use and how to download it.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndex {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    #[serde(flatten)]
    pub download: Download,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    /// Maven-style name of the library, `group:artifact:version[:classifier]`.
    pub name: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "LibraryDownloads::is_empty")]
    pub downloads: LibraryDownloads,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natives: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
    /// Base URL of the maven repository, for libraries without download information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Default, Clone, PartialEq)]
pub struct LibraryDownloads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryDownload>,
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub classifiers: HashMap<String, LibraryDownload>,
}

impl LibraryDownloads {
    fn is_empty(&self) -> bool {
        self.artifact.is_none() && self.classifiers.is_empty()
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct LibraryDownload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub download: Download,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct Logging {
    pub argument: String,
    pub file: LoggingFile,
    #[serde(rename = "type")]
    #[serde(default)]
    pub r#type: String,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct LoggingFile {
    pub id: String,
    #[serde(flatten)]
    pub download: Download,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: RuleOs,
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub features: HashMap<String, bool>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Default, Clone, PartialEq)]
pub struct RuleOs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// A regular expression on the OS version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct Download {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<Sha1HashString>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum SingleOrVec<T> {
    Single(T),
    Vec(Vec<T>)
}

/// A version descriptor could not be resolved.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The resolved descriptor lacks a field required to launch it.
    #[error("invalid version data: {id}")]
    InvalidVersionData {
        id: String,
    },
    /// The parent version could not be found.
    #[error("invalid parent: {id}")]
    InvalidParent {
        id: String,
    },
    /// The given version appears twice in the hierarchy, implying an infinite recursion.
    #[error("cyclic inheritance: {id}")]
    CyclicInheritance {
        id: String,
    },
    /// The version to download is absent from the manifest.
    #[error("version not found: {id}")]
    VersionNotFound {
        id: String,
    },
    /// The downloaded descriptor doesn't match its expected SHA-1.
    #[error("invalid sha1 hash: {url}")]
    InvalidShaHash {
        url: String,
    },
    /// A generic error that originates from third-party dependencies, associated to an
    /// origin string that helps knowing the location of the issue.
    #[error("internal: {error} @ {origin}")]
    Internal {
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
        origin: Box<str>,
    },
}

/// Type alias for a result with the version error type.
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
