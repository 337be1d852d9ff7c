//! Raw schema of version descriptors as found in JSON documents, normalized into
//! [`VersionDescriptor`] once decoded.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};

use crate::serde::deserialize_date_time_chill;

use super::{Arguments, AssetIndex, Download, Library, Logging, VersionDescriptor, NO_MAIN_CLASS};


const DEFAULT_ASSETS: &str = "3";
const DEFAULT_COMPLIANCE_LEVEL: u32 = 3;

#[derive(serde::Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RawVersionDescriptor {
    id: String,
    inherits_from: Option<String>,
    arguments: Option<Arguments>,
    /// Game arguments line of descriptors older than 1.13.
    minecraft_arguments: Option<String>,
    asset_index: Option<AssetIndex>,
    assets: Option<String>,
    compliance_level: Option<u32>,
    #[serde(default)]
    downloads: HashMap<String, Download>,
    #[serde(default)]
    libraries: Vec<Library>,
    logging: Option<HashMap<String, Logging>>,
    main_class: Option<String>,
    minimum_launcher_version: Option<u32>,
    #[serde(deserialize_with = "deserialize_date_time_chill")]
    release_time: DateTime<FixedOffset>,
    #[serde(deserialize_with = "deserialize_date_time_chill")]
    time: DateTime<FixedOffset>,
    #[serde(rename = "type")]
    r#type: Option<String>,
}

impl From<RawVersionDescriptor> for VersionDescriptor {

    fn from(raw: RawVersionDescriptor) -> Self {

        // Modern arguments take precedence if a descriptor defines both.
        let arguments = match (raw.arguments, raw.minecraft_arguments) {
            (Some(arguments), _) => arguments,
            (None, Some(line)) => Arguments::from_legacy(&line),
            (None, None) => Arguments::default(),
        };

        Self {
            id: raw.id,
            inherits_from: raw.inherits_from,
            arguments,
            asset_index: raw.asset_index,
            assets: raw.assets.unwrap_or_else(|| DEFAULT_ASSETS.to_string()),
            compliance_level: raw.compliance_level.unwrap_or(DEFAULT_COMPLIANCE_LEVEL),
            downloads: raw.downloads,
            libraries: raw.libraries,
            // An empty logging object configures nothing.
            logging: raw.logging.filter(|logging| !logging.is_empty()),
            main_class: raw.main_class.unwrap_or_else(|| NO_MAIN_CLASS.to_string()),
            minimum_launcher_version: raw.minimum_launcher_version.unwrap_or(0),
            release_time: raw.release_time,
            time: raw.time,
            r#type: raw.r#type.unwrap_or_default(),
        }

    }

}
