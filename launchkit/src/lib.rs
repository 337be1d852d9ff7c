//! Launchkit is the networked core of a Minecraft launcher: it keeps the versions
//! manifest available offline, resolves inherited version descriptors, downloads and
//! verifies game files in parallel and authenticates Microsoft accounts.

mod http;
mod tokio;
mod serde;

pub mod store;
pub mod manifest;
pub mod version;
pub mod download;
pub mod install;
pub mod msa;
