use std::path::PathBuf;
use thiserror::Error;

use crate::assets::AssetError;
use crate::cache::CacheError;
use crate::gitops::GitOpsError;
use crate::secrets::SecretError;
use crate::zabbix::ZabbixError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Git error: {0}")]
    Git(#[from] GitOpsError),

    #[error("Zabbix error: {0}")]
    Zabbix(#[from] ZabbixError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Template link cycle detected: {}", .chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error("Image generation failed for '{path}': {message}")]
    ImageGeneration { path: PathBuf, message: String },

    #[error("Interrupted by user")]
    Interrupted,
}

impl SyncError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Interrupted => 130,
            _ => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {message}", .path.display())]
    ParseYaml { path: PathBuf, message: String },

    #[error("Unknown setting '{0}'")]
    UnknownKey(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required setting '{0}'")]
    Missing(&'static str),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;
