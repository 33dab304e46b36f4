//! Zabbix API error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZabbixError {
    #[error("HTTP request to Zabbix failed: {0}")]
    Http(String),

    #[error("Zabbix API call '{method}' failed ({code}): {message} {data}")]
    Api {
        method: String,
        code: i64,
        message: String,
        data: String,
    },

    #[error("Invalid response to '{method}': {message}")]
    InvalidResponse { method: String, message: String },

    #[error("Zabbix server version {0} is not supported, 7.0 or newer is required")]
    UnsupportedVersion(String),

    #[error("Zabbix authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to load CA bundle '{path}': {message}")]
    CaBundle { path: String, message: String },

    #[error("{kind} '{name}' not found in Zabbix")]
    NotFound { kind: &'static str, name: String },
}

impl From<reqwest::Error> for ZabbixError {
    fn from(err: reqwest::Error) -> Self {
        ZabbixError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ZabbixError>;
