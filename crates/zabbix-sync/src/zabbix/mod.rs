//! Zabbix API access.

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use api::ZabbixApi;
pub use client::{fetch_server_version, ZabbixClient};
pub use error::{Result, ZabbixError};
pub use types::*;
