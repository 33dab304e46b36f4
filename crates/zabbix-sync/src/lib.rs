pub mod assets;
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod gitops;
pub mod handlers;
pub mod imaging;
pub mod logging;
pub mod ordering;
pub mod reconciler;
pub mod sanitize;
pub mod secrets;
pub mod zabbix;

pub use assets::{AssetError, AssetKind, ImageType};
pub use cache::{CacheError, CacheRoot};
pub use config::{load_settings, RawValue, Settings};
pub use error::{ConfigError, Result, SyncError};
pub use filter::Filter;
pub use gitops::{GitOpsError, GitRepository};
pub use handlers::{AssetHandler, HandlerRegistry, ImportOutcome, LiveInventory, SyncContext};
pub use logging::ErrorCounter;
pub use reconciler::{ChangeSet, GenerateReport, PullReport, PushReport, Reconciler};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use zabbix::{ServerVersion, ZabbixApi, ZabbixClient, ZabbixError};
