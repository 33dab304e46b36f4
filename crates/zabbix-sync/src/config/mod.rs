//! Settings and their sources.

pub mod loader;
pub mod settings;

pub use loader::{apply_config_file, apply_config_str, apply_env, load_settings};
pub use settings::{RawValue, Settings};
