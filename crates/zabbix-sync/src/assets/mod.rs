//! Typed representations of synchronized Zabbix objects.
//!
//! Each asset knows its name, the cache path derived from it, and how to
//! serialize itself to the cache. The path is a pure function of the
//! asset's identity, so re-exporting an unchanged object rewrites the same
//! file with the same content.

pub mod global_macro;
pub mod icon_map;
pub mod image;
pub mod script;
pub mod template;

use std::fmt;

use thiserror::Error;

pub use global_macro::GlobalMacro;
pub use icon_map::{IconMap, IconMapping};
pub use image::{Image, ImageType};
pub use script::Script;
pub use template::Template;

/// The kinds of configuration objects kept in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Template,
    Image,
    IconMap,
    Script,
    GlobalMacro,
}

impl AssetKind {
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Template => "template",
            AssetKind::Image => "image",
            AssetKind::IconMap => "icon map",
            AssetKind::Script => "script",
            AssetKind::GlobalMacro => "global macro",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to parse '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("Failed to serialize {kind} '{name}': {message}")]
    Serialize {
        kind: AssetKind,
        name: String,
        message: String,
    },

    #[error("Invalid {kind}: {message}")]
    Invalid { kind: AssetKind, message: String },

    #[error("Icon map '{icon_map}' references unknown icon '{icon}'")]
    IconMissing { icon_map: String, icon: String },

    #[error("Template '{name}' has export version {version}, server expects {expected}")]
    VersionMismatch {
        name: String,
        version: String,
        expected: String,
    },

    #[error("'{path}' is not a {kind} cache path")]
    UnexpectedPath { kind: AssetKind, path: String },
}

pub type Result<T> = std::result::Result<T, AssetError>;

/// Joins non-empty path segments with `/`.
pub(crate) fn join_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path_skips_empty_segments() {
        assert_eq!(join_path(&["templates", "", "Linux/", "a.yaml"]), "templates/Linux/a.yaml");
        assert_eq!(join_path(&["", "a.yaml"]), "a.yaml");
    }
}
