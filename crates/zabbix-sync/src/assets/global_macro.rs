//! Global macros.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{join_path, AssetError, AssetKind, Result};
use crate::zabbix::{GlobalMacroObject, MACRO_TYPE_SECRET};

/// Value written to the cache in place of a secret macro's value.
pub const HIDDEN_VALUE: &str = "HIDDEN_VALUE";

static RE_UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GlobalMacro {
    #[serde(rename = "macro")]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub macro_type: String,
}

impl GlobalMacro {
    pub fn from_zabbix(object: &GlobalMacroObject) -> Self {
        let value = if object.macro_type == MACRO_TYPE_SECRET {
            HIDDEN_VALUE.to_string()
        } else {
            object.value.clone().unwrap_or_default()
        };
        Self {
            name: object.name.clone(),
            value,
            description: object.description.clone(),
            macro_type: object.macro_type.clone(),
        }
    }

    pub fn parse(source: &str, origin: &str) -> Result<Self> {
        let parsed: GlobalMacro = serde_yaml::from_str(source).map_err(|e| AssetError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        if parsed.name.trim().is_empty() {
            return Err(AssetError::Invalid {
                kind: AssetKind::GlobalMacro,
                message: format!("'{}' has an empty macro name", origin),
            });
        }
        Ok(parsed)
    }

    pub fn is_secret(&self) -> bool {
        self.macro_type == MACRO_TYPE_SECRET
    }

    /// Cache path: `<prefix>/<slug>_<digest>.yaml`.
    ///
    /// Macro names like `{$SNMP_COMMUNITY:"public"}` are not safe file
    /// names. The slug keeps them readable, the digest of the full name
    /// keeps distinct macros apart.
    pub fn cache_path(&self, prefix: &str) -> String {
        let slug = RE_UNSAFE_FILE_CHARS.replace_all(&self.name, "_");
        let slug = slug.trim_matches('_');

        let digest = Sha256::digest(self.name.as_bytes());
        let mut short = String::with_capacity(8);
        for byte in digest.iter().take(4) {
            let _ = write!(short, "{:02x}", byte);
        }

        join_path(&[prefix, &format!("{}_{}.yaml", slug, short)])
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| AssetError::Serialize {
            kind: AssetKind::GlobalMacro,
            name: self.name.clone(),
            message: e.to_string(),
        })
    }

    pub fn to_zabbix(&self, globalmacroid: Option<String>) -> GlobalMacroObject {
        GlobalMacroObject {
            globalmacroid,
            name: self.name.clone(),
            value: Some(self.value.clone()),
            description: self.description.clone(),
            macro_type: if self.macro_type.is_empty() {
                "0".to_string()
            } else {
                self.macro_type.clone()
            },
        }
    }
}
