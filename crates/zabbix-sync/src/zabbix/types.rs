//! Zabbix API object shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ZabbixError;

/// Zabbix server version as reported by `apiinfo.version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const MINIMUM: ServerVersion = ServerVersion {
        major: 7,
        minor: 0,
        patch: 0,
    };

    pub fn parse(raw: &str) -> Result<Self, ZabbixError> {
        let invalid = || ZabbixError::InvalidResponse {
            method: "apiinfo.version".to_string(),
            message: format!("unparseable version '{}'", raw),
        };

        let mut parts = raw.trim().split('.');
        let mut next = |required: bool| -> Result<u32, ZabbixError> {
            match parts.next() {
                Some(p) => p
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };

        Ok(Self {
            major: next(true)?,
            minor: next(true)?,
            patch: next(false)?,
        })
    }

    pub fn is_supported(&self) -> bool {
        *self >= Self::MINIMUM
    }

    /// `major.minor`, the format of a template export's `version` key.
    pub fn short(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TemplateGroupSummary {
    pub groupid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TemplateSummary {
    pub templateid: String,
    /// Technical template name, `template` in exports.
    pub host: String,
}

/// `imagetype` value of an icon.
pub const IMAGE_TYPE_ICON: &str = "1";
/// `imagetype` value of a background.
pub const IMAGE_TYPE_BACKGROUND: &str = "2";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImageObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imageid: Option<String>,
    pub name: String,
    pub imagetype: String,
    /// Base64 encoded image data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IconMappingObject {
    pub iconid: String,
    pub inventory_link: String,
    pub expression: String,
    /// Read-only, the position in `mappings` decides the order on write.
    #[serde(default, skip_serializing)]
    pub sortorder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IconMapObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iconmapid: Option<String>,
    pub name: String,
    pub default_iconid: String,
    #[serde(default)]
    pub mappings: Vec<IconMappingObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScriptParameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScriptObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scriptid: Option<String>,
    pub name: String,
    pub command: String,
    pub host_access: String,
    pub usrgrpid: String,
    pub groupid: String,
    pub description: String,
    pub confirmation: String,
    #[serde(rename = "type")]
    pub script_type: String,
    pub execute_on: String,
    pub timeout: String,
    pub scope: String,
    pub port: String,
    pub authtype: String,
    pub username: String,
    pub password: String,
    pub publickey: String,
    pub privatekey: String,
    pub menu_path: String,
    pub url: String,
    pub new_window: String,
    pub manualinput: String,
    pub manualinput_prompt: String,
    pub manualinput_validator: String,
    pub manualinput_validator_type: String,
    pub manualinput_default_value: String,
    pub parameters: Vec<ScriptParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserGroup {
    pub usrgrpid: String,
    pub name: String,
}

/// `type` value of a secret global macro.
pub const MACRO_TYPE_SECRET: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GlobalMacroObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globalmacroid: Option<String>,
    #[serde(rename = "macro")]
    pub name: String,
    /// Absent for secret macros.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_macro_type")]
    pub macro_type: String,
}

fn default_macro_type() -> String {
    "0".to_string()
}
