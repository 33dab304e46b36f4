//! Global scripts.
//!
//! The cache file is the API object without `scriptid`. Its `usrgrpid`
//! key holds the user group *name*, empty meaning all user groups.

use super::{join_path, AssetError, AssetKind, Result};
use crate::zabbix::{ScriptObject, UserGroup};

/// `usrgrpid` of a script available to all user groups.
const ALL_USER_GROUPS: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    object: ScriptObject,
}

impl Script {
    /// Converts a live script, replacing its user group id with the name.
    ///
    /// With `force_default`, every script is stored with `default_group`.
    /// A group id missing from `user_groups` is stored as `default_group`
    /// as well.
    pub fn from_zabbix(
        object: &ScriptObject,
        user_groups: &[UserGroup],
        default_group: &str,
        force_default: bool,
    ) -> Self {
        let mut object = object.clone();
        object.scriptid = None;
        object.usrgrpid = if force_default {
            default_group.to_string()
        } else if object.usrgrpid == ALL_USER_GROUPS {
            String::new()
        } else {
            match user_groups.iter().find(|g| g.usrgrpid == object.usrgrpid) {
                Some(group) => group.name.clone(),
                None => {
                    log::warn!(
                        "User group {} of script '{}' not found, storing '{}'",
                        object.usrgrpid,
                        object.name,
                        default_group
                    );
                    default_group.to_string()
                }
            }
        };
        Self { object }
    }

    pub fn parse(source: &str, origin: &str) -> Result<Self> {
        let object: ScriptObject = serde_yaml::from_str(source).map_err(|e| AssetError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        if object.name.trim().is_empty() {
            return Err(AssetError::Invalid {
                kind: AssetKind::Script,
                message: format!("'{}' has an empty name", origin),
            });
        }
        Ok(Self { object })
    }

    pub fn name(&self) -> &str {
        &self.object.name
    }

    fn menu_path(&self) -> &str {
        self.object.menu_path.trim_matches('/')
    }

    /// `menu_path/name`, unique across scripts.
    pub fn unique_name(&self) -> String {
        join_path(&[self.menu_path(), &self.object.name])
    }

    /// User group name, `None` for all groups.
    pub fn user_group(&self) -> Option<&str> {
        Some(self.object.usrgrpid.as_str()).filter(|g| !g.is_empty())
    }

    pub fn cache_path(&self, prefix: &str) -> String {
        let file = format!("{}.yaml", self.object.name);
        join_path(&[prefix, self.menu_path(), &file])
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.object).map_err(|e| AssetError::Serialize {
            kind: AssetKind::Script,
            name: self.unique_name(),
            message: e.to_string(),
        })
    }

    /// API object with the user group resolved to `usrgrpid`.
    pub fn to_zabbix(&self, scriptid: Option<String>, usrgrpid: Option<String>) -> ScriptObject {
        let mut object = self.object.clone();
        object.scriptid = scriptid;
        object.usrgrpid = usrgrpid.unwrap_or_else(|| ALL_USER_GROUPS.to_string());
        object
    }
}
