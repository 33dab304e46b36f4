//! Icon maps, with icons referenced by image name.

use serde::{Deserialize, Serialize};

use super::{join_path, AssetError, AssetKind, Result};
use crate::zabbix::{IconMapObject, IconMappingObject};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IconMapping {
    pub inventory_link: String,
    pub expression: String,
    #[serde(default)]
    pub sortorder: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IconMap {
    pub name: String,
    pub default_icon: String,
    #[serde(default)]
    pub mappings: Vec<IconMapping>,
}

impl IconMap {
    /// Converts a live icon map, translating icon ids with `icon_name`.
    ///
    /// Mappings are ordered by their `sortorder`.
    pub fn from_zabbix<F>(object: &IconMapObject, icon_name: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing = |id: &str| AssetError::IconMissing {
            icon_map: object.name.clone(),
            icon: id.to_string(),
        };

        let default_icon =
            icon_name(&object.default_iconid).ok_or_else(|| missing(&object.default_iconid))?;

        let mut ordered: Vec<&IconMappingObject> = object.mappings.iter().collect();
        ordered.sort_by_key(|m| m.sortorder.parse::<u32>().unwrap_or(u32::MAX));

        let mappings = ordered
            .into_iter()
            .map(|m| {
                Ok(IconMapping {
                    inventory_link: m.inventory_link.clone(),
                    expression: m.expression.clone(),
                    sortorder: m.sortorder.clone(),
                    icon: icon_name(&m.iconid).ok_or_else(|| missing(&m.iconid))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: object.name.clone(),
            default_icon,
            mappings,
        })
    }

    /// Converts to the API shape, translating icon names with `icon_id`.
    ///
    /// The position in `mappings` decides the order on the server.
    pub fn to_zabbix<F>(&self, iconmapid: Option<String>, icon_id: F) -> Result<IconMapObject>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |name: &str| {
            icon_id(name).ok_or_else(|| AssetError::IconMissing {
                icon_map: self.name.clone(),
                icon: name.to_string(),
            })
        };

        let mappings = self
            .mappings
            .iter()
            .enumerate()
            .map(|(i, m)| {
                Ok(IconMappingObject {
                    iconid: resolve(&m.icon)?,
                    inventory_link: m.inventory_link.clone(),
                    expression: m.expression.clone(),
                    sortorder: i.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(IconMapObject {
            iconmapid,
            name: self.name.clone(),
            default_iconid: resolve(&self.default_icon)?,
            mappings,
        })
    }

    pub fn parse(source: &str, origin: &str) -> Result<Self> {
        let map: IconMap = serde_yaml::from_str(source).map_err(|e| AssetError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        if map.name.trim().is_empty() {
            return Err(AssetError::Invalid {
                kind: AssetKind::IconMap,
                message: format!("'{}' has an empty name", origin),
            });
        }
        Ok(map)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| AssetError::Serialize {
            kind: AssetKind::IconMap,
            name: self.name.clone(),
            message: e.to_string(),
        })
    }

    pub fn cache_path(&self, prefix: &str) -> String {
        join_path(&[prefix, &format!("{}.yaml", self.name)])
    }
}
