//! Zabbix templates as `zabbix_export` YAML documents.

use serde_yaml::{Mapping, Value};

use super::{join_path, AssetError, AssetKind, Result};
use crate::zabbix::ServerVersion;

const EXPORT_KEY: &str = "zabbix_export";

/// One exported template, holding the `zabbix_export` mapping without its
/// volatile `date` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    export: Mapping,
    name: String,
    uuid: String,
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn str_field<'a>(map: &'a Mapping, name: &str) -> Option<&'a str> {
    map.get(name).and_then(Value::as_str)
}

/// `name` entries of a sequence of `{name: ...}` mappings.
fn names_of(map: &Mapping, list: &str) -> Vec<String> {
    map.get(list)
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Template {
    /// Parses an export document, as returned by `configuration.export` or
    /// as stored in the cache.
    pub fn parse(source: &str, origin: &str) -> Result<Self> {
        let parse_error = |message: String| AssetError::Parse {
            path: origin.to_string(),
            message,
        };

        let document: Value =
            serde_yaml::from_str(source).map_err(|e| parse_error(e.to_string()))?;
        let export: Mapping = match document.get(EXPORT_KEY) {
            Some(Value::Mapping(m)) => m
                .iter()
                .filter(|(k, _)| k.as_str() != Some("date"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => return Err(parse_error(format!("missing '{}' mapping", EXPORT_KEY))),
        };

        let first = export
            .get("templates")
            .and_then(Value::as_sequence)
            .and_then(|seq| seq.first())
            .and_then(Value::as_mapping)
            .ok_or_else(|| parse_error("export contains no templates".to_string()))?;
        let name = str_field(first, "template")
            .ok_or_else(|| parse_error("template has no 'template' name".to_string()))?
            .to_string();
        let uuid = str_field(first, "uuid")
            .ok_or_else(|| parse_error(format!("template '{}' has no uuid", name)))?
            .to_string();

        Ok(Self { export, name, uuid })
    }

    /// Technical name of the first template in the export.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    fn templates(&self) -> impl Iterator<Item = &Mapping> {
        self.export
            .get("templates")
            .and_then(Value::as_sequence)
            .into_iter()
            .flatten()
            .filter_map(Value::as_mapping)
    }

    fn first(&self) -> Option<&Mapping> {
        self.templates().next()
    }

    fn first_mut(&mut self) -> Option<&mut Mapping> {
        self.export
            .get_mut("templates")
            .and_then(Value::as_sequence_mut)
            .and_then(|seq| seq.first_mut())
            .and_then(Value::as_mapping_mut)
    }

    /// Uuids of every template in the export.
    pub fn uuids(&self) -> Vec<String> {
        self.templates()
            .filter_map(|t| str_field(t, "uuid"))
            .map(str::to_string)
            .collect()
    }

    /// Names of the templates this one links to.
    pub fn linked_names(&self) -> Vec<String> {
        self.first()
            .map(|t| names_of(t, "templates"))
            .unwrap_or_default()
    }

    pub fn groups(&self) -> Vec<String> {
        self.first().map(|t| names_of(t, "groups")).unwrap_or_default()
    }

    /// Export format version, `major.minor`.
    pub fn format_version(&self) -> Option<&str> {
        str_field(&self.export, "version")
    }

    /// Group path of the template below `root`.
    ///
    /// The deepest group nested in `root` wins. `Some("")` means the
    /// template sits directly in `root`, `None` that it is outside of it.
    pub fn group_path(&self, root: &str) -> Option<String> {
        let nested_prefix = format!("{}/", root);
        self.groups()
            .into_iter()
            .filter(|g| g == root || g.starts_with(&nested_prefix))
            .max_by_key(|g| g.matches('/').count())
            .map(|g| {
                g.strip_prefix(root)
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_string()
            })
    }

    /// Cache path: `<prefix>/<group path>/<name>.yaml`.
    pub fn cache_path(&self, prefix: &str, root_group: &str) -> String {
        let group = self.group_path(root_group).unwrap_or_default();
        let file = format!("{}.yaml", self.name);
        join_path(&[prefix, &group, &file])
    }

    /// Current `vendor` name and version.
    pub fn vendor(&self) -> (Option<&str>, Option<&str>) {
        let vendor = self
            .first()
            .and_then(|t| t.get("vendor"))
            .and_then(Value::as_mapping);
        match vendor {
            Some(v) => (str_field(v, "name"), str_field(v, "version")),
            None => (None, None),
        }
    }

    /// Sets `vendor.name`. Returns whether the document changed.
    pub fn set_vendor_name(&mut self, name: &str) -> bool {
        self.set_vendor_field("name", name)
    }

    /// Sets `vendor.version`. Returns whether the document changed.
    pub fn set_vendor_version(&mut self, version: &str) -> bool {
        self.set_vendor_field("version", version)
    }

    fn set_vendor_field(&mut self, field: &str, value: &str) -> bool {
        let Some(template) = self.first_mut() else {
            return false;
        };

        if let Some(Value::Mapping(vendor)) = template.get_mut("vendor") {
            if str_field(vendor, field) == Some(value) {
                return false;
            }
            vendor.insert(key(field), key(value));
            return true;
        }

        let mut vendor = Mapping::new();
        vendor.insert(key("name"), key(""));
        vendor.insert(key("version"), key(""));
        vendor.insert(key(field), key(value));

        // vendor follows description, or name when there is none
        let anchor = if template.contains_key("description") {
            "description"
        } else {
            "name"
        };
        insert_after(template, anchor, "vendor", Value::Mapping(vendor));
        true
    }

    /// Checks the export version against the server's `major.minor`.
    pub fn check_version(&self, server: &ServerVersion) -> Result<()> {
        let expected = server.short();
        match self.format_version() {
            Some(v) if v == expected => Ok(()),
            other => Err(AssetError::VersionMismatch {
                name: self.name.clone(),
                version: other.unwrap_or("<none>").to_string(),
                expected,
            }),
        }
    }

    /// YAML document with the `zabbix_export` root, suitable for both the
    /// cache and `configuration.import`.
    pub fn to_yaml(&self) -> Result<String> {
        let mut root = Mapping::new();
        root.insert(key(EXPORT_KEY), Value::Mapping(self.export.clone()));
        serde_yaml::to_string(&root).map_err(|e| AssetError::Serialize {
            kind: AssetKind::Template,
            name: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// Inserts `new_key` right after `anchor`, or at the end when `anchor` is
/// missing. Mappings keep insertion order, so this rebuilds the mapping.
fn insert_after(map: &mut Mapping, anchor: &str, new_key: &str, value: Value) {
    let mut rebuilt = Mapping::with_capacity(map.len() + 1);
    let mut pending = Some(value);
    for (k, v) in std::mem::take(map) {
        let is_anchor = k.as_str() == Some(anchor);
        rebuilt.insert(k, v);
        if is_anchor {
            if let Some(value) = pending.take() {
                rebuilt.insert(key(new_key), value);
            }
        }
    }
    if let Some(value) = pending {
        rebuilt.insert(key(new_key), value);
    }
    *map = rebuilt;
}
