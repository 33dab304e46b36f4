use std::path::Path;

use serde_yaml::Value;

use crate::config::settings::{RawValue, Settings};
use crate::error::ConfigError;

/// Applies environment variables named after settings keys in uppercase.
///
/// Variables that do not name a setting are ignored.
pub fn apply_env<I, K, V>(settings: &mut Settings, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    for (name, value) in vars {
        let name = name.as_ref();
        if name.chars().any(|c| c.is_ascii_lowercase()) {
            continue;
        }
        let key = name.to_ascii_lowercase();
        if Settings::KEYS.contains(&key.as_str()) {
            settings.set(&key, RawValue::Scalar(value.into()))?;
        }
    }
    Ok(())
}

/// Applies a YAML config file of `key: value` pairs.
pub fn apply_config_file<P: AsRef<Path>>(settings: &mut Settings, path: P) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_config_str(settings, &content).map_err(|e| match e {
        ConfigError::ParseYaml { message, .. } => ConfigError::ParseYaml {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

/// Applies config file content. An empty document changes nothing.
pub fn apply_config_str(settings: &mut Settings, content: &str) -> Result<(), ConfigError> {
    let document: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
        path: Default::default(),
        message: e.to_string(),
    })?;

    let mapping = match document {
        Value::Null => return Ok(()),
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(ConfigError::ParseYaml {
                path: Default::default(),
                message: "expected a mapping of setting keys".to_string(),
            })
        }
    };

    for (key, value) in mapping {
        let key = key.as_str().ok_or_else(|| ConfigError::ParseYaml {
            path: Default::default(),
            message: format!("setting keys must be strings, got {:?}", key),
        })?;
        settings.set(key, yaml_to_raw(key, value)?)?;
    }

    Ok(())
}

fn yaml_to_raw(key: &str, value: Value) -> Result<RawValue, ConfigError> {
    match value {
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| scalar_to_string(key, item))
            .collect::<Result<Vec<_>, _>>()
            .map(RawValue::List),
        other => scalar_to_string(key, other).map(RawValue::Scalar),
    }
}

fn scalar_to_string(key: &str, value: Value) -> Result<String, ConfigError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "nested values are not supported".to_string(),
        }),
    }
}

/// Builds settings from defaults, the process environment and an optional
/// config file. Command line overrides are applied by the caller afterwards.
pub fn load_settings(config_file: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();
    apply_env(&mut settings, std::env::vars())?;
    if let Some(path) = config_file {
        apply_config_file(&mut settings, path)?;
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_apply_env_known_uppercase_keys() {
        let mut settings = Settings::default();
        apply_env(
            &mut settings,
            vec![
                ("ZABBIX_URL", "https://zabbix.example"),
                ("TEMPLATE_BLACKLIST", "A,B"),
                ("PATH", "/usr/bin"),
                ("dry_run", "true"),
            ],
        )
        .unwrap();

        assert_eq!(settings.zabbix_url, "https://zabbix.example");
        assert_eq!(settings.template_blacklist, vec!["A", "B"]);
        assert!(!settings.dry_run);
    }

    #[test]
    fn test_apply_env_invalid_value() {
        let mut settings = Settings::default();
        let err = apply_env(&mut settings, vec![("BATCH_SIZE", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_apply_config_str() {
        let mut settings = Settings::default();
        apply_config_str(
            &mut settings,
            r#"
zabbix_url: https://zabbix.example
batch_size: 5
sync_icons: true
template_whitelist:
  - Linux by Zabbix agent
  - Nginx by HTTP
icon_sizes: [16, 32]
vendor: ~
"#,
        )
        .unwrap();

        assert_eq!(settings.zabbix_url, "https://zabbix.example");
        assert_eq!(settings.batch_size, 5);
        assert!(settings.sync_icons);
        assert_eq!(settings.template_whitelist.len(), 2);
        assert_eq!(settings.icon_sizes, vec![16, 32]);
        assert!(settings.vendor.is_none());
    }

    #[test]
    fn test_apply_config_unknown_key() {
        let mut settings = Settings::default();
        let err = apply_config_str(&mut settings, "not_a_setting: 1").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(k) if k == "not_a_setting"));
    }

    #[test]
    fn test_apply_config_empty_and_invalid() {
        let mut settings = Settings::default();
        assert!(apply_config_str(&mut settings, "").is_ok());
        assert!(apply_config_str(&mut settings, "- a\n- b").is_err());
        assert!(apply_config_str(&mut settings, "remote: {nested: true}").is_err());
    }

    #[test]
    fn test_apply_config_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "remote: [unclosed").unwrap();

        let mut settings = Settings::default();
        match apply_config_file(&mut settings, &path).unwrap_err() {
            ConfigError::ParseYaml { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    #[serial]
    fn test_config_file_overrides_environment() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "pull_branch: from-file\n").unwrap();

        std::env::set_var("PULL_BRANCH", "from-env");
        std::env::set_var("PUSH_BRANCH", "env-only");
        let settings = load_settings(Some(&path));
        std::env::remove_var("PULL_BRANCH");
        std::env::remove_var("PUSH_BRANCH");

        let settings = settings.unwrap();
        assert_eq!(settings.pull_branch, "from-file");
        assert_eq!(settings.push_branch, "env-only");
    }
}
