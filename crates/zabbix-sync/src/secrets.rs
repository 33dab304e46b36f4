//! Secret resolution for Zabbix and git credentials.
//!
//! A secret can be configured directly (`zabbix_token: ...`) or through a
//! file reference (`zabbix_token_file: /run/secrets/zabbix_token`). The
//! direct value wins when both are set.

use secrecy::SecretString;
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need a direct value or a file path)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{path}' is empty")]
    EmptyFile { path: String },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from a direct value, falling back to a file.
///
/// File contents are trimmed, so a trailing newline in a Docker secret does
/// not end up in the password.
pub fn resolve_secret(direct: Option<&str>, file_path: Option<&str>) -> Result<SecretString> {
    if let Some(value) = direct {
        if !value.is_empty() {
            return Ok(SecretString::from(value.to_string()));
        }
    }

    if let Some(path) = file_path {
        if !path.is_empty() {
            let expanded = expand_home(path);
            let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
                path: expanded.clone(),
                source: e,
            })?;
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(SecretError::EmptyFile { path: expanded });
            }
            return Ok(SecretString::from(trimmed.to_string()));
        }
    }

    Err(SecretError::NoSourceProvided)
}

/// Resolves a secret, returning None if no source is provided instead of an error.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expands `~` and `~/path` to the user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_direct_value_wins() {
        let secret = resolve_secret(Some("direct"), Some("/nonexistent")).unwrap();
        assert_eq!(secret.expose_secret(), "direct");
    }

    #[test]
    fn test_file_value_is_trimmed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  from-file  ").unwrap();
        let path = file.path().to_str().unwrap();

        let secret = resolve_secret(None, Some(path)).unwrap();
        assert_eq!(secret.expose_secret(), "from-file");
    }

    #[test]
    fn test_empty_direct_falls_through_to_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "token").unwrap();
        let path = file.path().to_str().unwrap();

        let secret = resolve_secret(Some(""), Some(path)).unwrap();
        assert_eq!(secret.expose_secret(), "token");
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        let err = resolve_secret(None, Some(path)).unwrap_err();
        assert!(matches!(err, SecretError::EmptyFile { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = resolve_secret(None, Some("/nonexistent/secret")).unwrap_err();
        assert!(matches!(err, SecretError::FileReadError { .. }));
    }

    #[test]
    fn test_optional_without_sources() {
        assert!(resolve_secret_optional(None, None).unwrap().is_none());
        assert!(resolve_secret_optional(Some(""), Some("")).unwrap().is_none());
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            assert_eq!(expand_home("~/secret"), format!("{}/secret", home));
            assert_eq!(expand_home("~"), home);
        }
        assert_eq!(expand_home("/abs/path"), "/abs/path");
    }
}
