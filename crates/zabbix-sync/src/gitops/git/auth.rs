//! Git authentication handling.

use std::path::PathBuf;

use super::types::GitAuthSettings;
use crate::gitops::error::{GitOpsError, Result};

/// Escapes a value for safe use in single-quoted shell strings.
/// Replaces single quotes with '\'' (end quote, escaped quote, start quote).
pub fn shell_escape(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// RAII guard for askpass script cleanup.
///
/// Deletes the askpass script when dropped so credentials are not left on
/// disk, even when the git command fails.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub(crate) fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Authentication environment for git commands.
#[derive(Debug)]
pub struct AuthEnv {
    /// Environment variables to set for the git command.
    pub env_vars: Vec<(String, String)>,
    /// Must outlive the git command to keep the askpass script alive.
    pub _cleanup: AskpassCleanup,
}

/// Expands a leading `~` to the home directory.
fn expand_key_path(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_default()
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[cfg(unix)]
fn write_askpass_script(username: &str, password: &str) -> Result<PathBuf> {
    use std::os::unix::fs::OpenOptionsExt;

    let path = std::env::temp_dir().join(format!(".git-askpass-{}.sh", uuid::Uuid::new_v4()));
    let script = format!(
        r#"#!/bin/sh
case "$1" in
    Username*) echo '{}' ;;
    *) echo '{}' ;;
esac
"#,
        shell_escape(username),
        shell_escape(password)
    );

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o700)
        .open(&path)?;
    std::io::Write::write_all(&mut file, script.as_bytes())?;

    Ok(path)
}

#[cfg(not(unix))]
fn write_askpass_script(_username: &str, _password: &str) -> Result<PathBuf> {
    Err(GitOpsError::GitAuthFailed(
        "Password authentication requires a unix askpass helper".to_string(),
    ))
}

/// Builds the auth environment for network git commands.
///
/// Passwords are answered through a temporary `GIT_ASKPASS` script, SSH
/// keys through `GIT_SSH_COMMAND`. TLS options map onto git's own
/// `GIT_SSL_*` variables.
pub fn build_auth_env(auth: &GitAuthSettings) -> Result<AuthEnv> {
    use secrecy::ExposeSecret;

    let mut env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];
    let mut cleanup = AskpassCleanup::empty();

    if auth.insecure_ssl_verify {
        env.push(("GIT_SSL_NO_VERIFY".to_string(), "true".to_string()));
    }
    if let Some(ca_bundle) = &auth.ca_bundle {
        env.push(("GIT_SSL_CAINFO".to_string(), ca_bundle.display().to_string()));
    }

    if let Some(password) = &auth.password {
        let askpass_path = write_askpass_script(&auth.username, password.expose_secret())?;
        cleanup = AskpassCleanup::new(askpass_path.clone());

        let askpass_path_str = askpass_path
            .to_str()
            .ok_or_else(|| {
                GitOpsError::GitAuthFailed(
                    "Temp directory path contains non-UTF8 characters".to_string(),
                )
            })?
            .to_string();
        env.push(("GIT_ASKPASS".to_string(), askpass_path_str));
    }

    if let Some(key) = auth.private_key.as_deref().filter(|k| !k.is_empty()) {
        let key_path = expand_key_path(key);
        if !key_path.exists() {
            return Err(GitOpsError::GitAuthFailed(format!(
                "SSH key file not found: {}",
                key_path.display()
            )));
        }

        let safe_path = {
            let escaped = shell_escape(&key_path.display().to_string());
            if escaped.starts_with('-') {
                format!("'./{}'", escaped)
            } else {
                format!("'{}'", escaped)
            }
        };

        env.push((
            "GIT_SSH_COMMAND".to_string(),
            format!("ssh -i {} -o StrictHostKeyChecking=accept-new", safe_path),
        ));
    }

    Ok(AuthEnv {
        env_vars: env,
        _cleanup: cleanup,
    })
}
