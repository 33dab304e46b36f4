//! Snapshot store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the git-backed snapshot store.
#[derive(Error, Debug)]
pub enum GitOpsError {
    #[error("Failed to run git in '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git network error: {0}")]
    GitNetworkError(String),

    #[error("Git merge conflict in: {}", .0.join(", "))]
    GitMergeConflict(Vec<String>),

    #[error("Local changes block merging '{branch}': {message}")]
    DirtyWorkingTree { branch: String, message: String },

    #[error("Git repository not initialized at '{0}'")]
    GitNotInitialized(PathBuf),

    #[error("Git authentication failed: {0}")]
    GitAuthFailed(String),

    #[error("Remote branch 'origin/{0}' does not exist")]
    RemoteBranchMissing(String),

    #[error("Unexpected git output: {0}")]
    UnexpectedOutput(String),
}

impl From<std::io::Error> for GitOpsError {
    fn from(err: std::io::Error) -> Self {
        GitOpsError::GitOperation(err.to_string())
    }
}

impl GitOpsError {
    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitOpsError::GitNetworkError(_))
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> GitOpsError {
    let lower = stderr.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return GitOpsError::GitNetworkError(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("could not read username")
    {
        return GitOpsError::GitAuthFailed(stderr.trim().to_string());
    }

    GitOpsError::GitOperation(stderr.trim().to_string())
}

/// Result type for snapshot store operations.
pub type Result<T> = std::result::Result<T, GitOpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_network_error() {
        let err = classify_git_error("fatal: unable to access 'https://git.example/': Could not resolve host");
        assert!(matches!(err, GitOpsError::GitNetworkError(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth_error() {
        let err = classify_git_error("remote: HTTP Basic: Access denied\nfatal: Authentication failed for 'x'");
        assert!(matches!(err, GitOpsError::GitAuthFailed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_generic_error() {
        let err = classify_git_error("  fatal: bad revision 'nope'\n");
        match err {
            GitOpsError::GitOperation(msg) => assert_eq!(msg, "fatal: bad revision 'nope'"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_merge_conflict_message_lists_files() {
        let err = GitOpsError::GitMergeConflict(vec!["a.yaml".into(), "b.yaml".into()]);
        assert_eq!(err.to_string(), "Git merge conflict in: a.yaml, b.yaml");
    }
}
