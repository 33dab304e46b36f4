//! Snapshot store types.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Serialize;

/// Git settings for the cache repository.
#[derive(Debug)]
pub struct GitSettings {
    /// Remote URL cloned into the cache.
    pub remote: String,
    /// Author and committer name for generated commits.
    pub author_name: String,
    /// Author and committer email for generated commits.
    pub author_email: String,
    pub auth: GitAuthSettings,
}

/// Credentials and TLS options for talking to the remote.
#[derive(Debug, Default)]
pub struct GitAuthSettings {
    pub username: String,
    /// Password or access token answered through `GIT_ASKPASS`.
    pub password: Option<SecretString>,
    /// SSH private key passed through `GIT_SSH_COMMAND`.
    pub private_key: Option<String>,
    pub insecure_ssl_verify: bool,
    pub ca_bundle: Option<PathBuf>,
}

/// Status of a single path in the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    /// Path relative to the repository root, using `/` separators.
    pub path: String,
    /// Index column of the porcelain status.
    pub index: char,
    /// Working tree column of the porcelain status.
    pub worktree: char,
}

impl FileStatus {
    /// Untracked path, present only in the working tree.
    pub fn is_new(&self) -> bool {
        self.index == '?' && self.worktree == '?'
    }

    /// Tracked path whose working tree content differs from the index.
    pub fn is_modified(&self) -> bool {
        matches!(self.worktree, 'M' | 'T')
    }

    /// Tracked path missing from the working tree.
    pub fn is_deleted(&self) -> bool {
        self.worktree == 'D'
    }

    /// Path with staged changes.
    pub fn is_staged(&self) -> bool {
        !matches!(self.index, ' ' | '?' | '!')
    }
}

/// Working tree status of the cache repository.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkTreeStatus {
    pub files: Vec<FileStatus>,
}

impl WorkTreeStatus {
    pub fn is_clean(&self) -> bool {
        self.files.is_empty()
    }
}

/// Relationship between a local branch and its remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeAnalysis {
    /// Local branch already contains the remote tip.
    UpToDate,
    /// Local branch is an ancestor of the remote tip.
    FastForward,
    /// Both sides have diverged, a three-way merge is needed.
    Normal,
    /// Local branch has no commits yet.
    Unborn,
}

/// Result of merging the remote branch into the local one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub analysis: MergeAnalysis,
    /// Commit the local branch points at after the merge.
    pub head: String,
}

/// How far `reset` rewinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Reset index and working tree.
    Hard,
    /// Reset the index only.
    Mixed,
}

impl ResetMode {
    pub(crate) fn as_flag(self) -> &'static str {
        match self {
            ResetMode::Hard => "--hard",
            ResetMode::Mixed => "--mixed",
        }
    }
}
