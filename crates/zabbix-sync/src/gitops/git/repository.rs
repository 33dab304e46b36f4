//! Git repository operations backing the cache.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::auth::{build_auth_env, AuthEnv};
use super::parse::{format_git_error, non_empty_lines, parse_left_right_counts, parse_porcelain_z};
use super::types::*;
use crate::gitops::error::{classify_git_error, GitOpsError, Result};
use crate::sanitize::redact_repo_url;

/// Git repository holding the cache snapshot.
pub struct GitRepository {
    /// Path to the git working tree.
    repo_path: PathBuf,
    pub(crate) settings: GitSettings,
}

impl GitRepository {
    /// Creates a handle for an existing working tree.
    pub fn new(repo_path: impl Into<PathBuf>, settings: GitSettings) -> Self {
        Self {
            repo_path: repo_path.into(),
            settings,
        }
    }

    /// Opens the cache repository, cloning the remote when it is missing.
    pub fn open_or_clone(repo_path: impl Into<PathBuf>, settings: GitSettings) -> Result<Self> {
        let repo = Self::new(repo_path, settings);

        if repo.is_git_repo() {
            repo.set_remote(&repo.settings.remote)?;
            return Ok(repo);
        }

        let parent = repo
            .repo_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        log::info!(
            "Cloning {} into {}",
            redact_repo_url(&repo.settings.remote),
            repo.repo_path.display()
        );

        let auth = repo.get_auth_env()?;
        let target = repo.repo_path.display().to_string();
        let mut cmd = Command::new("git");
        cmd.current_dir(&parent)
            .env("LC_ALL", "C")
            .args(["clone", &repo.settings.remote, &target]);
        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }
        let output = cmd.output().map_err(|source| GitOpsError::Spawn {
            path: parent.clone(),
            source,
        })?;
        drop(auth);

        if !output.status.success() {
            return Err(classify_git_error(&format_git_error(&output)));
        }

        Ok(repo)
    }

    /// Returns the repository path.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Checks if the directory is a git repository.
    pub fn is_git_repo(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    /// Initializes an empty repository.
    pub fn init(&self) -> Result<()> {
        if self.is_git_repo() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.repo_path)?;
        self.run_checked(&["init"])?;
        Ok(())
    }

    /// Points `origin` at the given URL.
    pub fn set_remote(&self, url: &str) -> Result<()> {
        let remote_exists = self
            .run_git(&["remote", "get-url", "origin"])
            .map(|output| output.status.success())
            .unwrap_or(false);

        if remote_exists {
            self.run_checked(&["remote", "set-url", "origin", url])?;
        } else {
            self.run_checked(&["remote", "add", "origin", url])?;
        }

        Ok(())
    }

    /// Checks if the repository has any commits.
    pub fn has_commits(&self) -> bool {
        self.run_git(&["rev-parse", "--verify", "--quiet", "HEAD"])
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// True for a freshly cloned empty remote.
    pub fn is_empty(&self) -> bool {
        !self.has_commits() && !self.has_remote_branches()
    }

    fn has_remote_branches(&self) -> bool {
        self.run_git(&["for-each-ref", "--count=1", "refs/remotes/origin"])
            .map(|output| output.status.success() && !output.stdout.is_empty())
            .unwrap_or(false)
    }

    /// Gets the current branch name, also for unborn branches.
    pub fn current_branch(&self) -> Result<String> {
        let stdout = self.run_checked(&["symbolic-ref", "--short", "HEAD"])?;
        Ok(stdout.trim().to_string())
    }

    /// Commit id `HEAD` points at.
    pub fn head_revision(&self) -> Result<String> {
        let stdout = self.run_checked(&["rev-parse", "HEAD"])?;
        Ok(stdout.trim().to_string())
    }

    pub fn local_branch_exists(&self, branch: &str) -> bool {
        self.ref_exists(&format!("refs/heads/{}", branch))
    }

    pub fn remote_branch_exists(&self, branch: &str) -> bool {
        self.ref_exists(&format!("refs/remotes/origin/{}", branch))
    }

    fn ref_exists(&self, reference: &str) -> bool {
        self.run_git(&["rev-parse", "--verify", "--quiet", reference])
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Fetches all branches from the remote, pruning deleted ones.
    pub fn fetch(&self) -> Result<()> {
        self.run_network(&["fetch", "--prune", "origin"])?;
        Ok(())
    }

    /// Switches to a branch, creating it from the current `HEAD` when it
    /// exists neither locally nor on the remote.
    pub fn switch_branch(&self, branch: &str) -> Result<()> {
        if !self.is_git_repo() {
            return Err(GitOpsError::GitNotInitialized(self.repo_path.clone()));
        }

        if self.local_branch_exists(branch) {
            self.run_checked(&["checkout", branch])?;
        } else if self.remote_branch_exists(branch) {
            let remote_ref = format!("origin/{}", branch);
            self.run_checked(&["checkout", "-B", branch, &remote_ref])?;
        } else if self.has_commits() {
            self.run_checked(&["checkout", "-b", branch])?;
        } else {
            let reference = format!("refs/heads/{}", branch);
            self.run_checked(&["symbolic-ref", "HEAD", &reference])?;
        }

        log::debug!("Switched to branch {}", branch);
        Ok(())
    }

    /// Creates a branch at the given revision without checking it out.
    pub fn create_branch_at(&self, name: &str, revision: &str) -> Result<()> {
        self.run_checked(&["branch", name, revision])?;
        Ok(())
    }

    /// Determines how the remote branch relates to the local `HEAD`.
    pub fn merge_analysis(&self, branch: &str) -> Result<MergeAnalysis> {
        if !self.remote_branch_exists(branch) {
            return Err(GitOpsError::RemoteBranchMissing(branch.to_string()));
        }
        if !self.has_commits() {
            return Ok(MergeAnalysis::Unborn);
        }

        let remote_ref = format!("origin/{}", branch);
        let range = format!("HEAD...{}", remote_ref);
        let stdout = self.run_checked(&["rev-list", "--left-right", "--count", &range])?;
        let (ahead, behind) = parse_left_right_counts(&stdout)
            .ok_or_else(|| GitOpsError::UnexpectedOutput(stdout.trim().to_string()))?;

        Ok(match (ahead, behind) {
            (_, 0) => MergeAnalysis::UpToDate,
            (0, _) => MergeAnalysis::FastForward,
            _ => MergeAnalysis::Normal,
        })
    }

    /// Merges `origin/<branch>` into the checked out branch.
    ///
    /// A conflicting three-way merge is aborted and reported with the
    /// conflicting paths; nothing is resolved automatically.
    pub fn pull(&self, branch: &str) -> Result<MergeOutcome> {
        let analysis = self.merge_analysis(branch)?;
        let remote_ref = format!("origin/{}", branch);

        match analysis {
            MergeAnalysis::UpToDate => {
                log::debug!("Branch {} is up to date", branch);
            }
            MergeAnalysis::Unborn => {
                self.run_checked(&["checkout", "-B", branch, &remote_ref])?;
            }
            MergeAnalysis::FastForward => {
                let output = self.run_git(&["merge", "--ff-only", &remote_ref])?;
                if !output.status.success() {
                    return Err(self.merge_failure(branch, &output));
                }
            }
            MergeAnalysis::Normal => {
                let message = format!("Merge {} into {}", remote_ref, branch);
                let output = self.run_git_env(
                    &["merge", "--no-edit", "-m", &message, &remote_ref],
                    &self.identity_env(),
                )?;
                if !output.status.success() {
                    let conflicts = self.conflicted_files()?;
                    if !conflicts.is_empty() {
                        self.merge_abort()?;
                        return Err(GitOpsError::GitMergeConflict(conflicts));
                    }
                    return Err(self.merge_failure(branch, &output));
                }
            }
        }

        Ok(MergeOutcome {
            analysis,
            head: self.head_revision()?,
        })
    }

    fn merge_failure(&self, branch: &str, output: &Output) -> GitOpsError {
        let message = format_git_error(output);
        if message.contains("would be overwritten") || message.contains("untracked working tree files") {
            GitOpsError::DirtyWorkingTree {
                branch: branch.to_string(),
                message,
            }
        } else {
            classify_git_error(&message)
        }
    }

    /// Paths left unmerged by a failed merge.
    pub fn conflicted_files(&self) -> Result<Vec<String>> {
        let stdout = self.run_checked(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(non_empty_lines(&stdout))
    }

    /// Aborts an in-progress merge.
    pub fn merge_abort(&self) -> Result<()> {
        let output = self.run_git(&["merge", "--abort"])?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no merge") || stderr.contains("MERGE_HEAD missing") {
                Ok(())
            } else {
                Err(GitOpsError::GitOperation(stderr.trim().to_string()))
            }
        }
    }

    /// Per-path working tree status, untracked files listed individually.
    pub fn status(&self) -> Result<WorkTreeStatus> {
        let output = self.run_git(&["status", "--porcelain=v1", "-z", "--untracked-files=all"])?;
        if !output.status.success() {
            return Err(classify_git_error(&format_git_error(&output)));
        }

        Ok(WorkTreeStatus {
            files: parse_porcelain_z(&output.stdout),
        })
    }

    /// Short diff summary of the working tree against the index.
    pub fn diff_stat(&self) -> Result<String> {
        self.run_checked(&["diff", "--stat"])
    }

    /// True when local commits are missing on the remote, including the
    /// first push of a branch without a remote tracking ref.
    pub fn is_ahead_of_remote(&self, branch: &str) -> Result<bool> {
        if !self.has_commits() {
            return Ok(false);
        }
        if !self.remote_branch_exists(branch) {
            return Ok(true);
        }

        let range = format!("origin/{}..HEAD", branch);
        let stdout = self.run_checked(&["rev-list", "--count", &range])?;
        let ahead: u32 = stdout
            .trim()
            .parse()
            .map_err(|_| GitOpsError::UnexpectedOutput(stdout.trim().to_string()))?;
        Ok(ahead > 0)
    }

    /// Stages every change in the working tree.
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "--all"])?;
        Ok(())
    }

    /// Commits the index and returns the new commit id, or `None` when
    /// nothing is staged.
    pub fn commit(&self, message: &str) -> Result<Option<String>> {
        let staged = self.run_git(&["diff", "--cached", "--quiet"])?;
        if staged.status.success() {
            return Ok(None);
        }

        let output = self.run_git_env(&["commit", "--allow-empty-message", "-m", message], &self.identity_env())?;
        if !output.status.success() {
            return Err(GitOpsError::GitOperation(format_git_error(&output)));
        }

        Ok(Some(self.head_revision()?))
    }

    /// Pushes a local branch to the same name on the remote.
    pub fn push(&self, branch: &str) -> Result<()> {
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        self.run_network(&["push", "origin", &refspec])?;
        Ok(())
    }

    /// Pushes a local branch, overwriting the remote one.
    pub fn force_push(&self, branch: &str) -> Result<()> {
        let refspec = format!("+refs/heads/{0}:refs/heads/{0}", branch);
        self.run_network(&["push", "origin", &refspec])?;
        Ok(())
    }

    /// Resets `HEAD` to a revision.
    pub fn reset(&self, revision: &str, mode: ResetMode) -> Result<()> {
        self.run_checked(&["reset", "--quiet", mode.as_flag(), revision])?;
        Ok(())
    }

    /// Removes untracked files and directories.
    pub fn clean(&self) -> Result<()> {
        self.run_checked(&["clean", "-fd"])?;
        Ok(())
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    /// Runs a git command in the repository directory.
    fn run_git(&self, args: &[&str]) -> Result<Output> {
        self.run_git_env(args, &[])
    }

    fn run_git_env(&self, args: &[&str], env: &[(String, String)]) -> Result<Output> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_path).env("LC_ALL", "C").args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }

        cmd.output().map_err(|source| GitOpsError::Spawn {
            path: self.repo_path.clone(),
            source,
        })
    }

    /// Runs a git command and returns its stdout, failing on non-zero exit.
    fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run_git(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    /// Runs a git command that talks to the remote.
    fn run_network(&self, args: &[&str]) -> Result<String> {
        let auth = self.get_auth_env()?;
        let output = self.run_git_env(args, &auth.env_vars)?;
        drop(auth);

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    fn identity_env(&self) -> Vec<(String, String)> {
        let name = &self.settings.author_name;
        let email = &self.settings.author_email;
        vec![
            ("GIT_AUTHOR_NAME".to_string(), name.clone()),
            ("GIT_AUTHOR_EMAIL".to_string(), email.clone()),
            ("GIT_COMMITTER_NAME".to_string(), name.clone()),
            ("GIT_COMMITTER_EMAIL".to_string(), email.clone()),
        ]
    }

    fn get_auth_env(&self) -> Result<AuthEnv> {
        build_auth_env(&self.settings.auth)
    }
}
