//! Push and pull between Zabbix and the git cache.
//!
//! Push exports the live state and commits it. Pull uses git itself as the
//! diff: the desired revision is checked out, the live state is exported
//! over it, and the working tree status tells which objects differ.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{info_span, Instrument};

use crate::assets::ImageType;
use crate::cache::CacheRoot;
use crate::config::Settings;
use crate::error::Result;
use crate::gitops::{GitAuthSettings, GitRepository, GitSettings, ResetMode, WorkTreeStatus};
use crate::handlers::{AssetHandler, HandlerRegistry, LiveInventory, SyncContext};
use crate::imaging;
use crate::sanitize::host_from_url;
use crate::secrets::resolve_secret_optional;
use crate::zabbix::ZabbixApi;

/// Prefix of branches holding the desired state of a pull.
pub const ROLLBACK_BRANCH_PREFIX: &str = "rollback/";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Paths that differed from the last commit.
    pub changed_files: Vec<String>,
    pub commit: Option<String>,
    pub pushed: bool,
}

impl PushReport {
    pub fn is_noop(&self) -> bool {
        self.changed_files.is_empty() && !self.pushed
    }
}

/// Paths of a pull classified by what they mean for the live system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Desired content that is missing or different in Zabbix.
    pub to_import: BTreeSet<String>,
    /// Live objects with no desired counterpart.
    pub to_delete: BTreeSet<String>,
}

impl ChangeSet {
    /// Classifies the status taken after exporting the live state over the
    /// desired revision.
    pub fn from_status(status: &WorkTreeStatus) -> Self {
        let mut changes = Self::default();
        for file in &status.files {
            if file.is_new() {
                changes.to_delete.insert(file.path.clone());
            } else if file.is_modified() || file.is_deleted() {
                changes.to_import.insert(file.path.clone());
            } else {
                log::warn!(
                    "Ignoring unexpected status '{}{}' of {}",
                    file.index,
                    file.worktree,
                    file.path
                );
            }
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.to_import.is_empty() && self.to_delete.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub desired_revision: String,
    pub rollback_branch: Option<String>,
    pub changes: ChangeSet,
    pub imported: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

impl PullReport {
    pub fn changed(&self) -> bool {
        !self.imported.is_empty() || !self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateReport {
    pub created: Vec<String>,
    pub commit: Option<String>,
}

/// Git settings for the cache repository, with secrets resolved.
pub fn git_settings(settings: &Settings) -> Result<GitSettings> {
    let password = resolve_secret_optional(
        settings.git_password.as_deref(),
        settings.git_password_file.as_deref(),
    )?;
    Ok(GitSettings {
        remote: settings.require_remote()?.to_string(),
        author_name: settings.git_author_name.clone(),
        author_email: settings.git_author_email.clone(),
        auth: GitAuthSettings {
            username: settings.git_username.clone(),
            password,
            private_key: settings.git_privkey.clone(),
            insecure_ssl_verify: settings.insecure_ssl_verify,
            ca_bundle: settings.ca_bundle.clone(),
        },
    })
}

/// Commit message of a push.
pub fn commit_message(settings: &Settings) -> String {
    if let Some(message) = settings.git_commit_message.as_deref().filter(|m| !m.is_empty()) {
        return message.to_string();
    }
    let host = std::env::var("ZABBIX_HOST")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| host_from_url(&settings.zabbix_url));
    format!("Committed Zabbix state from {}", host)
}

pub struct Reconciler<'a> {
    settings: &'a Settings,
    zabbix: &'a dyn ZabbixApi,
    repo: GitRepository,
    cache: CacheRoot,
    handlers: HandlerRegistry,
}

impl<'a> Reconciler<'a> {
    /// Validates the settings and opens the cache repository, cloning it on
    /// first use.
    pub fn new(settings: &'a Settings, zabbix: &'a dyn ZabbixApi) -> Result<Self> {
        settings.validate()?;
        let handlers = HandlerRegistry::new(settings)?;
        let repo = GitRepository::open_or_clone(&settings.cache_path, git_settings(settings)?)?;
        let cache = CacheRoot::new(&settings.cache_path)?;

        Ok(Self {
            settings,
            zabbix,
            repo,
            cache,
            handlers,
        })
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    fn context(&self) -> SyncContext<'_> {
        SyncContext {
            settings: self.settings,
            zabbix: self.zabbix,
            cache: &self.cache,
        }
    }

    /// Removes the cache files of every enabled kind. Files the filters
    /// exclude stay untouched.
    fn clear_owned_files(&self, ctx: &SyncContext<'_>) -> Result<usize> {
        let mut removed = 0;
        for handler in self.handlers.enabled(self.settings) {
            let prefix = ctx.prefix(handler.kind());
            removed += self
                .cache
                .remove_matching(prefix, |path| handler.owns_cache_file(ctx, path))?;
        }
        log::debug!("Removed {} cache file(s) ahead of export", removed);
        Ok(removed)
    }

    async fn export_all(&self, ctx: &SyncContext<'_>) -> Result<LiveInventory> {
        let mut inventory = LiveInventory::default();
        for handler in self.handlers.enabled(self.settings) {
            let kind = handler.kind();
            let written = handler
                .export_to_cache(ctx, &mut inventory)
                .instrument(info_span!("export", kind = %kind))
                .await?;
            log::info!("Exported {} {}(s) to cache", written, kind);
        }
        Ok(inventory)
    }

    /// Puts the push branch on top of the remote state, bootstrapping it
    /// from the pull branch on the first push.
    fn prepare_push_branch(&self) -> Result<()> {
        let push = self.settings.push_branch.as_str();
        let pull = self.settings.pull_branch.as_str();

        if self.repo.is_empty() {
            self.repo.switch_branch(push)?;
            return Ok(());
        }

        if self.repo.remote_branch_exists(push) {
            self.repo.switch_branch(push)?;
            self.repo.pull(push)?;
        } else {
            log::info!("Remote branch {} does not exist, creating it from {}", push, pull);
            self.repo.switch_branch(pull)?;
            if self.repo.remote_branch_exists(pull) {
                self.repo.pull(pull)?;
            }
            self.repo.switch_branch(push)?;
        }
        Ok(())
    }

    /// Exports the live state and commits it to the push branch.
    pub async fn push(&self) -> Result<PushReport> {
        let span = info_span!("push", branch = %self.settings.push_branch);
        self.push_inner().instrument(span).await
    }

    async fn push_inner(&self) -> Result<PushReport> {
        let ctx = self.context();
        let push = self.settings.push_branch.as_str();

        self.repo.fetch()?;
        self.prepare_push_branch()?;

        self.clear_owned_files(&ctx)?;
        let inventory = self.export_all(&ctx).await?;

        let status = self.repo.status()?;
        let ahead = self.repo.is_ahead_of_remote(push)?;
        if status.is_clean() && !ahead {
            log::info!("Zabbix matches branch {}, nothing to push", push);
            return Ok(PushReport::default());
        }

        let changed: Vec<String> = status.files.iter().map(|f| f.path.clone()).collect();
        for file in &status.files {
            log::info!("Changed: {} ({}{})", file.path, file.index, file.worktree);
        }

        let stamp_candidates: Vec<String> = status
            .files
            .iter()
            .filter(|f| f.is_new() || f.is_modified())
            .map(|f| f.path.clone())
            .collect();
        for handler in self.handlers.enabled(self.settings) {
            handler
                .prepare_commit(&ctx, &stamp_candidates, &inventory)
                .await?;
        }

        if self.settings.dry_run {
            log::info!("Dry run: {} change(s) not committed", changed.len());
            discard_changes(&self.repo)?;
            return Ok(PushReport {
                changed_files: changed,
                commit: None,
                pushed: false,
            });
        }

        self.repo.add_all()?;
        let commit = self.repo.commit(&commit_message(self.settings))?;
        if let Some(id) = &commit {
            log::info!("Committed {} change(s) as {}", changed.len(), id);
        }

        self.repo.push(push)?;
        log::info!("Pushed branch {}", push);

        Ok(PushReport {
            changed_files: changed,
            commit,
            pushed: true,
        })
    }

    /// Snapshots the desired revision on a timestamped branch.
    fn create_rollback_branch(&self, revision: &str) -> Result<String> {
        let base = format!(
            "{}{}",
            ROLLBACK_BRANCH_PREFIX,
            Utc::now().format("%Y%m%d-%H%M%S")
        );
        let mut name = base.clone();
        let mut suffix = 1;
        while self.repo.local_branch_exists(&name) {
            suffix += 1;
            name = format!("{}-{}", base, suffix);
        }

        self.repo.create_branch_at(&name, revision)?;
        log::info!("Created rollback branch {}", name);
        if self.settings.push_rollback_branch {
            self.repo.force_push(&name)?;
            log::info!("Pushed rollback branch {}", name);
        }
        Ok(name)
    }

    /// Applies the pull branch to Zabbix.
    pub async fn pull(&self) -> Result<PullReport> {
        let span = info_span!("pull", branch = %self.settings.pull_branch);
        self.pull_inner().instrument(span).await
    }

    async fn pull_inner(&self) -> Result<PullReport> {
        let ctx = self.context();
        let branch = self.settings.pull_branch.as_str();

        self.repo.fetch()?;
        self.repo.switch_branch(branch)?;
        let desired = self.repo.pull(branch)?.head;
        self.repo.reset(&desired, ResetMode::Hard)?;
        log::info!("Desired state is {} of {}", desired, branch);

        let rollback_branch = if self.settings.create_rollback_branch && !self.settings.dry_run {
            Some(self.create_rollback_branch(&desired)?)
        } else {
            None
        };

        self.clear_owned_files(&ctx)?;
        let mut inventory = self.export_all(&ctx).await?;

        let changes = ChangeSet::from_status(&self.repo.status()?);
        self.repo.reset(&desired, ResetMode::Hard)?;

        let mut report = PullReport {
            desired_revision: desired,
            rollback_branch,
            ..Default::default()
        };
        if changes.is_empty() {
            log::info!("Zabbix matches {}, nothing to apply", branch);
            report.changes = changes;
            return Ok(report);
        }

        // changed paths come from git, but still have to stay inside the cache
        for path in changes.to_import.iter().chain(&changes.to_delete) {
            self.cache.resolve(path)?;
        }
        let to_import: Vec<String> = changes.to_import.iter().cloned().collect();
        let to_delete: Vec<String> = changes.to_delete.iter().cloned().collect();
        log::info!(
            "{} path(s) to import, {} path(s) to delete",
            to_import.len(),
            to_delete.len()
        );

        // imports in registry order, deletes in reverse: icon maps before icons
        let handlers: Vec<&dyn AssetHandler> = self.handlers.enabled(self.settings).collect();
        let mut outcomes = Vec::with_capacity(handlers.len());
        for handler in &handlers {
            let span = info_span!("import", kind = %handler.kind());
            let imported = handler
                .import_file_changes(&ctx, &to_import, &mut inventory)
                .instrument(span)
                .await?;
            report.imported.extend(imported.imported.iter().cloned());
            report.failed.extend(imported.failed.iter().cloned());
            outcomes.push(imported);
        }
        for (handler, imported) in handlers.iter().zip(&outcomes).rev() {
            let span = info_span!("delete", kind = %handler.kind());
            let deleted = handler
                .delete_file_changes(&ctx, &to_delete, imported, &inventory)
                .instrument(span)
                .await?;
            report.deleted.extend(deleted);
        }

        self.repo.clean()?;
        report.changes = changes;

        log::info!(
            "Pull finished: {} imported, {} deleted, {} failed",
            report.imported.len(),
            report.deleted.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// Leaves the working tree as committed.
fn discard_changes(repo: &GitRepository) -> Result<()> {
    if repo.has_commits() {
        repo.reset("HEAD", ResetMode::Hard)?;
    }
    repo.clean()?;
    Ok(())
}

/// Renders sized images from sources on the pull branch and commits them.
///
/// Needs the cache repository only, Zabbix is not contacted.
pub fn generate(settings: &Settings, image_type: ImageType) -> Result<GenerateReport> {
    let _span = info_span!("generate", kind = image_type.dir_name()).entered();
    settings.validate()?;
    let repo = GitRepository::open_or_clone(&settings.cache_path, git_settings(settings)?)?;
    let cache = CacheRoot::new(&settings.cache_path)?;
    let branch = settings.pull_branch.as_str();

    repo.fetch()?;
    repo.switch_branch(branch)?;
    if repo.remote_branch_exists(branch) {
        repo.pull(branch)?;
    }

    let created = imaging::generate_images(&cache, settings, image_type)?;
    if created.is_empty() || settings.dry_run {
        if settings.dry_run {
            log::info!("Dry run: {} generated image(s) not committed", created.len());
            discard_changes(&repo)?;
        }
        return Ok(GenerateReport {
            created,
            commit: None,
        });
    }

    repo.add_all()?;
    let message = format!("Generated {} {}", created.len(), image_type.dir_name());
    let commit = repo.commit(&message)?;
    if commit.is_some() {
        repo.push(branch)?;
        log::info!("Pushed {} generated image(s) to {}", created.len(), branch);
    }
    Ok(GenerateReport { created, commit })
}
