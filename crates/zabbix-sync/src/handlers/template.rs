use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;

use super::{
    delete_queued, import_with_retry, is_cache_file, paths_in, read_cache_text, AssetHandler,
    ImportOutcome, ImportStep, LiveInventory, SyncContext, TemplateRecord,
};
use crate::assets::{AssetKind, Template};
use crate::config::Settings;
use crate::error::{Result, SyncError};
use crate::filter::Filter;
use crate::ordering::sort_by_dependency;
use crate::zabbix::TemplateSummary;

/// Passes over an export batch: the first attempt plus one retry of the
/// failed subset.
pub const EXPORT_ROUNDS: usize = 2;

/// Format of stamped `vendor.version` values.
pub const VERSION_FORMAT: &str = "%Y.%m.%d %H:%M";

pub struct TemplateHandler {
    filter: Filter,
}

impl TemplateHandler {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            filter: Filter::for_kind(settings, AssetKind::Template)?,
        })
    }

    fn parse_admitted(&self, text: &str, path: &str) -> Option<Template> {
        match Template::parse(text, path) {
            Ok(t) if self.filter.admits(t.name()) => Some(t),
            Ok(t) => {
                log::debug!("Template '{}' is filtered out", t.name());
                None
            }
            Err(e) => {
                log::warn!("Skipping {}: {}", path, e);
                None
            }
        }
    }

    /// Exports one batch concurrently. A failure does not cancel the other
    /// calls; the failed subset is retried as a smaller batch.
    async fn export_batch<'s>(
        &self,
        ctx: &SyncContext<'_>,
        batch: &'s [TemplateSummary],
    ) -> Result<Vec<(&'s TemplateSummary, Template)>> {
        let mut pending: Vec<&TemplateSummary> = batch.iter().collect();
        let mut exported = Vec::with_capacity(batch.len());
        let mut last_error = None;

        for round in 1..=EXPORT_ROUNDS {
            if pending.is_empty() {
                break;
            }
            if round > 1 {
                log::info!("Retrying export of {} template(s)", pending.len());
            }

            let results = join_all(
                pending
                    .iter()
                    .map(|summary| async move { (*summary, export_one(ctx, summary).await) }),
            )
            .await;

            let mut failed = Vec::new();
            for (summary, result) in results {
                match result {
                    Ok(template) => exported.push((summary, template)),
                    Err(e) => {
                        log::warn!("Failed to export template '{}': {}", summary.host, e);
                        last_error = Some(e);
                        failed.push(summary);
                    }
                }
            }
            pending = failed;
        }

        match last_error {
            // a missing export would be read as a deletion
            Some(e) if !pending.is_empty() => Err(e),
            _ => Ok(exported),
        }
    }
}

async fn export_one(ctx: &SyncContext<'_>, summary: &TemplateSummary) -> Result<Template> {
    let source = ctx
        .zabbix
        .export_templates(std::slice::from_ref(&summary.templateid))
        .await?;
    Ok(Template::parse(&source, &summary.host)?)
}

#[async_trait]
impl AssetHandler for TemplateHandler {
    fn kind(&self) -> AssetKind {
        AssetKind::Template
    }

    fn owns_cache_file(&self, ctx: &SyncContext<'_>, path: &str) -> bool {
        if !is_cache_file(path, ctx.prefix(AssetKind::Template), ".yaml") {
            return false;
        }
        match ctx.cache.read_to_string(path) {
            Ok(text) => Template::parse(&text, path)
                .map(|t| self.filter.admits(t.name()))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn export_to_cache(
        &self,
        ctx: &SyncContext<'_>,
        inventory: &mut LiveInventory,
    ) -> Result<usize> {
        let settings = ctx.settings;
        let root = settings.root_template_group.as_str();

        let groups = ctx.zabbix.get_template_groups(root).await?;
        if groups.is_empty() {
            log::warn!("Template group '{}' does not exist, no templates exported", root);
            return Ok(0);
        }
        let group_ids: Vec<String> = groups.into_iter().map(|g| g.groupid).collect();

        let found = ctx
            .zabbix
            .get_templates(&group_ids, self.filter.server_side_names())
            .await?;
        let total = found.len();
        let selected: Vec<TemplateSummary> = found
            .into_iter()
            .filter(|t| self.filter.admits(&t.host))
            .collect();
        log::info!(
            "Found {} template(s) in Zabbix, exporting {}",
            total,
            selected.len()
        );

        let prefix = ctx.prefix(AssetKind::Template);
        let mut written = 0;
        for batch in selected.chunks(settings.batch_size.max(1)) {
            for (summary, template) in self.export_batch(ctx, batch).await? {
                let path = template.cache_path(prefix, root);
                ctx.cache.write(&path, template.to_yaml()?)?;
                log::debug!("Exported template '{}' to {}", template.name(), path);

                inventory.templates.push(TemplateRecord {
                    id: summary.templateid.clone(),
                    name: template.name().to_string(),
                    uuid: template.uuid().to_string(),
                });
                written += 1;
            }
        }
        Ok(written)
    }

    async fn import_file_changes(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        inventory: &mut LiveInventory,
    ) -> Result<ImportOutcome> {
        let server = ctx.zabbix.server_version();
        let mut templates = Vec::new();

        for path in paths_in(paths, ctx.prefix(AssetKind::Template), ".yaml") {
            let Some(text) = read_cache_text(ctx.cache, path)? else {
                continue;
            };
            let Some(template) = self.parse_admitted(&text, path) else {
                continue;
            };
            if !ctx.settings.ignore_template_version {
                if let Err(e) = template.check_version(&server) {
                    log::warn!("Skipping {}: {}", path, e);
                    continue;
                }
            }
            templates.push(template);
        }

        if templates.is_empty() {
            return Ok(ImportOutcome::default());
        }
        log::info!("Importing {} template(s)", templates.len());

        let ordered = sort_by_dependency(templates)?;
        Ok(import_with_retry(self, ctx, ordered, inventory).await)
    }

    async fn delete_file_changes(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        imported: &ImportOutcome,
        inventory: &LiveInventory,
    ) -> Result<Vec<String>> {
        let mut queued = Vec::new();

        for path in paths_in(paths, ctx.prefix(AssetKind::Template), ".yaml") {
            let Some(text) = read_cache_text(ctx.cache, path)? else {
                continue;
            };
            let Some(template) = self.parse_admitted(&text, path) else {
                continue;
            };
            if template.uuids().iter().any(|u| imported.contains(u)) {
                log::info!(
                    "Keeping template '{}', it was imported under another path",
                    template.name()
                );
                continue;
            }
            match inventory.template_id(template.uuid(), template.name()) {
                Some(id) => queued.push((id.to_string(), template.name().to_string())),
                None => log::debug!("Template '{}' is not in Zabbix", template.name()),
            }
        }

        Ok(delete_queued(ctx, AssetKind::Template, queued, move |ids| async move {
            ctx.zabbix.delete_templates(&ids).await
        })
        .await)
    }

    /// Stamps the configured vendor on changed templates that carry none,
    /// and a fresh version when `set_version` is on. A stamp is written to
    /// the cache and to Zabbix only once both vendor fields are set, so the
    /// next export matches the committed file.
    async fn prepare_commit(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        inventory: &LiveInventory,
    ) -> Result<usize> {
        let vendor = ctx.settings.vendor.as_deref().filter(|v| !v.is_empty());
        if vendor.is_none() && !ctx.settings.set_version {
            return Ok(0);
        }
        let version = Utc::now().format(VERSION_FORMAT).to_string();

        let mut stamped = 0;
        for path in paths_in(paths, ctx.prefix(AssetKind::Template), ".yaml") {
            let Some(text) = read_cache_text(ctx.cache, path)? else {
                continue;
            };
            let Some(mut template) = self.parse_admitted(&text, path) else {
                continue;
            };

            let mut changed = false;
            if let Some(vendor) = vendor {
                if template.vendor().0.map_or(true, str::is_empty) {
                    changed |= template.set_vendor_name(vendor);
                }
            }
            if ctx.settings.set_version {
                changed |= template.set_vendor_version(&version);
            }

            let (vendor_name, vendor_version) = match template.vendor() {
                (Some(name), Some(stamp)) if !name.is_empty() && !stamp.is_empty() => {
                    (name.to_string(), stamp.to_string())
                }
                _ => {
                    if changed {
                        log::debug!(
                            "Template '{}' has no complete vendor, not stamped",
                            template.name()
                        );
                    }
                    continue;
                }
            };
            if !changed {
                continue;
            }

            ctx.cache.write(path, template.to_yaml()?)?;
            stamped += 1;

            if ctx.dry_run() {
                log::info!("Dry run: would stamp vendor on template '{}'", template.name());
                continue;
            }
            let Some(id) = inventory.template_id(template.uuid(), template.name()) else {
                log::warn!(
                    "Template '{}' is not in Zabbix, vendor stamp stays local",
                    template.name()
                );
                continue;
            };
            match ctx.zabbix.update_template_vendor(id, &vendor_name, &vendor_version).await {
                Ok(()) => log::info!("Stamped vendor on template '{}'", template.name()),
                Err(e) => log::error!(
                    "Failed to stamp vendor on template '{}': {}",
                    template.name(),
                    e
                ),
            }
        }
        Ok(stamped)
    }
}

#[async_trait]
impl ImportStep for TemplateHandler {
    type Item = Template;

    fn label(item: &Template) -> String {
        item.name().to_string()
    }

    fn identifiers(item: &Template) -> Vec<String> {
        item.uuids()
    }

    async fn import_one(
        &self,
        ctx: &SyncContext<'_>,
        item: &Template,
        _inventory: &mut LiveInventory,
    ) -> Result<()> {
        let source = item.to_yaml()?;
        ctx.zabbix
            .import_templates(&source)
            .await
            .map_err(SyncError::from)
    }
}
