//! Per-kind synchronization between the live system and the cache.
//!
//! Handlers never call each other. The reconciler runs them in registry
//! order and hands each one the inventory filled by the previous ones.

pub mod global_macro;
pub mod icon_map;
pub mod image;
pub mod script;
pub mod template;

use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;

use crate::assets::{AssetKind, ImageType};
use crate::cache::{CacheError, CacheRoot};
use crate::config::Settings;
use crate::error::Result;
use crate::zabbix::{self, UserGroup, ZabbixApi};

/// Passes over an import batch: the first attempt plus one retry round.
pub const IMPORT_ROUNDS: usize = 2;

/// Everything a handler may touch during one run.
pub struct SyncContext<'a> {
    pub settings: &'a Settings,
    pub zabbix: &'a dyn ZabbixApi,
    pub cache: &'a CacheRoot,
}

impl SyncContext<'_> {
    pub fn dry_run(&self) -> bool {
        self.settings.dry_run
    }

    pub fn prefix(&self, kind: AssetKind) -> &str {
        self.settings.prefix_path(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub name: String,
    pub image_type: ImageType,
}

/// Id and unique name of a live object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub id: String,
    pub name: String,
}

/// Identity records of live objects, collected during export and used to
/// tell updates from creates.
#[derive(Debug, Default)]
pub struct LiveInventory {
    pub templates: Vec<TemplateRecord>,
    pub images: Vec<ImageRecord>,
    pub icon_maps: Vec<ObjectRecord>,
    pub scripts: Vec<ObjectRecord>,
    pub global_macros: Vec<ObjectRecord>,
    pub user_groups: Vec<UserGroup>,
}

impl LiveInventory {
    pub fn template_id(&self, uuid: &str, name: &str) -> Option<&str> {
        self.templates
            .iter()
            .find(|t| t.uuid == uuid)
            .or_else(|| self.templates.iter().find(|t| t.name == name))
            .map(|t| t.id.as_str())
    }

    pub fn image_id(&self, name: &str) -> Option<&str> {
        self.images
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.id.as_str())
    }

    /// Id of an icon, the only image type icon maps may reference.
    pub fn icon_id(&self, name: &str) -> Option<String> {
        self.images
            .iter()
            .find(|i| i.image_type == ImageType::Icon && i.name == name)
            .map(|i| i.id.clone())
    }

    pub fn image_name(&self, id: &str) -> Option<String> {
        self.images
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.name.clone())
    }

    pub fn user_group_id(&self, name: &str) -> Option<String> {
        self.user_groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.usrgrpid.clone())
    }
}

/// Id of the object named `name` in a record list.
pub(crate) fn record_id<'r>(records: &'r [ObjectRecord], name: &str) -> Option<&'r str> {
    records
        .iter()
        .find(|r| r.name == name)
        .map(|r| r.id.as_str())
}

/// Result of importing a set of changed files.
#[derive(Debug, Default, Clone)]
pub struct ImportOutcome {
    /// Names of objects written to the live system.
    pub imported: Vec<String>,
    /// Stable identifiers of the imported objects, consulted before deleting.
    pub identifiers: HashSet<String>,
    /// Names of objects that still failed after the retry round.
    pub failed: Vec<String>,
}

impl ImportOutcome {
    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }
}

#[async_trait]
pub trait AssetHandler: Send + Sync {
    fn kind(&self) -> AssetKind;

    fn is_enabled(&self, settings: &Settings) -> bool {
        settings.is_enabled(self.kind())
    }

    /// Whether `path` is a cache file this handler would produce, i.e. one
    /// it may remove ahead of an export.
    fn owns_cache_file(&self, ctx: &SyncContext<'_>, path: &str) -> bool;

    /// Writes the live objects admitted by the filter to the cache and
    /// records the identity of every fetched object. Returns the number of
    /// files written.
    async fn export_to_cache(
        &self,
        ctx: &SyncContext<'_>,
        inventory: &mut LiveInventory,
    ) -> Result<usize>;

    /// Pushes the desired content of changed cache files to the live system.
    async fn import_file_changes(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        inventory: &mut LiveInventory,
    ) -> Result<ImportOutcome>;

    /// Removes live objects whose cache files are not desired. Objects found
    /// in `imported` are kept. Returns the names of deleted objects.
    async fn delete_file_changes(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        imported: &ImportOutcome,
        inventory: &LiveInventory,
    ) -> Result<Vec<String>>;

    /// Adjusts new or modified cache files before they are committed.
    async fn prepare_commit(
        &self,
        _ctx: &SyncContext<'_>,
        _paths: &[String],
        _inventory: &LiveInventory,
    ) -> Result<usize> {
        Ok(0)
    }
}

/// The handlers of one run, in their fixed execution order.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn AssetHandler>>,
}

impl HandlerRegistry {
    /// Builds every handler. Filters are compiled here, so invalid patterns
    /// fail before the run touches anything.
    pub fn new(settings: &Settings) -> Result<Self> {
        if settings.sync_icon_maps && !settings.sync_icons {
            log::warn!("Icon map synchronization requires sync_icons, skipping icon maps");
        }
        let handlers: Vec<Box<dyn AssetHandler>> = vec![
            Box::new(template::TemplateHandler::new(settings)?),
            Box::new(image::ImageHandler::new(settings)?),
            Box::new(icon_map::IconMapHandler::new(settings)?),
            Box::new(script::ScriptHandler::new(settings)?),
            Box::new(global_macro::GlobalMacroHandler::new(settings)?),
        ];
        Ok(Self { handlers })
    }

    /// Enabled handlers, in execution order.
    pub fn enabled<'a>(
        &'a self,
        settings: &'a Settings,
    ) -> impl Iterator<Item = &'a dyn AssetHandler> + 'a {
        self.handlers
            .iter()
            .map(|h| &**h)
            .filter(move |h| h.is_enabled(settings))
    }
}

/// Whether `path` lies below `prefix` and has the given extension.
pub(crate) fn is_cache_file(path: &str, prefix: &str, extension: &str) -> bool {
    CacheRoot::is_within(path, prefix) && path.ends_with(extension)
}

/// Changed paths below `prefix` with the given extension.
pub(crate) fn paths_in<'p>(
    paths: &'p [String],
    prefix: &str,
    extension: &str,
) -> Vec<&'p String> {
    paths
        .iter()
        .filter(|p| is_cache_file(p, prefix, extension))
        .collect()
}

/// Reads a cache file. Paths escaping the cache are an error, unreadable
/// files are logged and skipped.
pub(crate) fn read_cache_file(cache: &CacheRoot, path: &str) -> Result<Option<Vec<u8>>> {
    match cache.read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e @ CacheError::PathEscape { .. }) => Err(e.into()),
        Err(e) => {
            log::warn!("Skipping unreadable cache file {}: {}", path, e);
            Ok(None)
        }
    }
}

pub(crate) fn read_cache_text(cache: &CacheRoot, path: &str) -> Result<Option<String>> {
    Ok(read_cache_file(cache, path)?.and_then(|bytes| match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(_) => {
            log::warn!("Skipping cache file {}: not valid UTF-8", path);
            None
        }
    }))
}

/// One object's import into the live system.
#[async_trait]
pub(crate) trait ImportStep: AssetHandler {
    type Item: Send + Sync;

    /// Display name of an item.
    fn label(item: &Self::Item) -> String;

    /// Stable identifiers recorded once the item is imported.
    fn identifiers(item: &Self::Item) -> Vec<String>;

    async fn import_one(
        &self,
        ctx: &SyncContext<'_>,
        item: &Self::Item,
        inventory: &mut LiveInventory,
    ) -> Result<()>;
}

/// Imports `items` in order. Failures are retried once after the rest of
/// the batch, then reported as failed.
pub(crate) async fn import_with_retry<S: ImportStep>(
    step: &S,
    ctx: &SyncContext<'_>,
    items: Vec<S::Item>,
    inventory: &mut LiveInventory,
) -> ImportOutcome {
    let kind = step.kind();
    let mut outcome = ImportOutcome::default();
    let mut pending = items;

    for round in 1..=IMPORT_ROUNDS {
        if pending.is_empty() {
            break;
        }
        if round > 1 {
            log::info!("Retrying {} failed {} import(s)", pending.len(), kind);
        }

        let mut failed = Vec::new();
        for item in pending {
            let label = S::label(&item);
            if ctx.dry_run() {
                log::info!("Dry run: would import {} '{}'", kind, label);
            } else {
                match step.import_one(ctx, &item, inventory).await {
                    Ok(()) => log::info!("Imported {} '{}'", kind, label),
                    Err(e) => {
                        if round < IMPORT_ROUNDS {
                            log::warn!("Failed to import {} '{}', will retry: {}", kind, label, e);
                        } else {
                            log::error!("Failed to import {} '{}': {}", kind, label, e);
                        }
                        failed.push(item);
                        continue;
                    }
                }
            }
            outcome.identifiers.extend(S::identifiers(&item));
            outcome.imported.push(label);
        }
        pending = failed;
    }

    outcome.failed = pending.iter().map(S::label).collect();
    outcome
}

/// Issues one bulk delete for the queued `(id, name)` pairs.
///
/// A failed call is logged and reported as nothing deleted.
pub(crate) async fn delete_queued<F, Fut>(
    ctx: &SyncContext<'_>,
    kind: AssetKind,
    queued: Vec<(String, String)>,
    delete: F,
) -> Vec<String>
where
    F: FnOnce(Vec<String>) -> Fut,
    Fut: Future<Output = zabbix::Result<()>> + Send,
{
    if queued.is_empty() {
        return Vec::new();
    }
    let (ids, names): (Vec<String>, Vec<String>) = queued.into_iter().unzip();

    if ctx.dry_run() {
        for name in &names {
            log::info!("Dry run: would delete {} '{}'", kind, name);
        }
        return names;
    }

    match delete(ids).await {
        Ok(()) => {
            for name in &names {
                log::info!("Deleted {} '{}'", kind, name);
            }
            names
        }
        Err(e) => {
            log::error!("Failed to delete {} {} object(s): {}", names.len(), kind, e);
            Vec::new()
        }
    }
}
