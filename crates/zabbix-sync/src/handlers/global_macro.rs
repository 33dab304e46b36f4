use async_trait::async_trait;

use super::{
    delete_queued, import_with_retry, is_cache_file, paths_in, read_cache_text, record_id,
    AssetHandler, ImportOutcome, ImportStep, LiveInventory, ObjectRecord, SyncContext,
};
use crate::assets::{AssetKind, GlobalMacro};
use crate::config::Settings;
use crate::error::Result;
use crate::filter::Filter;

pub struct GlobalMacroHandler {
    filter: Filter,
}

impl GlobalMacroHandler {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            filter: Filter::for_kind(settings, AssetKind::GlobalMacro)?,
        })
    }

    fn parse_admitted(&self, text: &str, path: &str) -> Option<GlobalMacro> {
        match GlobalMacro::parse(text, path) {
            Ok(m) if self.filter.admits(&m.name) => Some(m),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Skipping {}: {}", path, e);
                None
            }
        }
    }
}

#[async_trait]
impl AssetHandler for GlobalMacroHandler {
    fn kind(&self) -> AssetKind {
        AssetKind::GlobalMacro
    }

    fn owns_cache_file(&self, ctx: &SyncContext<'_>, path: &str) -> bool {
        if !is_cache_file(path, ctx.prefix(AssetKind::GlobalMacro), ".yaml") {
            return false;
        }
        ctx.cache
            .read_to_string(path)
            .ok()
            .and_then(|text| GlobalMacro::parse(&text, path).ok())
            .is_some_and(|m| self.filter.admits(&m.name))
    }

    async fn export_to_cache(
        &self,
        ctx: &SyncContext<'_>,
        inventory: &mut LiveInventory,
    ) -> Result<usize> {
        let found = ctx
            .zabbix
            .get_global_macros(self.filter.server_side_names())
            .await?;
        log::info!("Found {} global macro(s) in Zabbix", found.len());

        let prefix = ctx.prefix(AssetKind::GlobalMacro);
        let mut written = 0;
        for object in &found {
            if let Some(id) = &object.globalmacroid {
                inventory.global_macros.push(ObjectRecord {
                    id: id.clone(),
                    name: object.name.clone(),
                });
            }
            if !self.filter.admits(&object.name) {
                continue;
            }
            let global_macro = GlobalMacro::from_zabbix(object);
            ctx.cache
                .write(global_macro.cache_path(prefix), global_macro.to_yaml()?)?;
            written += 1;
        }
        Ok(written)
    }

    async fn import_file_changes(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        inventory: &mut LiveInventory,
    ) -> Result<ImportOutcome> {
        let mut macros = Vec::new();
        for path in paths_in(paths, ctx.prefix(AssetKind::GlobalMacro), ".yaml") {
            let Some(text) = read_cache_text(ctx.cache, path)? else {
                continue;
            };
            let Some(global_macro) = self.parse_admitted(&text, path) else {
                continue;
            };
            if global_macro.is_secret() {
                log::info!(
                    "Skipping secret macro {}, its value is not stored",
                    global_macro.name
                );
                continue;
            }
            macros.push(global_macro);
        }

        if macros.is_empty() {
            return Ok(ImportOutcome::default());
        }
        Ok(import_with_retry(self, ctx, macros, inventory).await)
    }

    async fn delete_file_changes(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        imported: &ImportOutcome,
        inventory: &LiveInventory,
    ) -> Result<Vec<String>> {
        let mut queued = Vec::new();
        for path in paths_in(paths, ctx.prefix(AssetKind::GlobalMacro), ".yaml") {
            let Some(text) = read_cache_text(ctx.cache, path)? else {
                continue;
            };
            let Some(global_macro) = self.parse_admitted(&text, path) else {
                continue;
            };
            if imported.contains(&global_macro.name) {
                continue;
            }
            if let Some(id) = record_id(&inventory.global_macros, &global_macro.name) {
                queued.push((id.to_string(), global_macro.name));
            }
        }

        Ok(delete_queued(ctx, AssetKind::GlobalMacro, queued, move |ids| async move {
            ctx.zabbix.delete_global_macros(&ids).await
        })
        .await)
    }
}

#[async_trait]
impl ImportStep for GlobalMacroHandler {
    type Item = GlobalMacro;

    fn label(item: &GlobalMacro) -> String {
        item.name.clone()
    }

    fn identifiers(item: &GlobalMacro) -> Vec<String> {
        vec![item.name.clone()]
    }

    async fn import_one(
        &self,
        ctx: &SyncContext<'_>,
        item: &GlobalMacro,
        inventory: &mut LiveInventory,
    ) -> Result<()> {
        match record_id(&inventory.global_macros, &item.name).map(str::to_string) {
            Some(id) => ctx.zabbix.update_global_macro(&item.to_zabbix(Some(id))).await?,
            None => {
                let id = ctx.zabbix.create_global_macro(&item.to_zabbix(None)).await?;
                inventory.global_macros.push(ObjectRecord {
                    id,
                    name: item.name.clone(),
                });
            }
        }
        Ok(())
    }
}
