use async_trait::async_trait;

use super::{
    delete_queued, import_with_retry, is_cache_file, paths_in, read_cache_text, record_id,
    AssetHandler, ImportOutcome, ImportStep, LiveInventory, ObjectRecord, SyncContext,
};
use crate::assets::{AssetKind, Script};
use crate::config::Settings;
use crate::error::Result;
use crate::filter::Filter;
use crate::zabbix::ZabbixError;

pub struct ScriptHandler {
    filter: Filter,
}

impl ScriptHandler {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            filter: Filter::for_kind(settings, AssetKind::Script)?,
        })
    }

    fn parse_admitted(&self, text: &str, path: &str) -> Option<Script> {
        match Script::parse(text, path) {
            Ok(script) if self.filter.admits(script.name()) => Some(script),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Skipping {}: {}", path, e);
                None
            }
        }
    }

    /// Resolves the stored user group name, falling back to the default group.
    fn user_group_id(
        &self,
        settings: &Settings,
        script: &Script,
        inventory: &LiveInventory,
    ) -> Result<Option<String>> {
        let Some(name) = script.user_group() else {
            return Ok(None);
        };
        if let Some(id) = inventory.user_group_id(name) {
            return Ok(Some(id));
        }

        let fallback = settings.script_default_usrgrp.as_str();
        log::warn!(
            "User group '{}' of script '{}' not found, using '{}'",
            name,
            script.unique_name(),
            fallback
        );
        inventory
            .user_group_id(fallback)
            .map(Some)
            .ok_or_else(|| {
                ZabbixError::NotFound {
                    kind: "user group",
                    name: fallback.to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl AssetHandler for ScriptHandler {
    fn kind(&self) -> AssetKind {
        AssetKind::Script
    }

    fn owns_cache_file(&self, ctx: &SyncContext<'_>, path: &str) -> bool {
        if !is_cache_file(path, ctx.prefix(AssetKind::Script), ".yaml") {
            return false;
        }
        ctx.cache
            .read_to_string(path)
            .ok()
            .and_then(|text| Script::parse(&text, path).ok())
            .is_some_and(|script| self.filter.admits(script.name()))
    }

    async fn export_to_cache(
        &self,
        ctx: &SyncContext<'_>,
        inventory: &mut LiveInventory,
    ) -> Result<usize> {
        inventory.user_groups = ctx.zabbix.get_user_groups().await?;
        let found = ctx
            .zabbix
            .get_scripts(self.filter.server_side_names())
            .await?;
        log::info!("Found {} script(s) in Zabbix", found.len());

        let default_group = ctx.settings.script_default_usrgrp.as_str();
        let force_default = ctx.settings.script_without_usrgrp;
        let prefix = ctx.prefix(AssetKind::Script);

        let mut written = 0;
        for object in &found {
            let script =
                Script::from_zabbix(object, &inventory.user_groups, default_group, force_default);
            if let Some(id) = &object.scriptid {
                inventory.scripts.push(ObjectRecord {
                    id: id.clone(),
                    name: script.unique_name(),
                });
            }
            if self.filter.admits(script.name()) {
                ctx.cache.write(script.cache_path(prefix), script.to_yaml()?)?;
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
        let mut scripts = Vec::new();
        for path in paths_in(paths, ctx.prefix(AssetKind::Script), ".yaml") {
            let Some(text) = read_cache_text(ctx.cache, path)? else {
                continue;
            };
            if let Some(script) = self.parse_admitted(&text, path) {
                scripts.push(script);
            }
        }

        if scripts.is_empty() {
            return Ok(ImportOutcome::default());
        }
        Ok(import_with_retry(self, ctx, scripts, inventory).await)
    }

    async fn delete_file_changes(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        imported: &ImportOutcome,
        inventory: &LiveInventory,
    ) -> Result<Vec<String>> {
        let mut queued = Vec::new();
        for path in paths_in(paths, ctx.prefix(AssetKind::Script), ".yaml") {
            let Some(text) = read_cache_text(ctx.cache, path)? else {
                continue;
            };
            let Some(script) = self.parse_admitted(&text, path) else {
                continue;
            };
            let unique_name = script.unique_name();
            if imported.contains(&unique_name) {
                continue;
            }
            if let Some(id) = record_id(&inventory.scripts, &unique_name) {
                queued.push((id.to_string(), unique_name));
            }
        }

        Ok(delete_queued(ctx, AssetKind::Script, queued, move |ids| async move {
            ctx.zabbix.delete_scripts(&ids).await
        })
        .await)
    }
}

#[async_trait]
impl ImportStep for ScriptHandler {
    type Item = Script;

    fn label(item: &Script) -> String {
        item.unique_name()
    }

    fn identifiers(item: &Script) -> Vec<String> {
        vec![item.unique_name()]
    }

    async fn import_one(
        &self,
        ctx: &SyncContext<'_>,
        item: &Script,
        inventory: &mut LiveInventory,
    ) -> Result<()> {
        let usrgrpid = self.user_group_id(ctx.settings, item, inventory)?;
        let unique_name = item.unique_name();

        match record_id(&inventory.scripts, &unique_name).map(str::to_string) {
            Some(id) => {
                ctx.zabbix
                    .update_script(&item.to_zabbix(Some(id), usrgrpid))
                    .await?
            }
            None => {
                let id = ctx.zabbix.create_script(&item.to_zabbix(None, usrgrpid)).await?;
                inventory.scripts.push(ObjectRecord {
                    id,
                    name: unique_name,
                });
            }
        }
        Ok(())
    }
}
