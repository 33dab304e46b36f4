use async_trait::async_trait;

use super::{
    delete_queued, import_with_retry, is_cache_file, paths_in, read_cache_text, record_id,
    AssetHandler, ImportOutcome, ImportStep, LiveInventory, ObjectRecord, SyncContext,
};
use crate::assets::{AssetKind, IconMap};
use crate::config::Settings;
use crate::error::Result;
use crate::filter::Filter;

pub struct IconMapHandler {
    filter: Filter,
}

impl IconMapHandler {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            filter: Filter::for_kind(settings, AssetKind::IconMap)?,
        })
    }

    fn parse_admitted(&self, text: &str, path: &str) -> Option<IconMap> {
        match IconMap::parse(text, path) {
            Ok(map) if self.filter.admits(&map.name) => Some(map),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Skipping {}: {}", path, e);
                None
            }
        }
    }
}

#[async_trait]
impl AssetHandler for IconMapHandler {
    fn kind(&self) -> AssetKind {
        AssetKind::IconMap
    }

    /// Icon maps reference icons by name, so they need icons synchronized.
    fn is_enabled(&self, settings: &Settings) -> bool {
        settings.sync_icon_maps && settings.sync_icons
    }

    fn owns_cache_file(&self, ctx: &SyncContext<'_>, path: &str) -> bool {
        if !is_cache_file(path, ctx.prefix(AssetKind::IconMap), ".yaml") {
            return false;
        }
        ctx.cache
            .read_to_string(path)
            .ok()
            .and_then(|text| IconMap::parse(&text, path).ok())
            .is_some_and(|map| self.filter.admits(&map.name))
    }

    async fn export_to_cache(
        &self,
        ctx: &SyncContext<'_>,
        inventory: &mut LiveInventory,
    ) -> Result<usize> {
        let found = ctx
            .zabbix
            .get_icon_maps(self.filter.server_side_names())
            .await?;
        log::info!("Found {} icon map(s) in Zabbix", found.len());

        let prefix = ctx.prefix(AssetKind::IconMap);
        let mut written = 0;
        for object in &found {
            if self.filter.admits(&object.name) {
                match IconMap::from_zabbix(object, |id| inventory.image_name(id)) {
                    Ok(map) => {
                        ctx.cache.write(map.cache_path(prefix), map.to_yaml()?)?;
                        written += 1;
                    }
                    Err(e) => log::warn!("Skipping icon map: {}", e),
                }
            }
            if let Some(id) = &object.iconmapid {
                inventory.icon_maps.push(ObjectRecord {
                    id: id.clone(),
                    name: object.name.clone(),
                });
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
        let mut maps = Vec::new();
        for path in paths_in(paths, ctx.prefix(AssetKind::IconMap), ".yaml") {
            let Some(text) = read_cache_text(ctx.cache, path)? else {
                continue;
            };
            let Some(map) = self.parse_admitted(&text, path) else {
                continue;
            };
            // icons unknown to Zabbix cannot be fixed by retrying
            if let Err(e) = map.to_zabbix(None, |name| inventory.icon_id(name)) {
                log::warn!("Skipping {}: {}", path, e);
                continue;
            }
            maps.push(map);
        }

        if maps.is_empty() {
            return Ok(ImportOutcome::default());
        }
        Ok(import_with_retry(self, ctx, maps, inventory).await)
    }

    async fn delete_file_changes(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        imported: &ImportOutcome,
        inventory: &LiveInventory,
    ) -> Result<Vec<String>> {
        let mut queued = Vec::new();
        for path in paths_in(paths, ctx.prefix(AssetKind::IconMap), ".yaml") {
            let Some(text) = read_cache_text(ctx.cache, path)? else {
                continue;
            };
            let Some(map) = self.parse_admitted(&text, path) else {
                continue;
            };
            if imported.contains(&map.name) {
                continue;
            }
            if let Some(id) = record_id(&inventory.icon_maps, &map.name) {
                queued.push((id.to_string(), map.name));
            }
        }

        Ok(delete_queued(ctx, AssetKind::IconMap, queued, move |ids| async move {
            ctx.zabbix.delete_icon_maps(&ids).await
        })
        .await)
    }
}

#[async_trait]
impl ImportStep for IconMapHandler {
    type Item = IconMap;

    fn label(item: &IconMap) -> String {
        item.name.clone()
    }

    fn identifiers(item: &IconMap) -> Vec<String> {
        vec![item.name.clone()]
    }

    async fn import_one(
        &self,
        ctx: &SyncContext<'_>,
        item: &IconMap,
        inventory: &mut LiveInventory,
    ) -> Result<()> {
        let existing = record_id(&inventory.icon_maps, &item.name).map(str::to_string);
        let object = item.to_zabbix(existing.clone(), |name| inventory.icon_id(name))?;

        if existing.is_some() {
            ctx.zabbix.update_icon_map(&object).await?;
        } else {
            let id = ctx.zabbix.create_icon_map(&object).await?;
            inventory.icon_maps.push(ObjectRecord {
                id,
                name: item.name.clone(),
            });
        }
        Ok(())
    }
}
