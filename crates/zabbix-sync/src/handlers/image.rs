use async_trait::async_trait;

use super::{
    delete_queued, import_with_retry, read_cache_file, AssetHandler, ImageRecord, ImportOutcome,
    ImportStep, LiveInventory, SyncContext,
};
use crate::assets::{AssetKind, Image, ImageType};
use crate::config::Settings;
use crate::error::Result;
use crate::filter::Filter;

pub struct ImageHandler {
    filter: Filter,
}

fn type_enabled(settings: &Settings, image_type: ImageType) -> bool {
    match image_type {
        ImageType::Icon => settings.sync_icons,
        ImageType::Background => settings.sync_backgrounds,
    }
}

impl ImageHandler {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            filter: Filter::for_kind(settings, AssetKind::Image)?,
        })
    }

    /// Type and name of a cache path this run synchronizes.
    fn selected(&self, ctx: &SyncContext<'_>, path: &str) -> Option<(ImageType, String)> {
        let (image_type, name) = Image::identify(path, ctx.prefix(AssetKind::Image))?;
        (type_enabled(ctx.settings, image_type) && self.filter.admits(&name))
            .then_some((image_type, name))
    }
}

#[async_trait]
impl AssetHandler for ImageHandler {
    fn kind(&self) -> AssetKind {
        AssetKind::Image
    }

    fn owns_cache_file(&self, ctx: &SyncContext<'_>, path: &str) -> bool {
        self.selected(ctx, path).is_some()
    }

    async fn export_to_cache(
        &self,
        ctx: &SyncContext<'_>,
        inventory: &mut LiveInventory,
    ) -> Result<usize> {
        // every image is recorded, icon maps resolve icons outside the filter too
        let images = ctx.zabbix.get_images(None).await?;
        log::info!("Found {} image(s) in Zabbix", images.len());

        let prefix = ctx.prefix(AssetKind::Image);
        let mut written = 0;
        for object in &images {
            let Some(image_type) = ImageType::from_api_code(&object.imagetype) else {
                log::warn!("Skipping image '{}' with unknown type {}", object.name, object.imagetype);
                continue;
            };
            inventory.images.push(ImageRecord {
                id: object.imageid.clone().unwrap_or_default(),
                name: object.name.clone(),
                image_type,
            });

            if !type_enabled(ctx.settings, image_type) || !self.filter.admits(&object.name) {
                continue;
            }
            match Image::from_zabbix(object) {
                Ok(image) => {
                    ctx.cache.write(image.cache_path(prefix), &image.data)?;
                    written += 1;
                }
                Err(e) => log::warn!("Skipping image: {}", e),
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
        let prefix = ctx.prefix(AssetKind::Image);
        let mut images = Vec::new();
        for path in paths {
            if self.selected(ctx, path).is_none() {
                continue;
            }
            let Some(data) = read_cache_file(ctx.cache, path)? else {
                continue;
            };
            images.push(Image::open(path, prefix, data)?);
        }

        if images.is_empty() {
            return Ok(ImportOutcome::default());
        }
        Ok(import_with_retry(self, ctx, images, inventory).await)
    }

    async fn delete_file_changes(
        &self,
        ctx: &SyncContext<'_>,
        paths: &[String],
        imported: &ImportOutcome,
        inventory: &LiveInventory,
    ) -> Result<Vec<String>> {
        let queued = paths
            .iter()
            .filter_map(|path| self.selected(ctx, path))
            .filter(|(_, name)| !imported.contains(name))
            .filter_map(|(_, name)| {
                inventory
                    .image_id(&name)
                    .map(|id| (id.to_string(), name.clone()))
            })
            .collect();

        Ok(delete_queued(ctx, AssetKind::Image, queued, move |ids| async move {
            ctx.zabbix.delete_images(&ids).await
        })
        .await)
    }
}

#[async_trait]
impl ImportStep for ImageHandler {
    type Item = Image;

    fn label(item: &Image) -> String {
        item.name.clone()
    }

    fn identifiers(item: &Image) -> Vec<String> {
        vec![item.name.clone()]
    }

    async fn import_one(
        &self,
        ctx: &SyncContext<'_>,
        item: &Image,
        inventory: &mut LiveInventory,
    ) -> Result<()> {
        match inventory.image_id(&item.name).map(str::to_string) {
            Some(id) => ctx.zabbix.update_image(&item.to_zabbix(Some(id))).await?,
            None => {
                let id = ctx.zabbix.create_image(&item.to_zabbix(None)).await?;
                inventory.images.push(ImageRecord {
                    id,
                    name: item.name.clone(),
                    image_type: item.image_type,
                });
            }
        }
        Ok(())
    }
}
