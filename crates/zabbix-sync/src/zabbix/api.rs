//! Operations the synchronization handlers need from Zabbix.

use async_trait::async_trait;

use super::error::Result;
use super::types::*;

/// Live Zabbix configuration, as consumed by the asset handlers.
///
/// `names` arguments are optional server side name filters; `None` fetches
/// every object of that kind.
#[async_trait]
pub trait ZabbixApi: Send + Sync {
    fn server_version(&self) -> ServerVersion;

    /// The root template group and every group nested below it.
    async fn get_template_groups(&self, root: &str) -> Result<Vec<TemplateGroupSummary>>;
    async fn get_templates(
        &self,
        group_ids: &[String],
        names: Option<&[String]>,
    ) -> Result<Vec<TemplateSummary>>;
    /// Exports templates as a YAML `zabbix_export` document.
    async fn export_templates(&self, template_ids: &[String]) -> Result<String>;
    /// Imports a YAML `zabbix_export` document of templates.
    async fn import_templates(&self, source: &str) -> Result<()>;
    async fn update_template_vendor(
        &self,
        template_id: &str,
        vendor_name: &str,
        vendor_version: &str,
    ) -> Result<()>;
    async fn delete_templates(&self, template_ids: &[String]) -> Result<()>;

    async fn get_images(&self, names: Option<&[String]>) -> Result<Vec<ImageObject>>;
    /// Returns the id of the new image.
    async fn create_image(&self, image: &ImageObject) -> Result<String>;
    async fn update_image(&self, image: &ImageObject) -> Result<()>;
    async fn delete_images(&self, image_ids: &[String]) -> Result<()>;

    async fn get_icon_maps(&self, names: Option<&[String]>) -> Result<Vec<IconMapObject>>;
    async fn create_icon_map(&self, icon_map: &IconMapObject) -> Result<String>;
    async fn update_icon_map(&self, icon_map: &IconMapObject) -> Result<()>;
    async fn delete_icon_maps(&self, icon_map_ids: &[String]) -> Result<()>;

    async fn get_scripts(&self, names: Option<&[String]>) -> Result<Vec<ScriptObject>>;
    async fn create_script(&self, script: &ScriptObject) -> Result<String>;
    async fn update_script(&self, script: &ScriptObject) -> Result<()>;
    async fn delete_scripts(&self, script_ids: &[String]) -> Result<()>;
    async fn get_user_groups(&self) -> Result<Vec<UserGroup>>;

    async fn get_global_macros(&self, names: Option<&[String]>) -> Result<Vec<GlobalMacroObject>>;
    async fn create_global_macro(&self, global_macro: &GlobalMacroObject) -> Result<String>;
    async fn update_global_macro(&self, global_macro: &GlobalMacroObject) -> Result<()>;
    async fn delete_global_macros(&self, global_macro_ids: &[String]) -> Result<()>;
}
