//! Shared fixtures: an in-memory Zabbix and a workspace with a bare remote.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use serde_yaml::Mapping;
use tempfile::TempDir;

use zabbix_sync::config::Settings;
use zabbix_sync::zabbix::{
    GlobalMacroObject, IconMapObject, IconMappingObject, ImageObject, ScriptObject, ServerVersion,
    TemplateGroupSummary, TemplateSummary, UserGroup, ZabbixApi, ZabbixError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeTemplate {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub description: String,
    pub groups: Vec<String>,
    pub links: Vec<String>,
    /// `vendor.name` and `vendor.version`.
    pub vendor: Option<(String, String)>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    templates: BTreeMap<String, FakeTemplate>,
    images: Vec<ImageObject>,
    icon_maps: Vec<IconMapObject>,
    scripts: Vec<ScriptObject>,
    user_groups: Vec<UserGroup>,
    global_macros: Vec<GlobalMacroObject>,
    /// Remaining injected failures by object name.
    failures: HashMap<String, usize>,
    /// Every write call, in order.
    mutations: Vec<String>,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        (10_000 + self.next_id).to_string()
    }

    fn mutate(&mut self, call: impl Into<String>) {
        self.mutations.push(call.into());
    }

    fn inject(&mut self, method: &str, name: &str) -> Result<(), ZabbixError> {
        match self.failures.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ZabbixError::Api {
                    method: method.to_string(),
                    code: -32500,
                    message: "Application error.".to_string(),
                    data: format!("injected failure for '{}'", name),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Zabbix 7.0 held in memory.
pub struct FakeZabbix {
    state: Mutex<State>,
    version: ServerVersion,
}

impl Default for FakeZabbix {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeZabbix {
    pub fn new() -> Self {
        let state = State {
            user_groups: vec![UserGroup {
                usrgrpid: "7".to_string(),
                name: "Zabbix administrators".to_string(),
            }],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            version: ServerVersion::parse("7.0.5").unwrap(),
        }
    }

    /// Adds a template in the root `Templates` group.
    pub fn add_template(&self, name: &str, uuid: &str, links: &[&str]) -> String {
        self.add_template_in(name, uuid, "Templates", links)
    }

    pub fn add_template_in(&self, name: &str, uuid: &str, group: &str, links: &[&str]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.templates.insert(
            id.clone(),
            FakeTemplate {
                id: id.clone(),
                uuid: uuid.to_string(),
                name: name.to_string(),
                description: String::new(),
                groups: vec![group.to_string()],
                links: links.iter().map(|l| l.to_string()).collect(),
                vendor: None,
            },
        );
        id
    }

    pub fn set_vendor(&self, name: &str, vendor_name: &str, vendor_version: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(t) = state.templates.values_mut().find(|t| t.name == name) {
            t.vendor = Some((vendor_name.to_string(), vendor_version.to_string()));
        }
    }

    pub fn remove_template(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .templates
            .retain(|_, t| t.name != name);
    }

    pub fn set_description(&self, name: &str, description: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(t) = state.templates.values_mut().find(|t| t.name == name) {
            t.description = description.to_string();
        }
    }

    pub fn template(&self, name: &str) -> Option<FakeTemplate> {
        self.state
            .lock()
            .unwrap()
            .templates
            .values()
            .find(|t| t.name == name)
            .cloned()
    }

    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .templates
            .values()
            .map(|t| t.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn add_image(&self, name: &str, imagetype: &str, data: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.images.push(ImageObject {
            imageid: Some(id.clone()),
            name: name.to_string(),
            imagetype: imagetype.to_string(),
            image: Some(STANDARD.encode(data)),
        });
        id
    }

    pub fn image_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .images
            .iter()
            .map(|i| i.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Decoded data of an image.
    pub fn image_data(&self, name: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .images
            .iter()
            .find(|i| i.name == name)
            .and_then(|i| i.image.as_deref())
            .map(|data| STANDARD.decode(data).unwrap())
    }

    /// Adds an icon map whose default icon is the image with `default_iconid`.
    pub fn add_icon_map(&self, name: &str, default_iconid: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.icon_maps.push(IconMapObject {
            iconmapid: Some(id.clone()),
            name: name.to_string(),
            default_iconid: default_iconid.to_string(),
            mappings: vec![IconMappingObject {
                iconid: default_iconid.to_string(),
                inventory_link: "1".to_string(),
                expression: "^router$".to_string(),
                sortorder: "0".to_string(),
            }],
        });
        id
    }

    pub fn icon_map_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .icon_maps
            .iter()
            .map(|m| m.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn add_user_group(&self, usrgrpid: &str, name: &str) {
        self.state.lock().unwrap().user_groups.push(UserGroup {
            usrgrpid: usrgrpid.to_string(),
            name: name.to_string(),
        });
    }

    /// Adds a top-level script running `command`.
    pub fn add_script(&self, name: &str, command: &str, usrgrpid: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.scripts.push(ScriptObject {
            scriptid: Some(id.clone()),
            name: name.to_string(),
            command: command.to_string(),
            usrgrpid: usrgrpid.to_string(),
            script_type: "0".to_string(),
            scope: "2".to_string(),
            ..Default::default()
        });
        id
    }

    pub fn script(&self, name: &str) -> Option<ScriptObject> {
        self.state
            .lock()
            .unwrap()
            .scripts
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub fn add_global_macro(&self, name: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.global_macros.push(GlobalMacroObject {
            globalmacroid: Some(id),
            name: name.to_string(),
            value: Some(value.to_string()),
            description: String::new(),
            macro_type: "0".to_string(),
        });
    }

    pub fn global_macro_value(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .global_macros
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.value.clone())
    }

    /// Makes the next `times` writes of the named object fail.
    pub fn fail_next(&self, name: &str, times: usize) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(name.to_string(), times);
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state.lock().unwrap().mutations.clear();
    }
}

fn yaml_key(key: &str) -> serde_yaml::Value {
    serde_yaml::Value::from(key)
}

fn name_list(names: &[String]) -> serde_yaml::Value {
    serde_yaml::Value::Sequence(
        names
            .iter()
            .map(|n| {
                let mut entry = Mapping::new();
                entry.insert(yaml_key("name"), yaml_key(n));
                serde_yaml::Value::Mapping(entry)
            })
            .collect(),
    )
}

/// Export document with keys in the order Zabbix writes them.
fn export_document(template: &FakeTemplate) -> String {
    let mut entry = Mapping::new();
    entry.insert(yaml_key("uuid"), yaml_key(&template.uuid));
    entry.insert(yaml_key("template"), yaml_key(&template.name));
    entry.insert(yaml_key("name"), yaml_key(&template.name));
    if !template.description.is_empty() {
        entry.insert(yaml_key("description"), yaml_key(&template.description));
    }
    if let Some((name, version)) = &template.vendor {
        let mut vendor = Mapping::new();
        vendor.insert(yaml_key("name"), yaml_key(name));
        vendor.insert(yaml_key("version"), yaml_key(version));
        entry.insert(yaml_key("vendor"), serde_yaml::Value::Mapping(vendor));
    }
    if !template.links.is_empty() {
        entry.insert(yaml_key("templates"), name_list(&template.links));
    }
    entry.insert(yaml_key("groups"), name_list(&template.groups));

    let mut export = Mapping::new();
    export.insert(yaml_key("version"), yaml_key("7.0"));
    export.insert(yaml_key("date"), yaml_key("2026-01-01T00:00:00Z"));
    export.insert(yaml_key("template_groups"), name_list(&template.groups));
    export.insert(
        yaml_key("templates"),
        serde_yaml::Value::Sequence(vec![serde_yaml::Value::Mapping(entry)]),
    );
    let mut document = Mapping::new();
    document.insert(yaml_key("zabbix_export"), serde_yaml::Value::Mapping(export));
    serde_yaml::to_string(&document).unwrap()
}

fn names(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn matches_names(name: &str, names: Option<&[String]>) -> bool {
    names.map_or(true, |n| n.iter().any(|candidate| candidate == name))
}

#[async_trait]
impl ZabbixApi for FakeZabbix {
    fn server_version(&self) -> ServerVersion {
        self.version
    }

    async fn get_template_groups(&self, root: &str) -> Result<Vec<TemplateGroupSummary>, ZabbixError> {
        let state = self.state.lock().unwrap();
        let mut groups: Vec<String> = state
            .templates
            .values()
            .flat_map(|t| t.groups.iter().cloned())
            .filter(|g| g == root || g.starts_with(&format!("{}/", root)))
            .collect();
        groups.push(root.to_string());
        groups.sort();
        groups.dedup();
        Ok(groups
            .into_iter()
            .enumerate()
            .map(|(i, name)| TemplateGroupSummary {
                groupid: (i + 1).to_string(),
                name,
            })
            .collect())
    }

    async fn get_templates(
        &self,
        _group_ids: &[String],
        names: Option<&[String]>,
    ) -> Result<Vec<TemplateSummary>, ZabbixError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .templates
            .values()
            .filter(|t| matches_names(&t.name, names))
            .map(|t| TemplateSummary {
                templateid: t.id.clone(),
                host: t.name.clone(),
            })
            .collect())
    }

    async fn export_templates(&self, template_ids: &[String]) -> Result<String, ZabbixError> {
        let mut state = self.state.lock().unwrap();
        let template = template_ids
            .first()
            .and_then(|id| state.templates.get(id))
            .cloned()
            .ok_or_else(|| ZabbixError::NotFound {
                kind: "template",
                name: template_ids.join(","),
            })?;
        state.inject("configuration.export", &template.name)?;
        Ok(export_document(&template))
    }

    async fn import_templates(&self, source: &str) -> Result<(), ZabbixError> {
        let document: Value = serde_yaml::from_str(source).map_err(|e| ZabbixError::Api {
            method: "configuration.import".to_string(),
            code: -32602,
            message: "Invalid params.".to_string(),
            data: e.to_string(),
        })?;
        let entries = document["zabbix_export"]["templates"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut state = self.state.lock().unwrap();
        for entry in entries {
            let name = entry["template"].as_str().unwrap_or_default().to_string();
            let uuid = entry["uuid"].as_str().unwrap_or_default().to_string();
            state.inject("configuration.import", &name)?;
            state.mutate(format!("import {}", name));

            let existing = state
                .templates
                .values()
                .find(|t| t.uuid == uuid)
                .map(|t| t.id.clone());
            let id = match existing {
                Some(id) => id,
                None => state.next_id(),
            };
            state.templates.insert(
                id.clone(),
                FakeTemplate {
                    id,
                    uuid,
                    name,
                    description: entry["description"].as_str().unwrap_or_default().to_string(),
                    groups: names(&entry, "groups"),
                    links: names(&entry, "templates"),
                    vendor: entry["vendor"]["name"].as_str().map(|name| {
                        (
                            name.to_string(),
                            entry["vendor"]["version"].as_str().unwrap_or_default().to_string(),
                        )
                    }),
                },
            );
        }
        Ok(())
    }

    async fn update_template_vendor(
        &self,
        template_id: &str,
        vendor_name: &str,
        vendor_version: &str,
    ) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        let name = state
            .templates
            .get(template_id)
            .map(|t| t.name.clone())
            .ok_or_else(|| ZabbixError::NotFound {
                kind: "template",
                name: template_id.to_string(),
            })?;
        state.inject("template.update", &format!("vendor {}", name))?;
        state.mutate(format!("vendor {} {}", name, vendor_name));
        if let Some(t) = state.templates.get_mut(template_id) {
            t.vendor = Some((vendor_name.to_string(), vendor_version.to_string()));
        }
        Ok(())
    }

    async fn delete_templates(&self, template_ids: &[String]) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        for id in template_ids {
            if let Some(t) = state.templates.remove(id) {
                state.mutate(format!("delete {}", t.name));
            }
        }
        Ok(())
    }

    async fn get_images(&self, names: Option<&[String]>) -> Result<Vec<ImageObject>, ZabbixError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .images
            .iter()
            .filter(|i| matches_names(&i.name, names))
            .cloned()
            .collect())
    }

    async fn create_image(&self, image: &ImageObject) -> Result<String, ZabbixError> {
        let mut state = self.state.lock().unwrap();
        state.inject("image.create", &image.name)?;
        let id = state.next_id();
        state.mutate(format!("create image {}", image.name));
        state.images.push(ImageObject {
            imageid: Some(id.clone()),
            ..image.clone()
        });
        Ok(id)
    }

    async fn update_image(&self, image: &ImageObject) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        state.inject("image.update", &image.name)?;
        state.mutate(format!("update image {}", image.name));
        if let Some(existing) = state.images.iter_mut().find(|i| i.imageid == image.imageid) {
            existing.image = image.image.clone();
        }
        Ok(())
    }

    async fn delete_images(&self, image_ids: &[String]) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        let in_use = state.icon_maps.iter().find(|m| {
            image_ids.contains(&m.default_iconid)
                || m.mappings.iter().any(|mapping| image_ids.contains(&mapping.iconid))
        });
        if let Some(map) = in_use {
            return Err(ZabbixError::Api {
                method: "image.delete".to_string(),
                code: -32500,
                message: "Application error.".to_string(),
                data: format!("The image is used in icon map \"{}\".", map.name),
            });
        }
        state.mutate(format!("delete images {}", image_ids.join(",")));
        state
            .images
            .retain(|i| !i.imageid.as_ref().is_some_and(|id| image_ids.contains(id)));
        Ok(())
    }

    async fn get_icon_maps(&self, names: Option<&[String]>) -> Result<Vec<IconMapObject>, ZabbixError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .icon_maps
            .iter()
            .filter(|m| matches_names(&m.name, names))
            .cloned()
            .collect())
    }

    async fn create_icon_map(&self, icon_map: &IconMapObject) -> Result<String, ZabbixError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.mutate(format!("create icon map {}", icon_map.name));
        state.icon_maps.push(IconMapObject {
            iconmapid: Some(id.clone()),
            ..icon_map.clone()
        });
        Ok(id)
    }

    async fn update_icon_map(&self, icon_map: &IconMapObject) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        state.mutate(format!("update icon map {}", icon_map.name));
        if let Some(existing) = state
            .icon_maps
            .iter_mut()
            .find(|m| m.iconmapid == icon_map.iconmapid)
        {
            *existing = icon_map.clone();
        }
        Ok(())
    }

    async fn delete_icon_maps(&self, icon_map_ids: &[String]) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        state.mutate(format!("delete icon maps {}", icon_map_ids.join(",")));
        state
            .icon_maps
            .retain(|m| !m.iconmapid.as_ref().is_some_and(|id| icon_map_ids.contains(id)));
        Ok(())
    }

    async fn get_scripts(&self, names: Option<&[String]>) -> Result<Vec<ScriptObject>, ZabbixError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .scripts
            .iter()
            .filter(|s| matches_names(&s.name, names))
            .cloned()
            .collect())
    }

    async fn create_script(&self, script: &ScriptObject) -> Result<String, ZabbixError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.mutate(format!("create script {}", script.name));
        state.scripts.push(ScriptObject {
            scriptid: Some(id.clone()),
            ..script.clone()
        });
        Ok(id)
    }

    async fn update_script(&self, script: &ScriptObject) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        state.mutate(format!("update script {}", script.name));
        if let Some(existing) = state.scripts.iter_mut().find(|s| s.scriptid == script.scriptid) {
            *existing = script.clone();
        }
        Ok(())
    }

    async fn delete_scripts(&self, script_ids: &[String]) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        state.mutate(format!("delete scripts {}", script_ids.join(",")));
        state
            .scripts
            .retain(|s| !s.scriptid.as_ref().is_some_and(|id| script_ids.contains(id)));
        Ok(())
    }

    async fn get_user_groups(&self) -> Result<Vec<UserGroup>, ZabbixError> {
        Ok(self.state.lock().unwrap().user_groups.clone())
    }

    async fn get_global_macros(
        &self,
        names: Option<&[String]>,
    ) -> Result<Vec<GlobalMacroObject>, ZabbixError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .global_macros
            .iter()
            .filter(|m| matches_names(&m.name, names))
            .cloned()
            .collect())
    }

    async fn create_global_macro(&self, global_macro: &GlobalMacroObject) -> Result<String, ZabbixError> {
        let mut state = self.state.lock().unwrap();
        state.inject("usermacro.createglobal", &global_macro.name)?;
        let id = state.next_id();
        state.mutate(format!("create macro {}", global_macro.name));
        state.global_macros.push(GlobalMacroObject {
            globalmacroid: Some(id.clone()),
            ..global_macro.clone()
        });
        Ok(id)
    }

    async fn update_global_macro(&self, global_macro: &GlobalMacroObject) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        state.inject("usermacro.updateglobal", &global_macro.name)?;
        state.mutate(format!("update macro {}", global_macro.name));
        if let Some(existing) = state
            .global_macros
            .iter_mut()
            .find(|m| m.globalmacroid == global_macro.globalmacroid)
        {
            existing.value = global_macro.value.clone();
            existing.description = global_macro.description.clone();
        }
        Ok(())
    }

    async fn delete_global_macros(&self, global_macro_ids: &[String]) -> Result<(), ZabbixError> {
        let mut state = self.state.lock().unwrap();
        state.mutate(format!("delete macros {}", global_macro_ids.join(",")));
        state.global_macros.retain(|m| {
            !m.globalmacroid
                .as_ref()
                .is_some_and(|id| global_macro_ids.contains(id))
        });
        Ok(())
    }
}

/// Runs git in `dir` and returns stdout, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .env("LC_ALL", "C")
        .args(["-c", "user.name=Developer", "-c", "user.email=dev@example.com"])
        .args(args)
        .output()
        .expect("git is installed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A temporary directory holding a bare remote, the cache and developer
/// checkouts.
pub struct Workspace {
    pub dir: TempDir,
    pub remote: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote.git");
        git(dir.path(), &["init", "--bare", "--quiet", remote.to_str().unwrap()]);
        Self { dir, remote }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn settings(&self) -> Settings {
        Settings {
            remote: Some(self.remote.display().to_string()),
            cache_path: self.cache_path(),
            ..Default::default()
        }
    }

    /// Fresh clone of `branch`, as a developer editing the desired state.
    pub fn checkout(&self, branch: &str) -> PathBuf {
        let path = self.dir.path().join("developer");
        if path.exists() {
            std::fs::remove_dir_all(&path).unwrap();
        }
        git(
            self.dir.path(),
            &[
                "clone",
                "--quiet",
                "--branch",
                branch,
                self.remote.to_str().unwrap(),
                path.to_str().unwrap(),
            ],
        );
        path
    }

    /// Commits everything in a developer checkout and pushes it.
    pub fn publish(&self, checkout: &Path, message: &str) {
        git(checkout, &["add", "--all"]);
        git(checkout, &["commit", "--quiet", "-m", message]);
        git(checkout, &["push", "--quiet", "origin", "HEAD"]);
    }

    /// Number of commits on a remote branch.
    pub fn remote_commit_count(&self, branch: &str) -> usize {
        git(&self.remote, &["rev-list", "--count", branch])
            .trim()
            .parse()
            .unwrap()
    }

    /// Porcelain status of the cache working tree.
    pub fn cache_status(&self) -> String {
        git(&self.cache_path(), &["status", "--porcelain"])
    }
}
