//! Runtime settings.

use std::path::PathBuf;

use crate::assets::AssetKind;
use crate::error::ConfigError;

/// A raw setting value before it is parsed into its field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Single value, lists given this way are comma separated.
    Scalar(String),
    List(Vec<String>),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Scalar(value.to_string())
    }
}

/// Settings for one run, constructed once and passed by reference.
#[derive(Debug, Clone)]
pub struct Settings {
    pub zabbix_url: String,
    pub zabbix_user: Option<String>,
    pub zabbix_password: Option<String>,
    pub zabbix_password_file: Option<String>,
    pub zabbix_token: Option<String>,
    pub zabbix_token_file: Option<String>,
    pub insecure_ssl_verify: bool,
    pub ca_bundle: Option<PathBuf>,

    pub remote: Option<String>,
    pub pull_branch: String,
    pub push_branch: String,
    pub git_username: String,
    pub git_password: Option<String>,
    pub git_password_file: Option<String>,
    pub git_privkey: Option<String>,
    pub git_author_name: String,
    pub git_author_email: String,
    pub git_commit_message: Option<String>,
    pub create_rollback_branch: bool,
    pub push_rollback_branch: bool,

    pub cache_path: PathBuf,
    pub template_prefix_path: String,
    pub image_prefix_path: String,
    pub icon_map_prefix_path: String,
    pub script_prefix_path: String,
    pub global_macro_prefix_path: String,

    pub root_template_group: String,
    pub sync_templates: bool,
    pub sync_icons: bool,
    pub sync_backgrounds: bool,
    pub sync_icon_maps: bool,
    pub sync_scripts: bool,
    pub sync_global_macros: bool,

    pub template_whitelist: Vec<String>,
    pub template_blacklist: Vec<String>,
    pub image_whitelist: Vec<String>,
    pub image_blacklist: Vec<String>,
    pub icon_map_whitelist: Vec<String>,
    pub icon_map_blacklist: Vec<String>,
    pub script_whitelist: Vec<String>,
    pub script_blacklist: Vec<String>,
    pub global_macro_whitelist: Vec<String>,
    pub global_macro_blacklist: Vec<String>,
    pub regex_matching: bool,

    pub batch_size: usize,
    pub ignore_template_version: bool,
    pub vendor: Option<String>,
    pub set_version: bool,
    pub script_default_usrgrp: String,
    pub script_without_usrgrp: bool,
    pub icon_sizes: Vec<u32>,
    pub background_sizes: Vec<u32>,

    pub dry_run: bool,
    pub verbose: bool,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zabbix_url: "http://localhost:8080".to_string(),
            zabbix_user: None,
            zabbix_password: None,
            zabbix_password_file: None,
            zabbix_token: None,
            zabbix_token_file: None,
            insecure_ssl_verify: false,
            ca_bundle: None,

            remote: None,
            pull_branch: "main".to_string(),
            push_branch: "main".to_string(),
            git_username: "git".to_string(),
            git_password: None,
            git_password_file: None,
            git_privkey: None,
            git_author_name: "Zabbix CI".to_string(),
            git_author_email: "zabbixci@localhost".to_string(),
            git_commit_message: None,
            create_rollback_branch: false,
            push_rollback_branch: false,

            cache_path: PathBuf::from("./cache"),
            template_prefix_path: "templates".to_string(),
            image_prefix_path: "images".to_string(),
            icon_map_prefix_path: "icon-maps".to_string(),
            script_prefix_path: "scripts".to_string(),
            global_macro_prefix_path: "global-macros".to_string(),

            root_template_group: "Templates".to_string(),
            sync_templates: true,
            sync_icons: false,
            sync_backgrounds: false,
            sync_icon_maps: false,
            sync_scripts: false,
            sync_global_macros: false,

            template_whitelist: Vec::new(),
            template_blacklist: Vec::new(),
            image_whitelist: Vec::new(),
            image_blacklist: Vec::new(),
            icon_map_whitelist: Vec::new(),
            icon_map_blacklist: Vec::new(),
            script_whitelist: Vec::new(),
            script_blacklist: Vec::new(),
            global_macro_whitelist: Vec::new(),
            global_macro_blacklist: Vec::new(),
            regex_matching: false,

            batch_size: 50,
            ignore_template_version: false,
            vendor: None,
            set_version: false,
            script_default_usrgrp: "Zabbix administrators".to_string(),
            script_without_usrgrp: false,
            icon_sizes: vec![24, 48, 64, 128],
            background_sizes: vec![480, 720, 1080],

            dry_run: false,
            verbose: false,
            debug: false,
        }
    }
}

impl Settings {
    /// Every key accepted by [`Settings::set`], in lowercase.
    pub const KEYS: &'static [&'static str] = &[
        "zabbix_url",
        "zabbix_user",
        "zabbix_password",
        "zabbix_password_file",
        "zabbix_token",
        "zabbix_token_file",
        "insecure_ssl_verify",
        "ca_bundle",
        "remote",
        "pull_branch",
        "push_branch",
        "git_username",
        "git_password",
        "git_password_file",
        "git_privkey",
        "git_author_name",
        "git_author_email",
        "git_commit_message",
        "create_rollback_branch",
        "push_rollback_branch",
        "cache_path",
        "template_prefix_path",
        "image_prefix_path",
        "icon_map_prefix_path",
        "script_prefix_path",
        "global_macro_prefix_path",
        "root_template_group",
        "sync_templates",
        "sync_icons",
        "sync_backgrounds",
        "sync_icon_maps",
        "sync_scripts",
        "sync_global_macros",
        "template_whitelist",
        "template_blacklist",
        "image_whitelist",
        "image_blacklist",
        "icon_map_whitelist",
        "icon_map_blacklist",
        "script_whitelist",
        "script_blacklist",
        "global_macro_whitelist",
        "global_macro_blacklist",
        "regex_matching",
        "batch_size",
        "ignore_template_version",
        "vendor",
        "set_version",
        "script_default_usrgrp",
        "script_without_usrgrp",
        "icon_sizes",
        "background_sizes",
        "dry_run",
        "verbose",
        "debug",
    ];

    /// Applies one setting by key.
    pub fn set(&mut self, key: &str, value: RawValue) -> Result<(), ConfigError> {
        let key = key.to_ascii_lowercase();
        match key.as_str() {
            "zabbix_url" => self.zabbix_url = scalar(&key, value)?,
            "zabbix_user" => self.zabbix_user = optional(&key, value)?,
            "zabbix_password" => self.zabbix_password = optional(&key, value)?,
            "zabbix_password_file" => self.zabbix_password_file = optional(&key, value)?,
            "zabbix_token" => self.zabbix_token = optional(&key, value)?,
            "zabbix_token_file" => self.zabbix_token_file = optional(&key, value)?,
            "insecure_ssl_verify" => self.insecure_ssl_verify = boolean(&key, value)?,
            "ca_bundle" => self.ca_bundle = optional(&key, value)?.map(PathBuf::from),
            "remote" => self.remote = optional(&key, value)?,
            "pull_branch" => self.pull_branch = scalar(&key, value)?,
            "push_branch" => self.push_branch = scalar(&key, value)?,
            "git_username" => self.git_username = scalar(&key, value)?,
            "git_password" => self.git_password = optional(&key, value)?,
            "git_password_file" => self.git_password_file = optional(&key, value)?,
            "git_privkey" => self.git_privkey = optional(&key, value)?,
            "git_author_name" => self.git_author_name = scalar(&key, value)?,
            "git_author_email" => self.git_author_email = scalar(&key, value)?,
            "git_commit_message" => self.git_commit_message = optional(&key, value)?,
            "create_rollback_branch" => self.create_rollback_branch = boolean(&key, value)?,
            "push_rollback_branch" => self.push_rollback_branch = boolean(&key, value)?,
            "cache_path" => self.cache_path = PathBuf::from(scalar(&key, value)?),
            "template_prefix_path" => self.template_prefix_path = prefix(&key, value)?,
            "image_prefix_path" => self.image_prefix_path = prefix(&key, value)?,
            "icon_map_prefix_path" => self.icon_map_prefix_path = prefix(&key, value)?,
            "script_prefix_path" => self.script_prefix_path = prefix(&key, value)?,
            "global_macro_prefix_path" => self.global_macro_prefix_path = prefix(&key, value)?,
            "root_template_group" => self.root_template_group = scalar(&key, value)?,
            "sync_templates" => self.sync_templates = boolean(&key, value)?,
            "sync_icons" => self.sync_icons = boolean(&key, value)?,
            "sync_backgrounds" => self.sync_backgrounds = boolean(&key, value)?,
            "sync_icon_maps" => self.sync_icon_maps = boolean(&key, value)?,
            "sync_scripts" => self.sync_scripts = boolean(&key, value)?,
            "sync_global_macros" => self.sync_global_macros = boolean(&key, value)?,
            "template_whitelist" => self.template_whitelist = list(value),
            "template_blacklist" => self.template_blacklist = list(value),
            "image_whitelist" => self.image_whitelist = list(value),
            "image_blacklist" => self.image_blacklist = list(value),
            "icon_map_whitelist" => self.icon_map_whitelist = list(value),
            "icon_map_blacklist" => self.icon_map_blacklist = list(value),
            "script_whitelist" => self.script_whitelist = list(value),
            "script_blacklist" => self.script_blacklist = list(value),
            "global_macro_whitelist" => self.global_macro_whitelist = list(value),
            "global_macro_blacklist" => self.global_macro_blacklist = list(value),
            "regex_matching" => self.regex_matching = boolean(&key, value)?,
            "batch_size" => self.batch_size = number(&key, value)?,
            "ignore_template_version" => self.ignore_template_version = boolean(&key, value)?,
            "vendor" => self.vendor = optional(&key, value)?,
            "set_version" => self.set_version = boolean(&key, value)?,
            "script_default_usrgrp" => self.script_default_usrgrp = scalar(&key, value)?,
            "script_without_usrgrp" => self.script_without_usrgrp = boolean(&key, value)?,
            "icon_sizes" => self.icon_sizes = sizes(&key, value)?,
            "background_sizes" => self.background_sizes = sizes(&key, value)?,
            "dry_run" => self.dry_run = boolean(&key, value)?,
            "verbose" => self.verbose = boolean(&key, value)?,
            "debug" => self.debug = boolean(&key, value)?,
            _ => return Err(ConfigError::UnknownKey(key)),
        }
        Ok(())
    }

    /// Checks settings that every command relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.zabbix_url.trim().is_empty() {
            return Err(ConfigError::Missing("zabbix_url"));
        }
        if self.cache_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing("cache_path"));
        }
        Ok(())
    }

    /// Remote URL, required for anything that touches git.
    pub fn require_remote(&self) -> Result<&str, ConfigError> {
        self.remote
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or(ConfigError::Missing("remote"))
    }

    /// Whether the handler for `kind` takes part in this run.
    pub fn is_enabled(&self, kind: AssetKind) -> bool {
        match kind {
            AssetKind::Template => self.sync_templates,
            AssetKind::Image => self.sync_icons || self.sync_backgrounds,
            AssetKind::IconMap => self.sync_icon_maps,
            AssetKind::Script => self.sync_scripts,
            AssetKind::GlobalMacro => self.sync_global_macros,
        }
    }

    /// Cache subdirectory owned by `kind`.
    pub fn prefix_path(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Template => &self.template_prefix_path,
            AssetKind::Image => &self.image_prefix_path,
            AssetKind::IconMap => &self.icon_map_prefix_path,
            AssetKind::Script => &self.script_prefix_path,
            AssetKind::GlobalMacro => &self.global_macro_prefix_path,
        }
    }

    /// Whitelist and blacklist configured for `kind`.
    pub fn filter_lists(&self, kind: AssetKind) -> (&[String], &[String]) {
        match kind {
            AssetKind::Template => (&self.template_whitelist, &self.template_blacklist),
            AssetKind::Image => (&self.image_whitelist, &self.image_blacklist),
            AssetKind::IconMap => (&self.icon_map_whitelist, &self.icon_map_blacklist),
            AssetKind::Script => (&self.script_whitelist, &self.script_blacklist),
            AssetKind::GlobalMacro => (&self.global_macro_whitelist, &self.global_macro_blacklist),
        }
    }
}

fn scalar(key: &str, value: RawValue) -> Result<String, ConfigError> {
    match value {
        RawValue::Scalar(s) => Ok(s),
        RawValue::List(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "expected a single value, got a list".to_string(),
        }),
    }
}

fn optional(key: &str, value: RawValue) -> Result<Option<String>, ConfigError> {
    let s = scalar(key, value)?;
    Ok(if s.is_empty() { None } else { Some(s) })
}

fn prefix(key: &str, value: RawValue) -> Result<String, ConfigError> {
    Ok(scalar(key, value)?.trim_matches('/').to_string())
}

fn boolean(key: &str, value: RawValue) -> Result<bool, ConfigError> {
    let s = scalar(key, value)?;
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Ok(true),
        "false" | "0" | "no" | "n" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}

fn number(key: &str, value: RawValue) -> Result<usize, ConfigError> {
    let s = scalar(key, value)?;
    s.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("'{}' is not a non-negative integer", s),
    })
}

fn list(value: RawValue) -> Vec<String> {
    let items = match value {
        RawValue::Scalar(s) => s.split(',').map(str::to_string).collect(),
        RawValue::List(items) => items,
    };
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn sizes(key: &str, value: RawValue) -> Result<Vec<u32>, ConfigError> {
    list(value)
        .into_iter()
        .map(|s| match s.parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("'{}' is not a positive size", s),
            }),
        })
        .collect()
}
