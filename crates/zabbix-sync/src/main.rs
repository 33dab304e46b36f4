use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use zabbix_sync::cache::cleanup;
use zabbix_sync::config::{load_settings, RawValue, Settings};
use zabbix_sync::logging::{self, ErrorCounter};
use zabbix_sync::reconciler::{self, Reconciler};
use zabbix_sync::sanitize::redact_repo_url;
use zabbix_sync::zabbix::{fetch_server_version, ZabbixClient};
use zabbix_sync::{ImageType, Result, SyncError};

#[derive(Parser, Debug)]
#[command(name = "zabbix-sync", version, about = "Synchronize Zabbix configuration with a git repository")]
struct Cli {
    /// YAML config file, applied after the environment.
    #[arg(short, long, global = true, env = "ZABBIX_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Export Zabbix to the push branch
    Push,
    /// Apply the pull branch to Zabbix
    Pull,
    /// Delete the local cache repository
    ClearCache,
    /// Print the tool and Zabbix API versions
    Version,
    /// Render sized icons from source-icons and commit them
    GenerateIcons,
    /// Render sized backgrounds from source-backgrounds and commit them
    GenerateBackgrounds,
}

/// Settings given on the command line. They win over every other source.
#[derive(Args, Debug, Default)]
struct Overrides {
    #[arg(long, global = true)]
    zabbix_url: Option<String>,
    #[arg(long, global = true)]
    zabbix_user: Option<String>,
    #[arg(long, global = true)]
    zabbix_password: Option<String>,
    #[arg(long, global = true)]
    zabbix_token: Option<String>,
    #[arg(long, global = true)]
    remote: Option<String>,
    #[arg(long, global = true)]
    pull_branch: Option<String>,
    #[arg(long, global = true)]
    push_branch: Option<String>,
    #[arg(long, global = true)]
    git_username: Option<String>,
    #[arg(long, global = true)]
    git_password: Option<String>,
    #[arg(long, global = true)]
    git_privkey: Option<String>,
    #[arg(long = "cache", global = true)]
    cache_path: Option<String>,
    #[arg(long, global = true)]
    root_template_group: Option<String>,
    #[arg(long, global = true)]
    batch_size: Option<usize>,
    #[arg(long, global = true)]
    vendor: Option<String>,

    /// Comma separated template names
    #[arg(long, global = true)]
    template_whitelist: Option<String>,
    #[arg(long, global = true)]
    template_blacklist: Option<String>,
    #[arg(long, global = true)]
    image_whitelist: Option<String>,
    #[arg(long, global = true)]
    image_blacklist: Option<String>,
    #[arg(long, global = true)]
    icon_map_whitelist: Option<String>,
    #[arg(long, global = true)]
    icon_map_blacklist: Option<String>,
    #[arg(long, global = true)]
    script_whitelist: Option<String>,
    #[arg(long, global = true)]
    script_blacklist: Option<String>,
    #[arg(long, global = true)]
    global_macro_whitelist: Option<String>,
    #[arg(long, global = true)]
    global_macro_blacklist: Option<String>,

    #[arg(long, global = true, value_name = "BOOL")]
    sync_templates: Option<bool>,
    #[arg(long, global = true, value_name = "BOOL")]
    sync_icons: Option<bool>,
    #[arg(long, global = true, value_name = "BOOL")]
    sync_backgrounds: Option<bool>,
    #[arg(long, global = true, value_name = "BOOL")]
    sync_icon_maps: Option<bool>,
    #[arg(long, global = true, value_name = "BOOL")]
    sync_scripts: Option<bool>,
    #[arg(long, global = true, value_name = "BOOL")]
    sync_global_macros: Option<bool>,

    /// Treat whitelist and blacklist entries as regular expressions
    #[arg(long, global = true)]
    regex_matching: bool,
    #[arg(long, global = true)]
    ignore_template_version: bool,
    #[arg(long, global = true)]
    set_version: bool,
    #[arg(long, global = true)]
    create_rollback_branch: bool,
    #[arg(long, global = true)]
    push_rollback_branch: bool,
    /// Skip TLS certificate verification for Zabbix and git
    #[arg(long, global = true)]
    insecure_ssl_verify: bool,
    /// Log what would change without touching Zabbix or the remote
    #[arg(long, global = true)]
    dry_run: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[arg(long, global = true)]
    debug: bool,
}

impl Overrides {
    /// Setting keys and values given on the command line.
    fn entries(&self) -> Vec<(&'static str, RawValue)> {
        let mut entries = Vec::new();
        let mut text = |key: &'static str, value: &Option<String>| {
            if let Some(value) = value {
                entries.push((key, RawValue::Scalar(value.clone())));
            }
        };
        text("zabbix_url", &self.zabbix_url);
        text("zabbix_user", &self.zabbix_user);
        text("zabbix_password", &self.zabbix_password);
        text("zabbix_token", &self.zabbix_token);
        text("remote", &self.remote);
        text("pull_branch", &self.pull_branch);
        text("push_branch", &self.push_branch);
        text("git_username", &self.git_username);
        text("git_password", &self.git_password);
        text("git_privkey", &self.git_privkey);
        text("cache_path", &self.cache_path);
        text("root_template_group", &self.root_template_group);
        text("vendor", &self.vendor);
        text("template_whitelist", &self.template_whitelist);
        text("template_blacklist", &self.template_blacklist);
        text("image_whitelist", &self.image_whitelist);
        text("image_blacklist", &self.image_blacklist);
        text("icon_map_whitelist", &self.icon_map_whitelist);
        text("icon_map_blacklist", &self.icon_map_blacklist);
        text("script_whitelist", &self.script_whitelist);
        text("script_blacklist", &self.script_blacklist);
        text("global_macro_whitelist", &self.global_macro_whitelist);
        text("global_macro_blacklist", &self.global_macro_blacklist);

        if let Some(size) = self.batch_size {
            entries.push(("batch_size", RawValue::Scalar(size.to_string())));
        }

        let toggles = [
            ("sync_templates", self.sync_templates),
            ("sync_icons", self.sync_icons),
            ("sync_backgrounds", self.sync_backgrounds),
            ("sync_icon_maps", self.sync_icon_maps),
            ("sync_scripts", self.sync_scripts),
            ("sync_global_macros", self.sync_global_macros),
        ];
        for (key, value) in toggles {
            if let Some(value) = value {
                entries.push((key, RawValue::Scalar(value.to_string())));
            }
        }

        // presence flags only ever switch a setting on
        let flags = [
            ("regex_matching", self.regex_matching),
            ("ignore_template_version", self.ignore_template_version),
            ("set_version", self.set_version),
            ("create_rollback_branch", self.create_rollback_branch),
            ("push_rollback_branch", self.push_rollback_branch),
            ("insecure_ssl_verify", self.insecure_ssl_verify),
            ("dry_run", self.dry_run),
            ("verbose", self.verbose),
            ("debug", self.debug),
        ];
        for (key, set) in flags {
            if set {
                entries.push((key, RawValue::Scalar("true".to_string())));
            }
        }
        entries
    }
}

fn build_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = load_settings(cli.config.as_deref())?;
    for (key, value) in cli.overrides.entries() {
        settings.set(key, value)?;
    }
    Ok(settings)
}

async fn version(settings: &Settings) {
    println!("zabbix-sync {}", env!("CARGO_PKG_VERSION"));
    match fetch_server_version(settings).await {
        Ok(server) => println!("Zabbix API {}", server),
        Err(e) => log::warn!("Zabbix at {} is not reachable: {}", settings.zabbix_url, e),
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Push,
    Pull,
}

async fn sync(settings: &Settings, direction: Direction) -> Result<()> {
    settings.validate()?;
    let remote = settings.require_remote()?;
    log::info!("Using repository {}", redact_repo_url(remote));

    let client = ZabbixClient::connect(settings).await?;
    let outcome = sync_with_client(settings, &client, direction).await;
    if let Err(e) = client.logout().await {
        log::warn!("Failed to log out of Zabbix: {}", e);
    }
    outcome
}

async fn sync_with_client(
    settings: &Settings,
    client: &ZabbixClient,
    direction: Direction,
) -> Result<()> {
    let reconciler = Reconciler::new(settings, client)?;
    match direction {
        Direction::Push => {
            let report = reconciler.push().await?;
            if report.is_noop() {
                log::info!("Push finished, nothing changed");
            } else {
                log::info!("Push finished, {} file(s) changed", report.changed_files.len());
            }
        }
        Direction::Pull => {
            let report = reconciler.pull().await?;
            if !report.changed() && report.failed.is_empty() {
                log::info!("Pull finished, Zabbix already up to date");
            }
        }
    }
    Ok(())
}

fn clear_cache(settings: &Settings) -> Result<()> {
    if cleanup::clear_all(&settings.cache_path)? {
        log::info!("Removed cache {}", settings.cache_path.display());
    } else {
        log::info!("No cache at {}", settings.cache_path.display());
    }
    Ok(())
}

fn generate(settings: &Settings, image_type: ImageType) -> Result<()> {
    settings.require_remote()?;
    let report = reconciler::generate(settings, image_type)?;
    log::info!(
        "Generated {} {} image(s){}",
        report.created.len(),
        image_type.dir_name(),
        report
            .commit
            .as_deref()
            .map(|c| format!(", committed as {}", c))
            .unwrap_or_default()
    );
    Ok(())
}

async fn run(settings: &Settings, command: Command) -> Result<()> {
    match command {
        Command::Push => sync(settings, Direction::Push).await,
        Command::Pull => sync(settings, Direction::Pull).await,
        Command::ClearCache => clear_cache(settings),
        Command::Version => {
            version(settings).await;
            Ok(())
        }
        Command::GenerateIcons => generate(settings, ImageType::Icon),
        Command::GenerateBackgrounds => generate(settings, ImageType::Background),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match build_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    let errors = match logging::init(settings.verbose, settings.debug) {
        Ok(counter) => counter,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            ErrorCounter::new()
        }
    };

    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("{}", SyncError::Interrupted);
        std::process::exit(SyncError::Interrupted.exit_code());
    }) {
        log::warn!("Failed to install Ctrl-C handler: {}", e);
    }

    if settings.dry_run {
        log::info!("Dry run, Zabbix and the remote stay untouched");
    }

    match run(&settings, cli.command).await {
        Ok(()) if errors.error_count() > 0 => {
            log::warn!("Finished with {} error(s)", errors.error_count());
            ExitCode::from(1)
        }
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
