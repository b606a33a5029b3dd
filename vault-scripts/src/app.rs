//! Command handlers
//!
//! Each handler opens the vault, does its work and returns the text to
//! print on stdout. Logs go to stderr through `tracing`.

use crate::cli::{Cli, Commands, RunArgs};
use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use vault_scripts_host::{
    CommandLedger, CommandRegistrar, DirectoryHost, FileSettingsStore, ManagerConfig,
    RegistryConfig, ScriptLoader, ScriptManager, ScriptSource, ScriptStore, ScriptsDirectory,
    VaultView, VaultWatcher, WatcherConfig,
};

/// A vault opened for one command invocation
pub struct Vault {
    host: Arc<DirectoryHost>,
    scripts: Arc<ScriptsDirectory>,
    settings: Arc<FileSettingsStore>,
}

impl Vault {
    pub fn open(root: &Path) -> Result<Self> {
        let host = DirectoryHost::open(root)
            .with_context(|| format!("Failed to open vault at {}", root.display()))?;
        let host = Arc::new(host);
        let scripts = Arc::new(ScriptsDirectory::new(host.scripts_dir()));
        let settings = Arc::new(FileSettingsStore::for_vault(root));
        Ok(Self {
            host,
            scripts,
            settings,
        })
    }

    pub fn host(&self) -> &Arc<DirectoryHost> {
        &self.host
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.scripts.path().to_path_buf()
    }

    pub fn manager(&self, config: ManagerConfig) -> ScriptManager {
        ScriptManager::new(
            self.host.clone(),
            self.scripts.clone(),
            self.settings.clone(),
            config,
        )
    }
}

/// Run the parsed command line
pub async fn run(cli: Cli) -> Result<String> {
    let vault = Vault::open(&cli.global.vault)?;

    match cli.command {
        Commands::Init => init(&vault).await,
        Commands::List => list(&vault).await,
        Commands::Enable { script } => enable(&vault, &script).await,
        Commands::Disable { script } => disable(&vault, &script).await,
        Commands::Check { scripts } => check(&vault, &scripts).await,
        Commands::Commands => commands(&vault).await,
        Commands::Exec { id } => exec(&vault, &id).await,
        Commands::Run(args) => watch(&vault, &args).await,
    }
}

pub async fn init(vault: &Vault) -> Result<String> {
    let created = vault
        .scripts
        .ensure()
        .await
        .context("Failed to create the scripts folder")?;
    let types = vault
        .scripts
        .install_type_definitions()
        .await
        .context("Failed to install type declarations")?;

    let mut out = String::new();
    if created {
        writeln!(out, "Created {}", vault.scripts_dir().display())?;
    }
    write!(out, "Type declarations: {}", types.display())?;
    Ok(out)
}

pub async fn list(vault: &Vault) -> Result<String> {
    let manager = vault.manager(ManagerConfig::default());
    manager.load_settings().await?;

    let listings = manager.list_scripts().await?;
    if listings.is_empty() {
        return Ok(format!("No scripts in {}", vault.scripts_dir().display()));
    }

    let lines: Vec<String> = listings
        .iter()
        .map(|l| {
            let mark = match (l.enabled, l.missing) {
                (_, true) => "!",
                (true, false) => "x",
                (false, false) => " ",
            };
            if l.missing {
                format!("[{}] {} (missing)", mark, l.file_name)
            } else {
                format!("[{}] {}", mark, l.file_name)
            }
        })
        .collect();
    Ok(lines.join("\n"))
}

pub async fn enable(vault: &Vault, script: &str) -> Result<String> {
    let manager = vault.manager(ManagerConfig::default());
    manager.load_settings().await?;

    let result = manager.enable_script(script).await;
    manager.shutdown().await;
    result.with_context(|| format!("Failed to enable {}", script))?;

    Ok(format!("Enabled {}", script))
}

pub async fn disable(vault: &Vault, script: &str) -> Result<String> {
    let manager = vault.manager(ManagerConfig::default());
    manager.load_settings().await?;

    manager
        .disable_script(script)
        .await
        .with_context(|| format!("Failed to disable {}", script))?;
    Ok(format!("Disabled {}", script))
}

/// Evaluate scripts without running any hook
///
/// Commands a constructor registers are removed again afterwards.
pub async fn check(vault: &Vault, scripts: &[String]) -> Result<String> {
    let names = if scripts.is_empty() {
        vault.scripts.list().await?
    } else {
        scripts.to_vec()
    };
    if names.is_empty() {
        return Ok(format!("No scripts in {}", vault.scripts_dir().display()));
    }

    let loader = ScriptLoader::new();
    let registrar = CommandRegistrar::new(vault.host.clone());
    let mut out = String::new();
    let mut failed = 0;

    for name in &names {
        let outcome = match vault.scripts.read(name).await {
            Ok(text) => {
                let ledger = CommandLedger::new();
                let view = VaultView::new(vault.host.clone(), name.as_str(), ledger.clone());
                let loaded = loader
                    .load(&ScriptSource::new(name.as_str(), text), view)
                    .map(|_module| ledger.len())
                    .map_err(|e| e.to_string());
                if let Err(e) = registrar.remove_all(&ledger) {
                    tracing::warn!(script = %name, error = %e, "Failed to remove commands");
                }
                loaded
            }
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(commands) => writeln!(out, "ok     {} ({} commands)", name, commands)?,
            Err(e) => {
                failed += 1;
                writeln!(out, "error  {}: {}", name, e)?;
            }
        }
    }

    let out = out.trim_end().to_string();
    if failed > 0 {
        bail!("{}\n{} of {} scripts failed", out, failed, names.len());
    }
    Ok(out)
}

pub async fn commands(vault: &Vault) -> Result<String> {
    let manager = vault.manager(ManagerConfig::default());
    manager.start().await?;

    let mut listed = vault.host.commands().list();
    listed.sort_by(|a, b| a.id.cmp(&b.id));
    manager.shutdown().await;

    if listed.is_empty() {
        return Ok("No commands registered".to_string());
    }
    let lines: Vec<String> = listed
        .iter()
        .map(|c| format!("{}\t{}", c.id, c.name))
        .collect();
    Ok(lines.join("\n"))
}

pub async fn exec(vault: &Vault, id: &str) -> Result<String> {
    let manager = vault.manager(ManagerConfig::default());
    manager.start().await?;
    vault.host.take_notices();

    let ran = vault.host.commands().execute(id);
    let notices = vault.host.take_notices();
    manager.shutdown().await;

    let ran = ran.with_context(|| format!("Command {} failed", id))?;
    let mut lines: Vec<String> = notices.iter().map(ToString::to_string).collect();
    if ran {
        lines.push(format!("Ran {}", id));
    } else {
        lines.push(format!("{} is not available right now", id));
    }
    Ok(lines.join("\n"))
}

/// Load the enabled scripts and dispatch vault changes until Ctrl-C
pub async fn watch(vault: &Vault, args: &RunArgs) -> Result<String> {
    let config = ManagerConfig {
        registry: RegistryConfig {
            strict_on_load: args.strict_on_load,
        },
    };
    let manager = vault.manager(config);
    let report = manager.start().await?;
    tracing::info!(
        loaded = ?report.loaded,
        failed = ?report.failed,
        "Watching {}",
        vault.host.root().display()
    );

    let watcher = VaultWatcher::start(
        vault.host.clone(),
        manager.clone(),
        WatcherConfig {
            debounce: Duration::from_millis(args.debounce_ms),
        },
    )
    .context("Failed to watch the vault")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Interrupted, shutting down");

    watcher.shutdown().await;
    manager.shutdown().await;
    Ok(format!(
        "Stopped after running {} script(s)",
        report.loaded.len()
    ))
}
