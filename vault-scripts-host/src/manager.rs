//! Script manager
//!
//! Ties the registry, the dispatcher and the persisted enabled set
//! together: what a host embeds to run scripts.

use crate::discovery::{ScriptStore, ScriptsDirError};
use crate::dispatcher::{EventDispatcher, HostEvent};
use crate::host::Host;
use crate::registry::{RegistryConfig, RegistryError, ScriptRegistry};
use crate::settings::{Settings, SettingsError, SettingsStore};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Scripts(#[from] ScriptsDirError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Unknown script: {0}")]
    UnknownScript(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerConfig {
    pub registry: RegistryConfig,
}

/// One row of [`ScriptManager::list_scripts`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptListing {
    pub file_name: String,
    /// Present in the persisted enabled set
    pub enabled: bool,
    /// Currently running
    pub loaded: bool,
    /// Enabled but no longer present in the scripts store
    pub missing: bool,
}

/// Outcome of [`ScriptManager::start`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct ScriptManager {
    registry: ScriptRegistry,
    dispatcher: EventDispatcher,
    settings_store: Arc<dyn SettingsStore>,
    settings: Arc<Mutex<Settings>>,
}

impl ScriptManager {
    pub fn new(
        host: Arc<dyn Host>,
        store: Arc<dyn ScriptStore>,
        settings_store: Arc<dyn SettingsStore>,
        config: ManagerConfig,
    ) -> Self {
        let registry = ScriptRegistry::new(host, store).with_config(config.registry);
        Self::with_registry(registry, settings_store)
    }

    /// Manager over an already configured registry
    pub fn with_registry(registry: ScriptRegistry, settings_store: Arc<dyn SettingsStore>) -> Self {
        let dispatcher = EventDispatcher::new(registry.host().clone(), registry.clone());
        Self {
            registry,
            dispatcher,
            settings_store,
            settings: Arc::new(Mutex::new(Settings::default())),
        }
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Snapshot of the enabled set
    pub fn settings(&self) -> Settings {
        self.settings.lock().clone()
    }

    /// Read the persisted enabled set without loading any script
    pub async fn load_settings(&self) -> Result<Settings, ManagerError> {
        let settings = self.settings_store.load().await?;
        *self.settings.lock() = settings.clone();
        Ok(settings)
    }

    /// Load the settings, prime change detection and enable every script
    /// in the enabled set, one at a time
    ///
    /// A script that fails to load is reported and skipped.
    pub async fn start(&self) -> Result<StartReport, ManagerError> {
        let settings = self.load_settings().await?;

        let primed = self.dispatcher.prime();
        tracing::debug!(files = primed, "Change detection primed");

        let mut report = StartReport::default();
        for name in settings.scripts.iter() {
            match self.registry.enable(name).await {
                Ok(()) => report.loaded.push(name.to_string()),
                Err(e) => {
                    tracing::warn!(script = %name, error = %e, "Script failed to start");
                    report.failed.push(name.to_string());
                }
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Scripts started"
        );
        Ok(report)
    }

    /// Disable every loaded script, in registration order
    pub async fn shutdown(&self) {
        for name in self.registry.loaded().await {
            if let Err(e) = self.registry.disable(&name).await {
                tracing::warn!(script = %name, error = %e, "Script failed to stop");
            }
        }
        tracing::info!("Scripts stopped");
    }

    /// Add a script to the enabled set and load it
    pub async fn enable_script(&self, name: &str) -> Result<(), ManagerError> {
        let available = self.registry.store().list().await?;
        if !available.iter().any(|n| n == name) {
            return Err(ManagerError::UnknownScript(name.to_string()));
        }

        let (added, settings) = {
            let mut settings = self.settings.lock();
            let added = settings.scripts.add(name);
            (added, settings.clone())
        };
        if added {
            self.settings_store.save(&settings).await?;
        }

        self.registry.enable(name).await?;
        Ok(())
    }

    /// Remove a script from the enabled set and unload it
    ///
    /// Succeeds if the script was either enabled or loaded.
    pub async fn disable_script(&self, name: &str) -> Result<(), ManagerError> {
        let (was_enabled, settings) = {
            let mut settings = self.settings.lock();
            let removed = settings.scripts.remove(name);
            (removed, settings.clone())
        };
        if was_enabled {
            self.settings_store.save(&settings).await?;
        }

        match self.registry.disable(name).await {
            Ok(()) => Ok(()),
            Err(RegistryError::NotLoaded(_)) if was_enabled => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every known script, sorted by file name
    pub async fn list_scripts(&self) -> Result<Vec<ScriptListing>, ManagerError> {
        let available = self.registry.store().list().await?;
        let settings = self.settings();
        let loaded = self.registry.loaded().await;

        let mut listings: Vec<ScriptListing> = available
            .iter()
            .map(|name| ScriptListing {
                file_name: name.clone(),
                enabled: settings.scripts.contains(name),
                loaded: loaded.contains(name),
                missing: false,
            })
            .collect();

        for name in settings.scripts.iter() {
            if !available.iter().any(|n| n == name) {
                listings.push(ScriptListing {
                    file_name: name.to_string(),
                    enabled: true,
                    loaded: loaded.iter().any(|n| n == name),
                    missing: true,
                });
            }
        }

        listings.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(listings)
    }

    /// Deliver a host event to the running scripts
    pub async fn handle(&self, event: &HostEvent) -> usize {
        self.dispatcher.dispatch(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::MemoryScriptStore;
    use crate::memory::MemoryHost;
    use crate::settings::MemorySettingsStore;
    use vault_scripts_api::{NodeKind, Notice};

    const NOTIFIER: &str = r#"
        local S = VaultScript:extend()
        function S:onLoad() self.vault:notify("hello") end
        function S:onFileCreated(file) self.vault:notify("saw " .. file.path) end
        return S
    "#;

    fn manager(
        host: &Arc<MemoryHost>,
        store: MemoryScriptStore,
        settings: &Arc<MemorySettingsStore>,
    ) -> ScriptManager {
        ScriptManager::new(
            host.clone(),
            Arc::new(store),
            settings.clone(),
            ManagerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_start_enables_persisted_set() {
        let host = Arc::new(MemoryHost::new());
        let settings = Arc::new(MemorySettingsStore::with_settings(Settings {
            scripts: ["a.lua", "broken.lua", "b.lua"].into_iter().collect(),
        }));
        let store = MemoryScriptStore::new()
            .with_script("a.lua", NOTIFIER)
            .with_script("b.lua", NOTIFIER)
            .with_script("broken.lua", "return nil");
        let manager = manager(&host, store, &settings);

        let report = manager.start().await.unwrap();

        assert_eq!(report.loaded, vec!["a.lua", "b.lua"]);
        assert_eq!(report.failed, vec!["broken.lua"]);
        assert_eq!(manager.registry().loaded().await, vec!["a.lua", "b.lua"]);
    }

    #[tokio::test]
    async fn test_enable_and_disable_persist() {
        let host = Arc::new(MemoryHost::new());
        let settings = Arc::new(MemorySettingsStore::new());
        let manager = manager(
            &host,
            MemoryScriptStore::new().with_script("a.lua", NOTIFIER),
            &settings,
        );
        manager.start().await.unwrap();

        manager.enable_script("a.lua").await.unwrap();
        assert!(settings.current().scripts.contains("a.lua"));
        assert!(manager.registry().is_loaded("a.lua").await);

        manager.disable_script("a.lua").await.unwrap();
        assert!(settings.current().scripts.is_empty());
        assert!(manager.registry().is_empty().await);
        assert_eq!(settings.save_count(), 2);
    }

    #[tokio::test]
    async fn test_enable_already_enabled_does_not_save() {
        let host = Arc::new(MemoryHost::new());
        let settings = Arc::new(MemorySettingsStore::with_settings(Settings {
            scripts: ["broken.lua"].into_iter().collect(),
        }));
        let manager = manager(
            &host,
            MemoryScriptStore::new().with_script("broken.lua", "return nil"),
            &settings,
        );
        manager.start().await.unwrap();

        assert!(manager.enable_script("broken.lua").await.is_err());
        assert_eq!(settings.save_count(), 0);
        assert!(settings.current().scripts.contains("broken.lua"));
    }

    #[tokio::test]
    async fn test_enable_unknown_script() {
        let host = Arc::new(MemoryHost::new());
        let settings = Arc::new(MemorySettingsStore::new());
        let manager = manager(&host, MemoryScriptStore::new(), &settings);

        let err = manager.enable_script("nope.lua").await.unwrap_err();

        assert!(matches!(err, ManagerError::UnknownScript(_)));
        assert_eq!(settings.save_count(), 0);
    }

    #[tokio::test]
    async fn test_disable_not_enabled() {
        let host = Arc::new(MemoryHost::new());
        let settings = Arc::new(MemorySettingsStore::new());
        let manager = manager(&host, MemoryScriptStore::new(), &settings);

        let err = manager.disable_script("a.lua").await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Registry(RegistryError::NotLoaded(_))
        ));
    }

    #[tokio::test]
    async fn test_disable_enabled_script_that_failed_to_load() {
        let host = Arc::new(MemoryHost::new());
        let settings = Arc::new(MemorySettingsStore::with_settings(Settings {
            scripts: ["broken.lua"].into_iter().collect(),
        }));
        let manager = manager(
            &host,
            MemoryScriptStore::new().with_script("broken.lua", "return nil"),
            &settings,
        );
        manager.start().await.unwrap();

        manager.disable_script("broken.lua").await.unwrap();
        assert!(settings.current().scripts.is_empty());
    }

    #[tokio::test]
    async fn test_list_scripts_marks_missing() {
        let host = Arc::new(MemoryHost::new());
        let settings = Arc::new(MemorySettingsStore::with_settings(Settings {
            scripts: ["gone.lua", "a.lua"].into_iter().collect(),
        }));
        let store = MemoryScriptStore::new()
            .with_script("a.lua", NOTIFIER)
            .with_script("b.lua", NOTIFIER);
        let manager = manager(&host, store, &settings);
        manager.start().await.unwrap();

        let listings = manager.list_scripts().await.unwrap();
        let rows: Vec<(&str, bool, bool, bool)> = listings
            .iter()
            .map(|l| (l.file_name.as_str(), l.enabled, l.loaded, l.missing))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("a.lua", true, true, false),
                ("b.lua", false, false, false),
                ("gone.lua", true, false, true),
            ]
        );
    }

    #[tokio::test]
    async fn test_handle_and_shutdown() {
        let host = Arc::new(MemoryHost::new());
        let settings = Arc::new(MemorySettingsStore::with_settings(Settings {
            scripts: ["a.lua"].into_iter().collect(),
        }));
        let manager = manager(
            &host,
            MemoryScriptStore::new().with_script("a.lua", NOTIFIER),
            &settings,
        );
        manager.start().await.unwrap();
        host.clear_notices();

        let called = manager
            .handle(&HostEvent::Created {
                path: "x.md".into(),
                kind: NodeKind::File,
            })
            .await;
        assert_eq!(called, 1);
        assert_eq!(host.notices(), vec![Notice::message("saw x.md")]);

        manager.shutdown().await;
        assert!(manager.registry().is_empty().await);
        assert!(settings.current().scripts.contains("a.lua"));
    }
}
