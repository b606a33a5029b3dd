//! Script registry
//!
//! Tracks which scripts are loaded, in the order they were enabled, and
//! drives their lifecycle: `Loading -> Running -> Unloading`. A script
//! that is absent from the registry is unloaded.

use crate::commands::{CommandLedger, CommandRegistrar};
use crate::discovery::ScriptStore;
use crate::facade::VaultView;
use crate::host::Host;
use crate::loader::{LoaderError, ScriptLoader, ScriptSource};
use crate::module::ScriptModule;
use crate::report::{ErrorReporter, ON_CONSTRUCT};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use vault_scripts_api::{Hook, ScriptError};

/// Errors returned by [`ScriptRegistry::enable`] and [`ScriptRegistry::disable`]
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Script already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("Script not loaded: {0}")]
    NotLoaded(String),

    #[error("Script is busy: {0}")]
    Busy(String),

    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error("Script {script} failed in onLoad: {source}")]
    OnLoad {
        script: String,
        #[source]
        source: ScriptError,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryConfig {
    /// Drop a script whose `onLoad` fails instead of keeping it registered
    pub strict_on_load: bool,
}

/// Lifecycle state of a registered script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Loading,
    Running,
    Unloading,
}

/// A loaded script together with the commands it registered
pub struct ScriptInstance {
    name: String,
    ledger: CommandLedger,
    module: Box<dyn ScriptModule>,
}

impl ScriptInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ledger(&self) -> &CommandLedger {
        &self.ledger
    }

    pub fn module(&self) -> &dyn ScriptModule {
        self.module.as_ref()
    }
}

impl fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("name", &self.name)
            .field("commands", &self.ledger.len())
            .finish()
    }
}

enum Slot {
    Loading,
    Running(Arc<ScriptInstance>),
    Unloading,
}

impl Slot {
    fn state(&self) -> ScriptState {
        match self {
            Slot::Loading => ScriptState::Loading,
            Slot::Running(_) => ScriptState::Running,
            Slot::Unloading => ScriptState::Unloading,
        }
    }
}

struct Entry {
    name: String,
    slot: Slot,
}

/// A thread-safe registry of loaded scripts
#[derive(Clone)]
pub struct ScriptRegistry {
    inner: Arc<RwLock<Vec<Entry>>>,
    host: Arc<dyn Host>,
    loader: Arc<ScriptLoader>,
    store: Arc<dyn ScriptStore>,
    registrar: CommandRegistrar,
    reporter: ErrorReporter,
    config: RegistryConfig,
}

impl ScriptRegistry {
    /// Registry reading sources from `store`, with the default loader
    pub fn new(host: Arc<dyn Host>, store: Arc<dyn ScriptStore>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
            registrar: CommandRegistrar::new(host.clone()),
            reporter: ErrorReporter::new(host.clone()),
            host,
            loader: Arc::new(ScriptLoader::new()),
            store,
            config: RegistryConfig::default(),
        }
    }

    pub fn with_loader(mut self, loader: ScriptLoader) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn loader(&self) -> &ScriptLoader {
        &self.loader
    }

    pub fn store(&self) -> &Arc<dyn ScriptStore> {
        &self.store
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Load a script and run its `onLoad` hook
    ///
    /// Load failures are reported and returned; the script is not
    /// registered. An `onLoad` failure is reported and, unless
    /// `strict_on_load` is set, leaves the script registered.
    pub async fn enable(&self, name: &str) -> Result<(), RegistryError> {
        {
            let mut inner = self.inner.write().await;
            if let Some(entry) = inner.iter().find(|e| e.name == name) {
                return Err(match entry.slot {
                    Slot::Unloading => RegistryError::Busy(name.to_string()),
                    _ => RegistryError::AlreadyLoaded(name.to_string()),
                });
            }
            // Reserving the slot now fixes the dispatch order
            inner.push(Entry {
                name: name.to_string(),
                slot: Slot::Loading,
            });
        }

        let ledger = CommandLedger::new();
        let loaded = match self.store.read(name).await {
            Ok(text) => {
                let vault = VaultView::new(self.host.clone(), name, ledger.clone());
                self.loader.load(&ScriptSource::new(name, text), vault)
            }
            Err(e) => Err(LoaderError::Read {
                script: name.to_string(),
                message: e.to_string(),
            }),
        };

        let module = match loaded {
            Ok(module) => module,
            Err(err) => {
                self.reporter.report(ON_CONSTRUCT, name, &err);
                // A constructor may have registered commands before failing
                self.registrar.remove_all_reported(name, &ledger);
                self.release(name).await;
                return Err(err.into());
            }
        };

        let instance = Arc::new(ScriptInstance {
            name: name.to_string(),
            ledger,
            module,
        });
        self.set_slot(name, Slot::Running(instance.clone())).await;
        tracing::info!(script = %name, "Script loaded");

        if let Err(err) = instance.module.on_load() {
            self.reporter.report(Hook::OnLoad.label(), name, &err);
            if self.config.strict_on_load {
                self.registrar.remove_all_reported(name, &instance.ledger);
                self.release(name).await;
                tracing::warn!(script = %name, "Script dropped after onLoad failure");
                return Err(RegistryError::OnLoad {
                    script: name.to_string(),
                    source: err,
                });
            }
        }

        Ok(())
    }

    /// Remove a script's commands, run its `onUnload` hook and drop it
    pub async fn disable(&self, name: &str) -> Result<(), RegistryError> {
        let instance = {
            let mut inner = self.inner.write().await;
            let entry = inner
                .iter_mut()
                .find(|e| e.name == name)
                .ok_or_else(|| RegistryError::NotLoaded(name.to_string()))?;
            let instance = match &entry.slot {
                Slot::Running(instance) => instance.clone(),
                _ => return Err(RegistryError::Busy(name.to_string())),
            };
            entry.slot = Slot::Unloading;
            instance
        };

        self.registrar
            .remove_all_reported(name, &instance.ledger);

        if let Err(err) = instance.module.on_unload() {
            self.reporter.report(Hook::OnUnload.label(), name, &err);
        }

        self.release(name).await;
        tracing::info!(script = %name, "Script unloaded");
        Ok(())
    }

    /// Whether the script is registered and running
    pub async fn is_loaded(&self, name: &str) -> bool {
        self.state(name).await == Some(ScriptState::Running)
    }

    pub async fn state(&self, name: &str) -> Option<ScriptState> {
        let inner = self.inner.read().await;
        inner
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.slot.state())
    }

    /// Registered script names, in registration order
    pub async fn loaded(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.iter().map(|e| e.name.clone()).collect()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<ScriptInstance>> {
        let inner = self.inner.read().await;
        inner.iter().find(|e| e.name == name).and_then(|e| match &e.slot {
            Slot::Running(instance) => Some(instance.clone()),
            _ => None,
        })
    }

    /// Snapshot of the running instances, in registration order
    pub async fn running(&self) -> Vec<Arc<ScriptInstance>> {
        let inner = self.inner.read().await;
        inner
            .iter()
            .filter_map(|e| match &e.slot {
                Slot::Running(instance) => Some(instance.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    async fn set_slot(&self, name: &str, slot: Slot) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.iter_mut().find(|e| e.name == name) {
            entry.slot = slot;
        }
    }

    async fn release(&self, name: &str) {
        self.inner.write().await.retain(|e| e.name != name);
    }
}
