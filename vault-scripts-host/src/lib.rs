//! vault-scripts-host: script runtime for vault-scripts
//!
//! This crate loads user scripts into sandboxed Luau states, keeps the
//! registry of enabled scripts, dispatches vault events to their hooks and
//! exposes the vault to them through a small object facade.

pub mod change;
pub mod commands;
pub mod directory;
pub mod discovery;
pub mod dispatcher;
pub mod facade;
pub mod frontmatter;
pub mod host;
pub mod loader;
pub mod lua;
pub mod manager;
pub mod memory;
pub mod module;
pub mod paths;
pub mod registry;
pub mod report;
pub mod settings;
pub mod watcher;

pub use change::{rolling_hash, FrontmatterHashes};
pub use commands::{Command, CommandAction, CommandLedger, CommandRegistrar, CommandTable};
pub use directory::DirectoryHost;
pub use discovery::{MemoryScriptStore, ScriptStore, ScriptsDirError, ScriptsDirectory};
pub use dispatcher::{metadata_changed_event, EventDispatcher, HostEvent};
pub use facade::{FacadeError, FileView, FolderView, FrontmatterView, VaultView};
pub use host::{CachedMetadata, Host, HostError, HostResult, IconProvider, ROOT_PATH};
pub use loader::{LoaderError, ScriptEvaluator, ScriptLoader, ScriptSource};
pub use lua::LuaEvaluator;
pub use manager::{ManagerConfig, ManagerError, ScriptListing, ScriptManager, StartReport};
pub use memory::MemoryHost;
pub use module::{HookResult, ScriptModule};
pub use registry::{RegistryConfig, RegistryError, ScriptRegistry, ScriptState};
pub use settings::{FileSettingsStore, MemorySettingsStore, Settings, SettingsStore};
pub use watcher::{VaultWatcher, WatcherConfig, WatcherError};
pub use vault_scripts_api::{Hook, Notice, ScriptError};
