//! Event dispatch
//!
//! Translates host events into hook calls on every running script, in
//! registration order. A failing hook is reported and never stops the
//! remaining scripts.

use crate::change::FrontmatterHashes;
use crate::facade::{FileView, FolderView, FrontmatterView};
use crate::host::{CachedMetadata, Host};
use crate::module::{HookResult, ScriptModule};
use crate::registry::ScriptRegistry;
use crate::report::ErrorReporter;
use std::sync::Arc;
use vault_scripts_api::{Hook, NodeKind};

/// A change in the host, as delivered to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Created {
        path: String,
        kind: NodeKind,
    },
    Modified {
        path: String,
    },
    Deleted {
        path: String,
        kind: NodeKind,
    },
    Renamed {
        path: String,
        old_path: String,
        kind: NodeKind,
    },
    /// The active file changed; `None` when no file is open
    FileOpened {
        path: Option<String>,
    },
    /// The host re-indexed a file
    MetadataChanged {
        path: String,
        data: String,
        cache: CachedMetadata,
    },
}

impl HostEvent {
    pub fn path(&self) -> Option<&str> {
        match self {
            HostEvent::Created { path, .. }
            | HostEvent::Modified { path }
            | HostEvent::Deleted { path, .. }
            | HostEvent::Renamed { path, .. }
            | HostEvent::MetadataChanged { path, .. } => Some(path),
            HostEvent::FileOpened { path } => path.as_deref(),
        }
    }
}

/// Build a [`HostEvent::MetadataChanged`] from the host's current state of `path`
pub fn metadata_changed_event(host: &dyn Host, path: &str) -> Option<HostEvent> {
    let cache = host.metadata(path)?;
    let data = host.read(path).ok()?;
    Some(HostEvent::MetadataChanged {
        path: path.to_string(),
        data,
        cache,
    })
}

/// Views for one event, built once and shared by every script
enum HookCall {
    FileCreated(FileView),
    FileModified(FileView),
    FileDeleted(FileView),
    FileRenamed(FileView, String),
    FileOpened(Option<FileView>),
    FolderCreated(FolderView),
    FolderDeleted(FolderView),
    FolderRenamed(FolderView, String),
    FrontmatterModified(FileView, FrontmatterView),
}

impl HookCall {
    fn hook(&self) -> Hook {
        match self {
            HookCall::FileCreated(_) => Hook::OnFileCreated,
            HookCall::FileModified(_) => Hook::OnFileModified,
            HookCall::FileDeleted(_) => Hook::OnFileDeleted,
            HookCall::FileRenamed(..) => Hook::OnFileRenamed,
            HookCall::FileOpened(_) => Hook::OnFileOpened,
            HookCall::FolderCreated(_) => Hook::OnFolderCreated,
            HookCall::FolderDeleted(_) => Hook::OnFolderDeleted,
            HookCall::FolderRenamed(..) => Hook::OnFolderRenamed,
            HookCall::FrontmatterModified(..) => Hook::OnFrontmatterModified,
        }
    }

    fn invoke(&self, module: &dyn ScriptModule) -> HookResult {
        match self {
            HookCall::FileCreated(file) => module.on_file_created(file),
            HookCall::FileModified(file) => module.on_file_modified(file),
            HookCall::FileDeleted(file) => module.on_file_deleted(file),
            HookCall::FileRenamed(file, old) => module.on_file_renamed(file, old),
            HookCall::FileOpened(file) => module.on_file_opened(file.as_ref()),
            HookCall::FolderCreated(folder) => module.on_folder_created(folder),
            HookCall::FolderDeleted(folder) => module.on_folder_deleted(folder),
            HookCall::FolderRenamed(folder, old) => module.on_folder_renamed(folder, old),
            HookCall::FrontmatterModified(file, fm) => module.on_frontmatter_modified(file, fm),
        }
    }
}

/// Fans host events out to the running scripts
#[derive(Clone)]
pub struct EventDispatcher {
    host: Arc<dyn Host>,
    registry: ScriptRegistry,
    hashes: Arc<FrontmatterHashes>,
    reporter: ErrorReporter,
}

impl EventDispatcher {
    pub fn new(host: Arc<dyn Host>, registry: ScriptRegistry) -> Self {
        Self {
            reporter: ErrorReporter::new(host.clone()),
            host,
            registry,
            hashes: Arc::new(FrontmatterHashes::new()),
        }
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn hashes(&self) -> &FrontmatterHashes {
        &self.hashes
    }

    /// Record the current front-matter of every file so unchanged files
    /// do not fire on their first metadata event
    pub fn prime(&self) -> usize {
        self.hashes.prime(self.host.as_ref())
    }

    /// Deliver `event` to every running script
    ///
    /// Returns the number of scripts whose hook was called.
    pub async fn dispatch(&self, event: &HostEvent) -> usize {
        let Some(call) = self.hook_call(event) else {
            return 0;
        };
        let hook = call.hook();

        let instances = self.registry.running().await;
        for instance in &instances {
            if let Err(err) = call.invoke(instance.module()) {
                self.reporter.report(hook.label(), instance.name(), &err);
            }
        }

        tracing::trace!(hook = hook.name(), scripts = instances.len(), "Event dispatched");
        instances.len()
    }

    fn hook_call(&self, event: &HostEvent) -> Option<HookCall> {
        let host = &self.host;
        let call = match event {
            HostEvent::Created { path, kind } => match kind {
                NodeKind::File => HookCall::FileCreated(FileView::new(host.clone(), path)),
                NodeKind::Folder => HookCall::FolderCreated(FolderView::new(host.clone(), path)),
            },
            HostEvent::Modified { path } => {
                if host.node(path) == Some(NodeKind::Folder) {
                    return None;
                }
                HookCall::FileModified(FileView::new(host.clone(), path))
            }
            HostEvent::Deleted { path, kind } => match kind {
                NodeKind::File => HookCall::FileDeleted(FileView::new(host.clone(), path)),
                NodeKind::Folder => HookCall::FolderDeleted(FolderView::new(host.clone(), path)),
            },
            HostEvent::Renamed {
                path,
                old_path,
                kind,
            } => match kind {
                NodeKind::File => {
                    HookCall::FileRenamed(FileView::new(host.clone(), path), old_path.clone())
                }
                NodeKind::Folder => {
                    HookCall::FolderRenamed(FolderView::new(host.clone(), path), old_path.clone())
                }
            },
            HostEvent::FileOpened { path } => HookCall::FileOpened(
                path.as_ref()
                    .map(|path| FileView::new(host.clone(), path.as_str())),
            ),
            HostEvent::MetadataChanged { path, data, cache } => {
                let frontmatter = cache.frontmatter.as_ref()?;
                if !self.hashes.observe(path, cache.frontmatter_text(data)) {
                    tracing::trace!(path = %path, "Front-matter unchanged");
                    return None;
                }
                HookCall::FrontmatterModified(
                    FileView::new(host.clone(), path),
                    FrontmatterView::new(host.clone(), path, frontmatter.clone()),
                )
            }
        };
        Some(call)
    }
}
