//! Vault file watcher
//!
//! Watches a directory vault and feeds the resulting [`HostEvent`]s to a
//! [`ScriptManager`]. Raw file system notifications are batched over a
//! debounce window, translated into vault events and dispatched in order;
//! markdown files that were created or modified are followed by a metadata
//! event so front-matter hooks fire.

use crate::directory::{self, DirectoryHost};
use crate::dispatcher::{metadata_changed_event, HostEvent};
use crate::host::Host;
use crate::manager::ScriptManager;
use crate::paths;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vault_scripts_api::NodeKind;

/// Configuration for the vault watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period before a batch of file events is dispatched
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

/// Errors that can occur during watching
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Failed to initialize watcher: {0}")]
    WatcherInit(#[source] notify::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Running watcher; dropping it stops file notifications
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl VaultWatcher {
    /// Start watching the vault served by `host`
    pub fn start(
        host: Arc<DirectoryHost>,
        manager: ScriptManager,
        config: WatcherConfig,
    ) -> Result<Self, WatcherError> {
        let root = host
            .root()
            .canonicalize()
            .map_err(|source| WatcherError::Io {
                path: host.root().to_path_buf(),
                source,
            })?;

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let _ = event_tx.blocking_send(event);
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            }
        })
        .map_err(WatcherError::WatcherInit)?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(WatcherError::WatcherInit)?;
        tracing::info!(dir = %root.display(), "Watching vault");

        let mut translator = EventTranslator::new(root, host.as_ref());
        let debounce = config.debounce;
        let task = tokio::spawn(async move {
            let mut pending: Vec<HostEvent> = Vec::new();
            let mut debounce_timer: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Vault watcher shutting down");
                        break;
                    }

                    Some(event) = event_rx.recv() => {
                        pending.extend(translator.translate(host.as_ref(), &event));
                        debounce_timer = Some(tokio::time::Instant::now() + debounce);
                    }

                    _ = async {
                        if let Some(deadline) = debounce_timer {
                            tokio::time::sleep_until(deadline).await;
                        } else {
                            std::future::pending::<()>().await;
                        }
                    } => {
                        pending.extend(translator.finish());
                        let batch = coalesce(pending.drain(..));
                        for event in &batch {
                            deliver(&manager, host.as_ref(), event).await;
                        }
                        debounce_timer = None;
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            shutdown_tx,
            task,
        })
    }

    /// Stop the watcher and wait for the dispatch task to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

async fn deliver(manager: &ScriptManager, host: &dyn Host, event: &HostEvent) {
    tracing::debug!(event = event_name(event), path = ?event.path(), "Vault event");
    manager.handle(event).await;

    let follow_up = match event {
        HostEvent::Created {
            path,
            kind: NodeKind::File,
        }
        | HostEvent::Modified { path } => metadata_changed_event(host, path),
        _ => None,
    };
    if let Some(follow_up) = follow_up {
        manager.handle(&follow_up).await;
    }
}

fn event_name(event: &HostEvent) -> &'static str {
    match event {
        HostEvent::Created { .. } => "created",
        HostEvent::Modified { .. } => "modified",
        HostEvent::Deleted { .. } => "deleted",
        HostEvent::Renamed { .. } => "renamed",
        HostEvent::FileOpened { .. } => "file-opened",
        HostEvent::MetadataChanged { .. } => "metadata-changed",
    }
}

/// Drop modifications that repeat the event right before them
fn coalesce(events: impl Iterator<Item = HostEvent>) -> Vec<HostEvent> {
    let mut out: Vec<HostEvent> = Vec::new();
    for event in events {
        let repeat = matches!(
            (&event, out.last()),
            (HostEvent::Modified { path }, Some(HostEvent::Modified { path: last }))
                | (HostEvent::Modified { path }, Some(HostEvent::Created { path: last, .. }))
                if path == last
        );
        if !repeat {
            out.push(event);
        }
    }
    out
}

/// Turns raw notify events into vault events
///
/// Keeps a kind index of every known node so deletions and renames can be
/// classified after the node is gone from disk.
pub struct EventTranslator {
    root: PathBuf,
    index: HashMap<String, NodeKind>,
    /// Rename sources still waiting for their destination
    renames: Vec<(Option<usize>, String)>,
}

impl EventTranslator {
    pub fn new(root: impl Into<PathBuf>, host: &dyn Host) -> Self {
        let mut index = HashMap::new();
        index_tree(host, crate::host::ROOT_PATH, &mut index);
        Self {
            root: root.into(),
            index,
            renames: Vec::new(),
        }
    }

    pub fn known(&self, path: &str) -> Option<NodeKind> {
        self.index.get(path).copied()
    }

    fn vault_path(&self, path: &Path) -> Option<String> {
        directory::vault_path(&self.root, path).filter(|p| !paths::is_root(p))
    }

    fn vault_paths(&self, event: &Event) -> Vec<String> {
        event
            .paths
            .iter()
            .filter_map(|p| self.vault_path(p))
            .collect()
    }

    pub fn translate(&mut self, host: &dyn Host, event: &Event) -> Vec<HostEvent> {
        match event.kind {
            EventKind::Create(kind) => self
                .vault_paths(event)
                .into_iter()
                .filter_map(|path| {
                    let kind = match kind {
                        CreateKind::File => NodeKind::File,
                        CreateKind::Folder => NodeKind::Folder,
                        _ => host.node(&path)?,
                    };
                    self.created(path, kind)
                })
                .collect(),

            EventKind::Modify(ModifyKind::Name(mode)) => self.renamed(host, event, mode),

            EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),

            EventKind::Modify(_) => self
                .vault_paths(event)
                .into_iter()
                .filter(|path| host.node(path) == Some(NodeKind::File))
                .map(|path| HostEvent::Modified { path })
                .collect(),

            EventKind::Remove(kind) => self
                .vault_paths(event)
                .into_iter()
                .map(|path| {
                    let kind = match kind {
                        RemoveKind::File => NodeKind::File,
                        RemoveKind::Folder => NodeKind::Folder,
                        _ => self.known(&path).unwrap_or(NodeKind::File),
                    };
                    self.deleted(path, kind)
                })
                .collect(),

            _ => Vec::new(),
        }
    }

    /// Rename sources whose destination never arrived left the vault
    pub fn finish(&mut self) -> Vec<HostEvent> {
        let sources: Vec<String> = self.renames.drain(..).map(|(_, path)| path).collect();
        sources
            .into_iter()
            .filter_map(|path| {
                let kind = self.known(&path)?;
                Some(self.deleted(path, kind))
            })
            .collect()
    }

    fn renamed(&mut self, host: &dyn Host, event: &Event, mode: RenameMode) -> Vec<HostEvent> {
        let tracker = event.tracker();
        match mode {
            RenameMode::From => {
                if let Some(path) = event.paths.first().and_then(|p| self.vault_path(p)) {
                    self.renames.push((tracker, path));
                }
                Vec::new()
            }
            RenameMode::To => {
                let paired = tracker.is_some() && self.renames.iter().any(|(t, _)| *t == tracker);
                if paired {
                    // The matching `Both` event carries the pair
                    return Vec::new();
                }
                self.appeared(host, event.paths.first())
            }
            RenameMode::Both => {
                let (Some(from), Some(to)) = (event.paths.first(), event.paths.get(1)) else {
                    return Vec::new();
                };
                let (from, to) = (self.vault_path(from), self.vault_path(to));
                self.renames.retain(|(t, path)| {
                    !(tracker.is_some() && *t == tracker) && Some(path) != from.as_ref()
                });

                match (from, to) {
                    (Some(from), Some(to)) => {
                        let Some(kind) = self.known(&from).or_else(|| host.node(&to)) else {
                            return Vec::new();
                        };
                        self.move_index(&from, &to, kind);
                        vec![HostEvent::Renamed {
                            path: to,
                            old_path: from,
                            kind,
                        }]
                    }
                    (Some(from), None) => match self.known(&from) {
                        Some(kind) => vec![self.deleted(from, kind)],
                        None => Vec::new(),
                    },
                    (None, Some(to)) => match host.node(&to) {
                        Some(kind) => self.created(to, kind).into_iter().collect(),
                        None => Vec::new(),
                    },
                    (None, None) => Vec::new(),
                }
            }
            _ => event
                .paths
                .iter()
                .flat_map(|p| self.appeared(host, Some(p)))
                .collect(),
        }
    }

    /// A node showed up or vanished without a known counterpart
    fn appeared(&mut self, host: &dyn Host, path: Option<&PathBuf>) -> Vec<HostEvent> {
        let Some(path) = path.and_then(|p| self.vault_path(p)) else {
            return Vec::new();
        };
        match (host.node(&path), self.known(&path)) {
            (Some(kind), _) => self.created(path, kind).into_iter().collect(),
            (None, Some(kind)) => vec![self.deleted(path, kind)],
            (None, None) => Vec::new(),
        }
    }

    fn created(&mut self, path: String, kind: NodeKind) -> Option<HostEvent> {
        if self.index.insert(path.clone(), kind) == Some(kind) {
            return None;
        }
        Some(HostEvent::Created { path, kind })
    }

    fn deleted(&mut self, path: String, kind: NodeKind) -> HostEvent {
        self.index.retain(|known, _| !paths::is_within(known, &path));
        HostEvent::Deleted { path, kind }
    }

    fn move_index(&mut self, from: &str, to: &str, kind: NodeKind) {
        let moved: Vec<(String, NodeKind)> = self
            .index
            .iter()
            .filter(|(known, _)| paths::is_within(known, from))
            .map(|(known, kind)| (paths::rebase(known, from, to), *kind))
            .collect();
        self.index.retain(|known, _| !paths::is_within(known, from));
        self.index.extend(moved);
        self.index.insert(to.to_string(), kind);
    }
}

fn index_tree(host: &dyn Host, folder: &str, index: &mut HashMap<String, NodeKind>) {
    let Ok(children) = host.children(folder) else {
        return;
    };
    for (path, kind) in children {
        if kind.is_folder() {
            index_tree(host, &path, index);
        }
        index.insert(path, kind);
    }
}
