//! In-memory host
//!
//! A complete [`Host`] over a map of nodes. Front-matter is parsed from
//! markdown files on demand; commands, notices and icons are kept in memory
//! so tests and embedders can inspect them.

use crate::commands::{Command, CommandTable};
use crate::frontmatter::{self, MetadataTypes};
use crate::host::{CachedMetadata, Host, HostError, HostResult, IconProvider, ROOT_PATH};
use crate::paths;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use vault_scripts_api::{FileStat, Frontmatter, Icon, NodeKind, Notice};

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    data: Vec<u8>,
    ctime: i64,
    mtime: i64,
}

impl Node {
    fn folder() -> Self {
        let now = now_millis();
        Self {
            kind: NodeKind::Folder,
            data: Vec::new(),
            ctime: now,
            mtime: now,
        }
    }

    fn file(data: Vec<u8>) -> Self {
        let now = now_millis();
        Self {
            kind: NodeKind::File,
            data,
            ctime: now,
            mtime: now,
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Icons kept in memory
#[derive(Debug, Default)]
pub struct MemoryIcons {
    icons: Mutex<HashMap<String, Icon>>,
}

impl IconProvider for MemoryIcons {
    fn icon(&self, path: &str) -> Option<Icon> {
        self.icons.lock().get(path).cloned()
    }

    fn set_icon(&self, path: &str, icon: Icon) -> HostResult<()> {
        self.icons.lock().insert(path.to_string(), icon);
        Ok(())
    }

    fn remove_icon(&self, path: &str) -> HostResult<()> {
        self.icons.lock().remove(path);
        Ok(())
    }
}

/// A host whose whole state lives in memory
pub struct MemoryHost {
    nodes: RwLock<BTreeMap<String, Node>>,
    types: RwLock<Arc<MetadataTypes>>,
    commands: CommandTable,
    notices: Mutex<Vec<Notice>>,
    trashed: Mutex<Vec<String>>,
    failing_removals: Mutex<HashSet<String>>,
    icons: Option<Arc<MemoryIcons>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            types: RwLock::new(Arc::new(MetadataTypes::new())),
            commands: CommandTable::new(),
            notices: Mutex::new(Vec::new()),
            trashed: Mutex::new(Vec::new()),
            failing_removals: Mutex::new(HashSet::new()),
            icons: None,
        }
    }

    /// Add (or overwrite) a file, creating its parent folders
    pub fn with_file(self, path: &str, content: &str) -> Self {
        {
            let mut nodes = self.nodes.write();
            let path = paths::normalize(path);
            ensure_parents(&mut nodes, &path);
            nodes.insert(path, Node::file(content.as_bytes().to_vec()));
        }
        self
    }

    pub fn with_folder(self, path: &str) -> Self {
        {
            let mut nodes = self.nodes.write();
            let path = paths::normalize(path);
            ensure_parents(&mut nodes, &path);
            nodes.entry(path).or_insert_with(Node::folder);
        }
        self
    }

    pub fn with_types(self, types: MetadataTypes) -> Self {
        *self.types.write() = Arc::new(types);
        self
    }

    /// Enable the icon connector
    pub fn with_icons(mut self) -> Self {
        self.icons = Some(Arc::new(MemoryIcons::default()));
        self
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Every notice sent so far, oldest first
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn error_notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .iter()
            .filter(|n| n.is_error())
            .cloned()
            .collect()
    }

    pub fn clear_notices(&self) {
        self.notices.lock().clear();
    }

    /// Paths moved to the trash, oldest first
    pub fn trashed(&self) -> Vec<String> {
        self.trashed.lock().clone()
    }

    /// Make removal of the command `id` fail from now on
    pub fn fail_command_removal(&self, id: &str) {
        self.failing_removals.lock().insert(id.to_string());
    }

    fn with_file_mut<T>(
        &self,
        path: &str,
        update: impl FnOnce(&mut Node) -> T,
    ) -> HostResult<T> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(path)
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        if !node.kind.is_file() {
            return Err(HostError::NotAFile(path.to_string()));
        }
        let result = update(node);
        node.mtime = now_millis();
        Ok(result)
    }

    fn file_data(&self, path: &str) -> HostResult<Vec<u8>> {
        let nodes = self.nodes.read();
        let node = nodes
            .get(path)
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        if !node.kind.is_file() {
            return Err(HostError::NotAFile(path.to_string()));
        }
        Ok(node.data.clone())
    }

    /// Paths of `path` and everything below it
    fn subtree(nodes: &BTreeMap<String, Node>, path: &str) -> Vec<String> {
        nodes
            .keys()
            .filter(|key| paths::is_within(key, path))
            .cloned()
            .collect()
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_parents(nodes: &mut BTreeMap<String, Node>, path: &str) {
    let mut current = paths::parent(path);
    while let Some(folder) = current {
        if paths::is_root(&folder) {
            break;
        }
        nodes.entry(folder.clone()).or_insert_with(Node::folder);
        current = paths::parent(&folder);
    }
}

fn check_parent(nodes: &BTreeMap<String, Node>, path: &str) -> HostResult<()> {
    match paths::parent(path) {
        Some(parent) if paths::is_root(&parent) => Ok(()),
        Some(parent) => match nodes.get(&parent) {
            Some(node) if node.kind.is_folder() => Ok(()),
            Some(_) => Err(HostError::NotAFolder(parent)),
            None => Ok(()),
        },
        None => Err(HostError::AlreadyExists(path.to_string())),
    }
}

impl Host for MemoryHost {
    fn node(&self, path: &str) -> Option<NodeKind> {
        if paths::is_root(path) {
            return Some(NodeKind::Folder);
        }
        self.nodes.read().get(path).map(|node| node.kind)
    }

    fn children(&self, folder: &str) -> HostResult<Vec<(String, NodeKind)>> {
        match self.node(folder) {
            Some(NodeKind::Folder) => {}
            Some(NodeKind::File) => return Err(HostError::NotAFolder(folder.to_string())),
            None => return Err(HostError::NotFound(folder.to_string())),
        }

        let parent = if paths::is_root(folder) {
            ROOT_PATH.to_string()
        } else {
            folder.to_string()
        };
        Ok(self
            .nodes
            .read()
            .iter()
            .filter(|(path, _)| paths::parent(path).as_deref() == Some(parent.as_str()))
            .map(|(path, node)| (path.clone(), node.kind))
            .collect())
    }

    fn files(&self) -> Vec<String> {
        self.nodes
            .read()
            .iter()
            .filter(|(_, node)| node.kind.is_file())
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn stat(&self, path: &str) -> HostResult<FileStat> {
        let nodes = self.nodes.read();
        let node = nodes
            .get(path)
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        Ok(FileStat {
            ctime: node.ctime,
            mtime: node.mtime,
            size: node.data.len() as u64,
        })
    }

    fn read(&self, path: &str) -> HostResult<String> {
        let data = self.file_data(path)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn read_binary(&self, path: &str) -> HostResult<Vec<u8>> {
        self.file_data(path)
    }

    fn write(&self, path: &str, data: &str) -> HostResult<()> {
        self.write_binary(path, data.as_bytes())
    }

    fn write_binary(&self, path: &str, data: &[u8]) -> HostResult<()> {
        self.with_file_mut(path, |node| node.data = data.to_vec())
    }

    fn append(&self, path: &str, data: &str) -> HostResult<()> {
        self.with_file_mut(path, |node| node.data.extend_from_slice(data.as_bytes()))
    }

    fn create(&self, path: &str, data: &[u8]) -> HostResult<()> {
        let mut nodes = self.nodes.write();
        if paths::is_root(path) || nodes.contains_key(path) {
            return Err(HostError::AlreadyExists(path.to_string()));
        }
        check_parent(&nodes, path)?;
        ensure_parents(&mut nodes, path);
        nodes.insert(path.to_string(), Node::file(data.to_vec()));
        Ok(())
    }

    fn create_folder(&self, path: &str) -> HostResult<()> {
        let mut nodes = self.nodes.write();
        if paths::is_root(path) || nodes.contains_key(path) {
            return Err(HostError::AlreadyExists(path.to_string()));
        }
        check_parent(&nodes, path)?;
        ensure_parents(&mut nodes, path);
        nodes.insert(path.to_string(), Node::folder());
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> HostResult<()> {
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(from) {
            return Err(HostError::NotFound(from.to_string()));
        }
        if nodes.contains_key(to) {
            return Err(HostError::AlreadyExists(to.to_string()));
        }
        check_parent(&nodes, to)?;
        ensure_parents(&mut nodes, to);

        for path in Self::subtree(&nodes, from) {
            if let Some(node) = nodes.get(&path).cloned() {
                let now = now_millis();
                nodes.insert(
                    paths::rebase(&path, from, to),
                    Node {
                        ctime: now,
                        mtime: now,
                        ..node
                    },
                );
            }
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> HostResult<()> {
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(from) {
            return Err(HostError::NotFound(from.to_string()));
        }
        if nodes.contains_key(to) {
            return Err(HostError::AlreadyExists(to.to_string()));
        }
        check_parent(&nodes, to)?;
        ensure_parents(&mut nodes, to);

        for path in Self::subtree(&nodes, from) {
            if let Some(node) = nodes.remove(&path) {
                nodes.insert(paths::rebase(&path, from, to), node);
            }
        }
        Ok(())
    }

    fn delete(&self, path: &str, force: bool) -> HostResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get(path)
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;

        let subtree = Self::subtree(&nodes, path);
        if node.kind.is_folder() && subtree.len() > 1 && !force {
            return Err(HostError::FolderNotEmpty(path.to_string()));
        }
        for entry in subtree {
            nodes.remove(&entry);
        }
        Ok(())
    }

    fn trash(&self, path: &str) -> HostResult<()> {
        self.delete(path, true)?;
        self.trashed.lock().push(path.to_string());
        Ok(())
    }

    fn metadata(&self, path: &str) -> Option<CachedMetadata> {
        if paths::extension(path) != "md" {
            return None;
        }
        let text = self.read(path).ok()?;
        match frontmatter::parse(&text) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Unparsable front-matter");
                Some(CachedMetadata::default())
            }
        }
    }

    fn process_frontmatter(
        &self,
        path: &str,
        update: &mut dyn FnMut(&mut Frontmatter),
    ) -> HostResult<()> {
        let text = self.read(path)?;
        let rendered =
            frontmatter::rewrite(&text, update).map_err(|message| HostError::Frontmatter {
                path: path.to_string(),
                message,
            })?;
        self.write(path, &rendered)
    }

    fn metadata_types(&self) -> Arc<MetadataTypes> {
        self.types.read().clone()
    }

    fn add_command(&self, command: Command) -> HostResult<()> {
        self.commands.insert(command);
        Ok(())
    }

    fn remove_command(&self, id: &str) -> HostResult<()> {
        if self.failing_removals.lock().contains(id) {
            return Err(HostError::Command(format!("refused to remove {}", id)));
        }
        self.commands.remove(id)
    }

    fn notify(&self, notice: Notice) {
        tracing::info!(notice = %notice, "Notice");
        self.notices.lock().push(notice);
    }

    fn icon_provider(&self) -> Option<Arc<dyn IconProvider>> {
        self.icons
            .clone()
            .map(|icons| icons as Arc<dyn IconProvider>)
    }
}
