//! Directory-backed host
//!
//! Serves a vault that is a plain folder on disk. Entries whose name starts
//! with a dot are invisible to scripts, which keeps the runtime's own
//! `.vault-scripts` folder and the `.trash` folder out of the vault tree.

use crate::commands::{Command, CommandTable};
use crate::frontmatter::{self, MetadataTypes};
use crate::host::{CachedMetadata, Host, HostError, HostResult};
use crate::paths;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use vault_scripts_api::{FileStat, Frontmatter, NodeKind, Notice};

/// Runtime folder inside the vault
pub const CONFIG_DIR: &str = ".vault-scripts";

/// Script folder, relative to the vault root
pub const SCRIPTS_DIR: &str = ".vault-scripts/scripts";

/// Property type table, relative to the vault root
pub const TYPES_FILE: &str = ".vault-scripts/types.json";

/// Trash folder, relative to the vault root
pub const TRASH_DIR: &str = ".trash";

/// Most recent notices kept for [`DirectoryHost::notices`]
pub const NOTICE_BACKLOG: usize = 100;

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Vault path of `path` relative to the vault at `root`
///
/// `None` for paths outside the vault or inside a hidden folder.
pub fn vault_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str()?;
                if is_hidden(name) {
                    return None;
                }
                segments.push(name);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(paths::normalize(&segments.join("/")))
}

fn millis(time: std::io::Result<SystemTime>) -> i64 {
    time.map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis())
        .unwrap_or_default()
}

/// A vault stored as a directory tree
pub struct DirectoryHost {
    root: PathBuf,
    types: RwLock<Arc<MetadataTypes>>,
    commands: CommandTable,
    notices: Mutex<VecDeque<Notice>>,
}

impl DirectoryHost {
    /// Open the vault at `root`, which must be an existing directory
    pub fn open(root: impl Into<PathBuf>) -> HostResult<Self> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|e| HostError::io(&root, e))?;
        if !meta.is_dir() {
            return Err(HostError::NotAFolder(root.display().to_string()));
        }

        let host = Self {
            root,
            types: RwLock::new(Arc::new(MetadataTypes::new())),
            commands: CommandTable::new(),
            notices: Mutex::new(VecDeque::new()),
        };
        host.reload_types()?;
        Ok(host)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(SCRIPTS_DIR)
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// The last [`NOTICE_BACKLOG`] notices, oldest first
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().iter().cloned().collect()
    }

    /// Remove and return the kept notices, oldest first
    pub fn take_notices(&self) -> Vec<Notice> {
        self.notices.lock().drain(..).collect()
    }

    /// Re-read the property type table; a missing file means no properties
    pub fn reload_types(&self) -> HostResult<()> {
        let path = self.root.join(TYPES_FILE);
        let types = match fs::read_to_string(&path) {
            Ok(json) => {
                MetadataTypes::from_json(&json).map_err(|e| HostError::Frontmatter {
                    path: TYPES_FILE.to_string(),
                    message: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetadataTypes::new(),
            Err(e) => return Err(HostError::io(path, e)),
        };
        *self.types.write() = Arc::new(types);
        Ok(())
    }

    /// Vault path of an absolute file system path below this vault
    pub fn vault_path(&self, path: &Path) -> Option<String> {
        vault_path(&self.root, path)
    }

    /// File system path of a vault path
    ///
    /// Hidden segments, `..` included, never resolve: they lie outside the
    /// visible vault.
    fn resolve(&self, path: &str) -> HostResult<PathBuf> {
        let path = paths::normalize(path);
        if paths::is_root(&path) {
            return Ok(self.root.clone());
        }
        let mut resolved = self.root.clone();
        for segment in path.split('/') {
            if is_hidden(segment) {
                return Err(HostError::NotFound(path));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    fn existing(&self, path: &str) -> HostResult<(PathBuf, fs::Metadata)> {
        let resolved = self.resolve(path)?;
        match fs::metadata(&resolved) {
            Ok(meta) => Ok((resolved, meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HostError::NotFound(path.to_string()))
            }
            Err(e) => Err(HostError::io(resolved, e)),
        }
    }

    fn existing_file(&self, path: &str) -> HostResult<PathBuf> {
        let (resolved, meta) = self.existing(path)?;
        if !meta.is_file() {
            return Err(HostError::NotAFile(path.to_string()));
        }
        Ok(resolved)
    }

    /// Check `path` is free and create the folders leading to it
    fn prepare_target(&self, path: &str) -> HostResult<PathBuf> {
        let resolved = self.resolve(path)?;
        if paths::is_root(path) || self.exists(path) {
            return Err(HostError::AlreadyExists(path.to_string()));
        }

        let mut current = paths::parent(path);
        while let Some(folder) = current {
            if paths::is_root(&folder) {
                break;
            }
            if self.node(&folder) == Some(NodeKind::File) {
                return Err(HostError::NotAFolder(folder));
            }
            current = paths::parent(&folder);
        }

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|e| HostError::io(parent, e))?;
        }
        Ok(resolved)
    }

    fn collect_files(&self, folder: &str, files: &mut Vec<String>) {
        let Ok(children) = self.children(folder) else {
            return;
        };
        for (path, kind) in children {
            match kind {
                NodeKind::File => files.push(path),
                NodeKind::Folder => self.collect_files(&path, files),
            }
        }
    }
}

fn copy_tree(from: &Path, to: &Path) -> HostResult<()> {
    fs::create_dir_all(to).map_err(|e| HostError::io(to, e))?;
    for entry in fs::read_dir(from).map_err(|e| HostError::io(from, e))? {
        let entry = entry.map_err(|e| HostError::io(from, e))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        if source.is_dir() {
            copy_tree(&source, &target)?;
        } else {
            fs::copy(&source, &target).map_err(|e| HostError::io(&source, e))?;
        }
    }
    Ok(())
}

impl Host for DirectoryHost {
    fn node(&self, path: &str) -> Option<NodeKind> {
        let meta = fs::metadata(self.resolve(path).ok()?).ok()?;
        if meta.is_dir() {
            Some(NodeKind::Folder)
        } else {
            Some(NodeKind::File)
        }
    }

    fn children(&self, folder: &str) -> HostResult<Vec<(String, NodeKind)>> {
        let (resolved, meta) = self.existing(folder)?;
        if !meta.is_dir() {
            return Err(HostError::NotAFolder(folder.to_string()));
        }

        let folder = paths::normalize(folder);
        let mut children = Vec::new();
        for entry in fs::read_dir(&resolved).map_err(|e| HostError::io(&resolved, e))? {
            let entry = entry.map_err(|e| HostError::io(&resolved, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_hidden(&name) {
                continue;
            }
            let kind = match entry.path().is_dir() {
                true => NodeKind::Folder,
                false => NodeKind::File,
            };
            children.push((paths::join(&folder, &name), kind));
        }

        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children)
    }

    fn files(&self) -> Vec<String> {
        let mut files = Vec::new();
        self.collect_files(crate::host::ROOT_PATH, &mut files);
        files
    }

    fn stat(&self, path: &str) -> HostResult<FileStat> {
        let (_, meta) = self.existing(path)?;
        let mtime = millis(meta.modified());
        let ctime = match meta.created() {
            Ok(created) => millis(Ok(created)),
            Err(_) => mtime,
        };
        Ok(FileStat {
            ctime,
            mtime,
            size: meta.len(),
        })
    }

    fn read(&self, path: &str) -> HostResult<String> {
        let data = self.read_binary(path)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn read_binary(&self, path: &str) -> HostResult<Vec<u8>> {
        let resolved = self.existing_file(path)?;
        fs::read(&resolved).map_err(|e| HostError::io(resolved, e))
    }

    fn write(&self, path: &str, data: &str) -> HostResult<()> {
        self.write_binary(path, data.as_bytes())
    }

    fn write_binary(&self, path: &str, data: &[u8]) -> HostResult<()> {
        let resolved = self.existing_file(path)?;
        fs::write(&resolved, data).map_err(|e| HostError::io(resolved, e))
    }

    fn append(&self, path: &str, data: &str) -> HostResult<()> {
        let resolved = self.existing_file(path)?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&resolved)
            .map_err(|e| HostError::io(&resolved, e))?;
        file.write_all(data.as_bytes())
            .map_err(|e| HostError::io(&resolved, e))
    }

    fn create(&self, path: &str, data: &[u8]) -> HostResult<()> {
        let resolved = self.prepare_target(path)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&resolved)
            .map_err(|e| HostError::io(&resolved, e))?;
        file.write_all(data)
            .map_err(|e| HostError::io(&resolved, e))?;
        tracing::debug!(path = %path, "File created");
        Ok(())
    }

    fn create_folder(&self, path: &str) -> HostResult<()> {
        let resolved = self.prepare_target(path)?;
        fs::create_dir(&resolved).map_err(|e| HostError::io(resolved, e))?;
        tracing::debug!(path = %path, "Folder created");
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> HostResult<()> {
        let (source, meta) = self.existing(from)?;
        let target = self.prepare_target(to)?;
        if meta.is_dir() {
            copy_tree(&source, &target)
        } else {
            fs::copy(&source, &target)
                .map(|_| ())
                .map_err(|e| HostError::io(source, e))
        }
    }

    fn rename(&self, from: &str, to: &str) -> HostResult<()> {
        let (source, _) = self.existing(from)?;
        let target = self.prepare_target(to)?;
        fs::rename(&source, &target).map_err(|e| HostError::io(source, e))
    }

    fn delete(&self, path: &str, force: bool) -> HostResult<()> {
        let (resolved, meta) = self.existing(path)?;
        if !meta.is_dir() {
            return fs::remove_file(&resolved).map_err(|e| HostError::io(resolved, e));
        }
        if paths::is_root(&paths::normalize(path)) {
            return Err(HostError::Unsupported("deleting the vault root".to_string()));
        }

        let non_empty = fs::read_dir(&resolved)
            .map_err(|e| HostError::io(&resolved, e))?
            .next()
            .is_some();
        if non_empty && !force {
            return Err(HostError::FolderNotEmpty(path.to_string()));
        }
        fs::remove_dir_all(&resolved).map_err(|e| HostError::io(resolved, e))
    }

    fn trash(&self, path: &str) -> HostResult<()> {
        let (source, _) = self.existing(path)?;
        let path = paths::normalize(path);
        if paths::is_root(&path) {
            return Err(HostError::Unsupported("trashing the vault root".to_string()));
        }

        let mut target = self.root.join(TRASH_DIR).join(&path);
        if target.exists() {
            let stamp = chrono::Utc::now().timestamp_millis();
            target = self
                .root
                .join(TRASH_DIR)
                .join(format!("{}.{}", path, stamp));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| HostError::io(parent, e))?;
        }
        fs::rename(&source, &target).map_err(|e| HostError::io(source, e))?;
        tracing::debug!(path = %path, "Moved to trash");
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
        tracing::debug!(command = %command.id, "Command added");
        self.commands.insert(command);
        Ok(())
    }

    fn remove_command(&self, id: &str) -> HostResult<()> {
        self.commands.remove(id)
    }

    fn notify(&self, notice: Notice) {
        if notice.is_error() {
            tracing::warn!(notice = %notice, "Notice");
        } else {
            tracing::info!(notice = %notice, "Notice");
        }
        let mut notices = self.notices.lock();
        if notices.len() == NOTICE_BACKLOG {
            notices.pop_front();
        }
        notices.push_back(notice);
    }
}
