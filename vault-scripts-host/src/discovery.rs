//! Script discovery
//!
//! Lists and reads script sources. [`ScriptsDirectory`] works on the
//! scripts folder of a vault and also keeps the versioned type declarations
//! for script authors installed under `@types`.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vault_scripts_api::{
    type_definitions_file_name, TYPE_DEFINITIONS, TYPE_DEFINITIONS_PREFIX, TYPE_DEFINITIONS_SUFFIX,
};

/// Folder holding the type declarations, relative to the scripts folder
pub const TYPES_DIR: &str = "@types";

/// Errors that can occur while listing or reading scripts
#[derive(Debug, Error)]
pub enum ScriptsDirError {
    #[error("Script not found: {0}")]
    NotFound(String),

    #[error("Invalid script name: {0}")]
    InvalidName(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScriptsDirError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Source of script files
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// File names of every available script, sorted
    async fn list(&self) -> Result<Vec<String>, ScriptsDirError>;

    /// Source text of one script
    async fn read(&self, name: &str) -> Result<String, ScriptsDirError>;
}

/// Reject names that would escape the scripts folder
fn validate_name(name: &str) -> Result<(), ScriptsDirError> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(ScriptsDirError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// The scripts folder of a vault
#[derive(Debug, Clone)]
pub struct ScriptsDirectory {
    root: PathBuf,
    extensions: Vec<&'static str>,
}

impl ScriptsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["lua", "luau"],
        }
    }

    /// Only list files with these extensions
    pub fn with_extensions(mut self, extensions: Vec<&'static str>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn script_path(&self, name: &str) -> Result<PathBuf, ScriptsDirError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Create the scripts folder; returns `true` if it did not exist
    pub async fn ensure(&self) -> Result<bool, ScriptsDirError> {
        if tokio::fs::try_exists(&self.root)
            .await
            .map_err(|e| ScriptsDirError::io(&self.root, e))?
        {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ScriptsDirError::io(&self.root, e))?;
        tracing::info!(dir = %self.root.display(), "Created scripts directory");
        Ok(true)
    }

    /// Install the type declarations for this version, removing stale versions
    pub async fn install_type_definitions(&self) -> Result<PathBuf, ScriptsDirError> {
        let types_dir = self.root.join(TYPES_DIR);
        tokio::fs::create_dir_all(&types_dir)
            .await
            .map_err(|e| ScriptsDirError::io(&types_dir, e))?;

        let current = type_definitions_file_name();
        let mut entries = tokio::fs::read_dir(&types_dir)
            .await
            .map_err(|e| ScriptsDirError::io(&types_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ScriptsDirError::io(&types_dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let stale = name.starts_with(TYPE_DEFINITIONS_PREFIX)
                && name.ends_with(TYPE_DEFINITIONS_SUFFIX)
                && name != current;
            if stale {
                tokio::fs::remove_file(entry.path())
                    .await
                    .map_err(|e| ScriptsDirError::io(entry.path(), e))?;
                tracing::debug!(file = %name, "Removed stale type declarations");
            }
        }

        let target = types_dir.join(&current);
        let up_to_date = match tokio::fs::read_to_string(&target).await {
            Ok(existing) => existing == TYPE_DEFINITIONS,
            Err(_) => false,
        };
        if !up_to_date {
            tokio::fs::write(&target, TYPE_DEFINITIONS)
                .await
                .map_err(|e| ScriptsDirError::io(&target, e))?;
            tracing::info!(file = %target.display(), "Installed type declarations");
        }

        Ok(target)
    }

    fn is_script(&self, name: &str) -> bool {
        if name.starts_with('.') {
            return false;
        }
        match name.rsplit_once('.') {
            Some((stem, ext)) => !stem.is_empty() && self.extensions.contains(&ext),
            None => false,
        }
    }
}

#[async_trait]
impl ScriptStore for ScriptsDirectory {
    async fn list(&self) -> Result<Vec<String>, ScriptsDirError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ScriptsDirError::io(&self.root, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ScriptsDirError::io(&self.root, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_file && self.is_script(&name) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    async fn read(&self, name: &str) -> Result<String, ScriptsDirError> {
        let path = self.script_path(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ScriptsDirError::NotFound(name.to_string()))
            }
            Err(e) => Err(ScriptsDirError::io(path, e)),
        }
    }
}

/// Scripts kept in memory, for tests and embedders
#[derive(Debug, Default)]
pub struct MemoryScriptStore {
    scripts: RwLock<BTreeMap<String, String>>,
}

impl MemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, name: &str, text: &str) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&self, name: &str, text: &str) {
        self.scripts
            .write()
            .insert(name.to_string(), text.to_string());
    }

    pub fn remove(&self, name: &str) -> bool {
        self.scripts.write().remove(name).is_some()
    }
}

#[async_trait]
impl ScriptStore for MemoryScriptStore {
    async fn list(&self) -> Result<Vec<String>, ScriptsDirError> {
        Ok(self.scripts.read().keys().cloned().collect())
    }

    async fn read(&self, name: &str) -> Result<String, ScriptsDirError> {
        self.scripts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptsDirError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.lua"), "").unwrap();
        fs::write(temp.path().join("a.luau"), "").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();
        fs::write(temp.path().join(".hidden.lua"), "").unwrap();
        fs::create_dir(temp.path().join("dir.lua")).unwrap();

        let dir = ScriptsDirectory::new(temp.path());
        assert_eq!(dir.list().await.unwrap(), vec!["a.luau", "b.lua"]);
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let temp = TempDir::new().unwrap();
        let dir = ScriptsDirectory::new(temp.path().join("nope"));
        assert!(dir.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.lua"), "return 1").unwrap();
        let dir = ScriptsDirectory::new(temp.path());

        assert_eq!(dir.read("a.lua").await.unwrap(), "return 1");
        assert!(matches!(
            dir.read("b.lua").await,
            Err(ScriptsDirError::NotFound(_))
        ));
        assert!(matches!(
            dir.read("../escape.lua").await,
            Err(ScriptsDirError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let temp = TempDir::new().unwrap();
        let dir = ScriptsDirectory::new(temp.path().join("scripts"));
        assert!(dir.ensure().await.unwrap());
        assert!(!dir.ensure().await.unwrap());
    }

    #[tokio::test]
    async fn test_install_type_definitions_replaces_stale() {
        let temp = TempDir::new().unwrap();
        let types = temp.path().join(TYPES_DIR);
        fs::create_dir_all(&types).unwrap();
        let stale = types.join(format!(
            "{}0.0.1{}",
            TYPE_DEFINITIONS_PREFIX, TYPE_DEFINITIONS_SUFFIX
        ));
        fs::write(&stale, "old").unwrap();
        fs::write(types.join("mine.d.lua"), "keep").unwrap();

        let dir = ScriptsDirectory::new(temp.path());
        let installed = dir.install_type_definitions().await.unwrap();

        assert!(!stale.exists());
        assert!(types.join("mine.d.lua").exists());
        assert_eq!(fs::read_to_string(&installed).unwrap(), TYPE_DEFINITIONS);
        assert!(installed.ends_with(type_definitions_file_name()));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryScriptStore::new()
            .with_script("b.lua", "x")
            .with_script("a.lua", "y");
        assert_eq!(store.list().await.unwrap(), vec!["a.lua", "b.lua"]);
        assert_eq!(store.read("a.lua").await.unwrap(), "y");
        assert!(store.remove("a.lua"));
        assert!(store.read("a.lua").await.is_err());
    }
}
