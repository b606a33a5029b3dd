//! Host application interface
//!
//! Everything the script runtime consumes from the application it is
//! embedded in: the storage tree, the front-matter cache, the command
//! palette, user notices and optional plugin connectors.

use crate::commands::Command;
use crate::frontmatter::MetadataTypes;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use vault_scripts_api::{FileStat, Frontmatter, Icon, NodeKind, Notice};

/// Path of the root folder
pub const ROOT_PATH: &str = "/";

/// Errors reported by a host's storage layer
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Not a folder: {0}")]
    NotAFolder(String),

    #[error("Folder is not empty: {0}")]
    FolderNotEmpty(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid front-matter in {path}: {message}")]
    Frontmatter { path: String, message: String },

    #[error("Command error: {0}")]
    Command(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl HostError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// The host's cached metadata for a single file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedMetadata {
    /// Parsed front-matter, `None` when the file has no front-matter block
    pub frontmatter: Option<Frontmatter>,
    /// Byte offsets of the front-matter block (delimiters included)
    pub frontmatter_position: Option<Range<usize>>,
}

impl CachedMetadata {
    /// The raw front-matter block of `data`, or an empty string
    pub fn frontmatter_text<'a>(&self, data: &'a str) -> &'a str {
        match &self.frontmatter_position {
            Some(range) => data.get(range.clone()).unwrap_or(""),
            None => "",
        }
    }
}

/// Icon storage exposed by an icon plugin
pub trait IconProvider: Send + Sync {
    fn icon(&self, path: &str) -> Option<Icon>;

    fn set_icon(&self, path: &str, icon: Icon) -> HostResult<()>;

    fn remove_icon(&self, path: &str) -> HostResult<()>;
}

/// The host application as seen by the script runtime
///
/// Paths are vault-relative with `/` separators; the root folder is
/// [`ROOT_PATH`]. Every method acts on the host's live state.
pub trait Host: Send + Sync {
    /// Kind of the node at `path`, `None` if nothing exists there
    fn node(&self, path: &str) -> Option<NodeKind>;

    /// Direct children of a folder as `(path, kind)` pairs
    fn children(&self, folder: &str) -> HostResult<Vec<(String, NodeKind)>>;

    /// Every file in the vault
    fn files(&self) -> Vec<String>;

    fn stat(&self, path: &str) -> HostResult<FileStat>;

    fn exists(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    fn read(&self, path: &str) -> HostResult<String>;

    fn read_binary(&self, path: &str) -> HostResult<Vec<u8>>;

    /// Replace the content of an existing file
    fn write(&self, path: &str, data: &str) -> HostResult<()>;

    fn write_binary(&self, path: &str, data: &[u8]) -> HostResult<()>;

    fn append(&self, path: &str, data: &str) -> HostResult<()>;

    /// Create a new file, creating missing parent folders
    fn create(&self, path: &str, data: &[u8]) -> HostResult<()>;

    fn create_folder(&self, path: &str) -> HostResult<()>;

    /// Copy a file or a folder tree
    fn copy(&self, from: &str, to: &str) -> HostResult<()>;

    fn rename(&self, from: &str, to: &str) -> HostResult<()>;

    /// Delete permanently; non-empty folders require `force`
    fn delete(&self, path: &str, force: bool) -> HostResult<()>;

    /// Move to the host's trash
    fn trash(&self, path: &str) -> HostResult<()>;

    /// Cached metadata of a file, `None` for files the host does not index
    fn metadata(&self, path: &str) -> Option<CachedMetadata>;

    /// Rewrite the front-matter of `path` in place
    fn process_frontmatter(
        &self,
        path: &str,
        update: &mut dyn FnMut(&mut Frontmatter),
    ) -> HostResult<()>;

    /// Registered property types
    fn metadata_types(&self) -> Arc<MetadataTypes>;

    fn add_command(&self, command: Command) -> HostResult<()>;

    fn remove_command(&self, id: &str) -> HostResult<()>;

    fn notify(&self, notice: Notice);

    fn icon_provider(&self) -> Option<Arc<dyn IconProvider>> {
        None
    }
}
