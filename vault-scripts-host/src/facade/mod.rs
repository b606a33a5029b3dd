//! Script-facing views over the host
//!
//! Views wrap a path and resolve it against the host on every access. They
//! are cheap to clone and never cache node state.

mod connectors;
mod file;
mod folder;
mod frontmatter;
mod vault;

pub use connectors::{Connector, Connectors, IconConnector, ICONS_CONNECTOR};
pub use file::FileView;
pub use folder::{FileIter, FolderIter, FolderView};
pub use frontmatter::FrontmatterView;
pub use vault::VaultView;

use crate::host::HostError;
use thiserror::Error;

/// Errors raised by facade operations
#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("No parent folder: {0}")]
    NoParent(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

pub type FacadeResult<T> = Result<T, FacadeError>;
