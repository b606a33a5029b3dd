//! vault-scripts-api: Shared types for the vault-scripts runtime
//!
//! This crate defines the vocabulary shared by hosts, the script runtime and
//! script authors: hook names, node kinds, front-matter values, notices and
//! the type-declaration file installed next to user scripts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// API version for compatibility checking
pub const API_VERSION: u32 = 1;

/// LuaLS type declarations describing the script-facing API
pub const TYPE_DEFINITIONS: &str = include_str!("../types/vault-scripts.d.lua");

/// Prefix shared by every installed type-declaration file
pub const TYPE_DEFINITIONS_PREFIX: &str = "vault-scripts-";

/// Suffix shared by every installed type-declaration file
pub const TYPE_DEFINITIONS_SUFFIX: &str = ".d.lua";

/// File name of the type declarations matching this crate version
pub fn type_definitions_file_name() -> String {
    format!(
        "{}{}{}",
        TYPE_DEFINITIONS_PREFIX,
        env!("CARGO_PKG_VERSION"),
        TYPE_DEFINITIONS_SUFFIX
    )
}

/// A single front-matter value (string, number, boolean, list or map)
pub type FrontmatterValue = serde_json::Value;

/// A front-matter block: key/value pairs in insertion order
pub type Frontmatter = serde_json::Map<String, FrontmatterValue>;

/// Kind of a storage node in the host's tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub fn is_file(self) -> bool {
        self == NodeKind::File
    }

    pub fn is_folder(self) -> bool {
        self == NodeKind::Folder
    }
}

/// File timestamps and size as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Creation time in milliseconds since the Unix epoch
    pub ctime: i64,
    /// Last modification time in milliseconds since the Unix epoch
    pub mtime: i64,
    /// Size in bytes
    pub size: u64,
}

/// Hooks a script can implement
///
/// `name()` is the method name looked up on the script object, `label()` is
/// the human readable event name used in logs and error notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hook {
    OnLoad,
    OnUnload,
    OnFileCreated,
    OnFileModified,
    OnFileDeleted,
    OnFileRenamed,
    OnFileOpened,
    OnFolderCreated,
    OnFolderDeleted,
    OnFolderRenamed,
    OnFrontmatterModified,
}

impl Hook {
    /// The nine event hooks, in declaration order
    pub const EVENTS: [Hook; 9] = [
        Hook::OnFileCreated,
        Hook::OnFileModified,
        Hook::OnFileDeleted,
        Hook::OnFileRenamed,
        Hook::OnFileOpened,
        Hook::OnFolderCreated,
        Hook::OnFolderDeleted,
        Hook::OnFolderRenamed,
        Hook::OnFrontmatterModified,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Hook::OnLoad => "onLoad",
            Hook::OnUnload => "onUnload",
            Hook::OnFileCreated => "onFileCreated",
            Hook::OnFileModified => "onFileModified",
            Hook::OnFileDeleted => "onFileDeleted",
            Hook::OnFileRenamed => "onFileRenamed",
            Hook::OnFileOpened => "onFileOpened",
            Hook::OnFolderCreated => "onFolderCreated",
            Hook::OnFolderDeleted => "onFolderDeleted",
            Hook::OnFolderRenamed => "onFolderRenamed",
            Hook::OnFrontmatterModified => "onFrontmatterModified",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Hook::OnLoad => "On Load",
            Hook::OnUnload => "On Unload",
            Hook::OnFileCreated => "On File Created",
            Hook::OnFileModified => "On File Modified",
            Hook::OnFileDeleted => "On File Deleted",
            Hook::OnFileRenamed => "On File Renamed",
            Hook::OnFileOpened => "On File Opened",
            Hook::OnFolderCreated => "On Folder Created",
            Hook::OnFolderDeleted => "On Folder Deleted",
            Hook::OnFolderRenamed => "On Folder Renamed",
            Hook::OnFrontmatterModified => "On Frontmatter Modified",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error raised by a script while running one of its hooks or commands
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{kind}] {message}")]
pub struct ScriptError {
    /// Error class, e.g. `RuntimeError` or `SyntaxError`
    pub kind: String,
    /// Error message as raised by the script
    pub message: String,
}

impl ScriptError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a `RuntimeError`
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }
}

/// A user-visible, non-blocking notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Notice {
    /// Plain message sent by a script
    Message { message: String },
    /// A script failed; `event` names where (e.g. "On Load")
    ScriptError {
        event: String,
        script: String,
        message: String,
    },
}

impl Notice {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn script_error(
        event: impl Into<String>,
        script: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ScriptError {
            event: event.into(),
            script: script.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::ScriptError { .. })
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Message { message } => f.write_str(message),
            Notice::ScriptError {
                event,
                script,
                message,
            } => write!(
                f,
                "Script error\n  Event: {}\n  Script: {}\n  Message: {}",
                event, script, message
            ),
        }
    }
}

/// Icon assigned to a file or folder by an icon connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    /// Icon name including its pack prefix
    pub name: String,
    /// Optional CSS color
    #[serde(default)]
    pub color: Option<String>,
}

impl Icon {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_names_are_camel_case() {
        assert_eq!(Hook::OnFileRenamed.name(), "onFileRenamed");
        assert_eq!(Hook::OnFrontmatterModified.name(), "onFrontmatterModified");
        assert_eq!(Hook::OnLoad.label(), "On Load");
        assert_eq!(Hook::EVENTS.len(), 9);
        assert!(!Hook::EVENTS.contains(&Hook::OnLoad));
    }

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::runtime("boom");
        assert_eq!(err.to_string(), "[RuntimeError] boom");
    }

    #[test]
    fn test_notice_serialization() {
        let notice = Notice::script_error("On Load", "a.lua", "[RuntimeError] boom");
        let json = serde_json::to_string(&notice).unwrap();
        assert!(json.contains("\"type\":\"script_error\""));

        let decoded: Notice = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, notice);
        assert!(decoded.is_error());
        assert!(decoded.to_string().contains("Script: a.lua"));
    }

    #[test]
    fn test_type_definitions_file_name() {
        let name = type_definitions_file_name();
        assert!(name.starts_with(TYPE_DEFINITIONS_PREFIX));
        assert!(name.ends_with(TYPE_DEFINITIONS_SUFFIX));
        assert!(name.contains(env!("CARGO_PKG_VERSION")));
        assert!(TYPE_DEFINITIONS.contains("VaultScript"));
    }
}
