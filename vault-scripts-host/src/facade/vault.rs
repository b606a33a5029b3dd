use super::{Connectors, FacadeError, FacadeResult, FileView, FolderView, FrontmatterView};
use crate::commands::{CommandAction, CommandLedger, CommandRegistrar};
use crate::host::{Host, ROOT_PATH};
use crate::paths;
use std::fmt;
use std::sync::Arc;
use vault_scripts_api::{NodeKind, Notice};

/// Root view handed to a script, bound to that script's identity
#[derive(Clone)]
pub struct VaultView {
    host: Arc<dyn Host>,
    script: String,
    registrar: CommandRegistrar,
    ledger: CommandLedger,
}

impl VaultView {
    pub fn new(host: Arc<dyn Host>, script: impl Into<String>, ledger: CommandLedger) -> Self {
        let registrar = CommandRegistrar::new(host.clone());
        Self {
            host,
            script: script.into(),
            registrar,
            ledger,
        }
    }

    /// File name of the script this view belongs to
    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn ledger(&self) -> &CommandLedger {
        &self.ledger
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn root(&self) -> FolderView {
        FolderView::new(self.host.clone(), ROOT_PATH)
    }

    pub fn plugins(&self) -> Connectors {
        Connectors::new(self.host.clone())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.host.exists(&paths::normalize(path))
    }

    pub fn get_file(&self, path: &str) -> FacadeResult<FileView> {
        let path = paths::normalize(path);
        match self.host.node(&path) {
            Some(NodeKind::File) => Ok(FileView::new(self.host.clone(), path)),
            _ => Err(FacadeError::FileNotFound(path)),
        }
    }

    pub fn create_file(&self, path: &str, data: &str) -> FacadeResult<FileView> {
        self.create_binary_file(path, data.as_bytes())
    }

    pub fn create_binary_file(&self, path: &str, data: &[u8]) -> FacadeResult<FileView> {
        let path = paths::normalize(path);
        if self.host.exists(&path) {
            return Err(FacadeError::AlreadyExists(path));
        }
        self.host.create(&path, data)?;
        Ok(FileView::new(self.host.clone(), path))
    }

    pub fn get_folder(&self, path: &str) -> FacadeResult<FolderView> {
        let path = paths::normalize(path);
        match self.host.node(&path) {
            Some(NodeKind::Folder) => Ok(FolderView::new(self.host.clone(), path)),
            _ => Err(FacadeError::FolderNotFound(path)),
        }
    }

    pub fn create_folder(&self, path: &str) -> FacadeResult<FolderView> {
        let path = paths::normalize(path);
        if self.host.exists(&path) {
            return Err(FacadeError::AlreadyExists(path));
        }
        self.host.create_folder(&path)?;
        Ok(FolderView::new(self.host.clone(), path))
    }

    /// Front-matter of a file; `None` when the file has no front-matter block
    pub fn frontmatter(&self, path: &str) -> FacadeResult<Option<FrontmatterView>> {
        FrontmatterView::load(self.host.clone(), &paths::normalize(path))
    }

    /// Register a command namespaced by this script's file name
    pub fn add_command(&self, name: &str, action: CommandAction) -> FacadeResult<String> {
        Ok(self
            .registrar
            .add(&self.script, &self.ledger, name, action)?)
    }

    pub fn notify(&self, message: impl Into<String>) {
        self.host.notify(Notice::message(message));
    }
}

impl fmt::Debug for VaultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultView")
            .field("script", &self.script)
            .field("commands", &self.ledger.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;

    fn vault() -> (Arc<MemoryHost>, VaultView) {
        let host = Arc::new(
            MemoryHost::new()
                .with_file("notes/a.md", "---\nk: v\n---\n")
                .with_file("notes/b.md", "plain"),
        );
        let view = VaultView::new(host.clone(), "helper.lua", CommandLedger::new());
        (host, view)
    }

    #[test]
    fn test_get_file_and_folder() {
        let (_, vault) = vault();
        assert_eq!(vault.get_file("/notes/a.md").unwrap().path(), "notes/a.md");
        assert!(matches!(
            vault.get_file("notes"),
            Err(FacadeError::FileNotFound(_))
        ));
        assert_eq!(vault.get_folder("notes").unwrap().name(), "notes");
        assert!(matches!(
            vault.get_folder("notes/a.md"),
            Err(FacadeError::FolderNotFound(_))
        ));
        assert!(vault.root().is_root());
    }

    #[test]
    fn test_create_refuses_existing() {
        let (host, vault) = vault();
        let created = vault.create_file("new/c.md", "hi").unwrap();
        assert_eq!(host.read(created.path()).unwrap(), "hi");
        assert!(matches!(
            vault.create_file("new/c.md", "again"),
            Err(FacadeError::AlreadyExists(_))
        ));
        assert!(matches!(
            vault.create_folder("notes"),
            Err(FacadeError::AlreadyExists(_))
        ));
        assert!(vault.create_folder("empty").unwrap().exists());
    }

    #[test]
    fn test_frontmatter_lookup() {
        let (_, vault) = vault();
        assert!(vault.frontmatter("notes/a.md").unwrap().is_some());
        assert!(vault.frontmatter("notes/b.md").unwrap().is_none());
        assert!(vault.frontmatter("missing.md").is_err());
    }

    #[test]
    fn test_add_command_records_ledger() {
        let (host, vault) = vault();
        let id = vault
            .add_command("Go", CommandAction::run(|| Ok(())))
            .unwrap();
        assert_eq!(id, "helper-lua:Go");
        assert!(vault.ledger().contains(&id));
        assert!(host.commands().contains(&id));
    }

    #[test]
    fn test_notify() {
        let (host, vault) = vault();
        vault.notify("hello");
        assert_eq!(host.notices(), vec![Notice::message("hello")]);
    }
}
