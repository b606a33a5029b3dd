use super::{FacadeError, FacadeResult, FolderView};
use crate::host::Host;
use crate::paths;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use vault_scripts_api::NodeKind;

/// A file in the host's tree
#[derive(Clone)]
pub struct FileView {
    host: Arc<dyn Host>,
    path: String,
}

impl FileView {
    pub(crate) fn new(host: Arc<dyn Host>, path: impl Into<String>) -> Self {
        Self {
            host,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        paths::file_name(&self.path)
    }

    pub fn basename(&self) -> &str {
        paths::basename(&self.path)
    }

    pub fn extension(&self) -> &str {
        paths::extension(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.host.node(&self.path) == Some(NodeKind::File)
    }

    pub fn created(&self) -> FacadeResult<DateTime<Utc>> {
        self.ensure_exists()?;
        let stat = self.host.stat(&self.path)?;
        Ok(DateTime::from_timestamp_millis(stat.ctime).unwrap_or_default())
    }

    pub fn modified(&self) -> FacadeResult<DateTime<Utc>> {
        self.ensure_exists()?;
        let stat = self.host.stat(&self.path)?;
        Ok(DateTime::from_timestamp_millis(stat.mtime).unwrap_or_default())
    }

    pub fn parent(&self) -> FacadeResult<FolderView> {
        let parent =
            paths::parent(&self.path).ok_or_else(|| FacadeError::NoParent(self.path.clone()))?;
        Ok(FolderView::new(self.host.clone(), parent))
    }

    /// Copy to `to`, which must not exist yet
    pub fn copy(&self, to: &str) -> FacadeResult<FileView> {
        self.ensure_exists()?;
        let to = paths::normalize(to);
        if self.host.exists(&to) {
            return Err(FacadeError::AlreadyExists(to));
        }
        self.host.copy(&self.path, &to)?;
        Ok(FileView::new(self.host.clone(), to))
    }

    /// Move to `to`; the view follows the file
    pub fn rename(&mut self, to: &str) -> FacadeResult<()> {
        self.ensure_exists()?;
        let to = paths::normalize(to);
        if self.host.exists(&to) {
            return Err(FacadeError::AlreadyExists(to));
        }
        self.host.rename(&self.path, &to)?;
        self.path = to;
        Ok(())
    }

    pub fn read(&self) -> FacadeResult<String> {
        self.ensure_exists()?;
        Ok(self.host.read(&self.path)?)
    }

    pub fn read_binary(&self) -> FacadeResult<Vec<u8>> {
        self.ensure_exists()?;
        Ok(self.host.read_binary(&self.path)?)
    }

    pub fn update(&self, data: &str) -> FacadeResult<()> {
        self.ensure_exists()?;
        Ok(self.host.write(&self.path, data)?)
    }

    pub fn update_binary(&self, data: &[u8]) -> FacadeResult<()> {
        self.ensure_exists()?;
        Ok(self.host.write_binary(&self.path, data)?)
    }

    pub fn append(&self, data: &str) -> FacadeResult<()> {
        self.ensure_exists()?;
        Ok(self.host.append(&self.path, data)?)
    }

    pub fn delete(&self, send_to_trash: bool) -> FacadeResult<()> {
        self.ensure_exists()?;
        if send_to_trash {
            self.host.trash(&self.path)?;
        } else {
            self.host.delete(&self.path, false)?;
        }
        Ok(())
    }

    fn ensure_exists(&self) -> FacadeResult<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(FacadeError::FileNotFound(self.path.clone()))
        }
    }
}

impl fmt::Debug for FileView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileView").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;

    fn host() -> Arc<dyn Host> {
        Arc::new(
            MemoryHost::new()
                .with_file("notes/Daily Log.md", "hello")
                .with_file("notes/other.md", "x"),
        )
    }

    #[test]
    fn test_name_parts() {
        let file = FileView::new(host(), "notes/Daily Log.md");
        assert_eq!(file.name(), "Daily Log.md");
        assert_eq!(file.basename(), "Daily Log");
        assert_eq!(file.extension(), "md");
        assert_eq!(file.parent().unwrap().path(), "notes");
    }

    #[test]
    fn test_read_update_append() {
        let file = FileView::new(host(), "notes/Daily Log.md");
        file.update("one").unwrap();
        file.append(" two").unwrap();
        assert_eq!(file.read().unwrap(), "one two");
        assert_eq!(file.read_binary().unwrap(), b"one two".to_vec());
    }

    #[test]
    fn test_rename_follows_file() {
        let host = host();
        let mut file = FileView::new(host.clone(), "notes/Daily Log.md");
        file.rename("archive/log.md").unwrap();

        assert_eq!(file.path(), "archive/log.md");
        assert_eq!(file.read().unwrap(), "hello");
        assert!(!host.exists("notes/Daily Log.md"));
    }

    #[test]
    fn test_copy_refuses_existing_target() {
        let file = FileView::new(host(), "notes/Daily Log.md");
        let err = file.copy("notes/other.md").unwrap_err();
        assert!(matches!(err, FacadeError::AlreadyExists(_)));

        let copy = file.copy("notes/copy.md").unwrap();
        assert_eq!(copy.read().unwrap(), "hello");
    }

    #[test]
    fn test_missing_file() {
        let file = FileView::new(host(), "nope.md");
        assert!(matches!(file.read(), Err(FacadeError::FileNotFound(_))));
        assert!(matches!(file.delete(true), Err(FacadeError::FileNotFound(_))));
    }

    #[test]
    fn test_delete() {
        let host = host();
        FileView::new(host.clone(), "notes/other.md")
            .delete(false)
            .unwrap();
        assert!(!host.exists("notes/other.md"));
    }
}
