use super::{FacadeError, FacadeResult, FileView};
use crate::host::{Host, HostError};
use crate::paths;
use std::fmt;
use std::sync::Arc;
use vault_scripts_api::NodeKind;

/// A folder in the host's tree
#[derive(Clone)]
pub struct FolderView {
    host: Arc<dyn Host>,
    path: String,
}

impl FolderView {
    pub(crate) fn new(host: Arc<dyn Host>, path: impl Into<String>) -> Self {
        Self {
            host,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Folder name; empty for the root
    pub fn name(&self) -> &str {
        paths::file_name(&self.path)
    }

    pub fn is_root(&self) -> bool {
        paths::is_root(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.host.node(&self.path) == Some(NodeKind::Folder)
    }

    pub fn parent(&self) -> Option<FolderView> {
        paths::parent(&self.path).map(|parent| FolderView::new(self.host.clone(), parent))
    }

    /// Files below this folder, depth first
    pub fn files(&self, recursive: bool) -> FacadeResult<FileIter> {
        self.ensure_exists()?;
        Ok(FileIter {
            walk: Walk::new(self.host.clone(), &self.path, recursive),
        })
    }

    /// Folders below this folder, depth first
    pub fn folders(&self, recursive: bool) -> FacadeResult<FolderIter> {
        self.ensure_exists()?;
        Ok(FolderIter {
            walk: Walk::new(self.host.clone(), &self.path, recursive),
        })
    }

    /// Copy the folder tree to `to`, which must not exist yet
    pub fn copy(&self, to: &str) -> FacadeResult<FolderView> {
        self.ensure_exists()?;
        let to = paths::normalize(to);
        if self.host.exists(&to) {
            return Err(FacadeError::AlreadyExists(to));
        }
        self.host.copy(&self.path, &to)?;
        Ok(FolderView::new(self.host.clone(), to))
    }

    /// Move to `to`; the view follows the folder
    pub fn rename(&mut self, to: &str) -> FacadeResult<()> {
        self.ensure_mutable()?;
        let to = paths::normalize(to);
        if self.host.exists(&to) {
            return Err(FacadeError::AlreadyExists(to));
        }
        self.host.rename(&self.path, &to)?;
        self.path = to;
        Ok(())
    }

    /// Delete the folder; non-empty folders need `force` unless trashed
    pub fn delete(&self, send_to_trash: bool, force: bool) -> FacadeResult<()> {
        self.ensure_mutable()?;
        if send_to_trash {
            self.host.trash(&self.path)?;
        } else {
            self.host.delete(&self.path, force)?;
        }
        Ok(())
    }

    fn ensure_exists(&self) -> FacadeResult<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(FacadeError::FolderNotFound(self.path.clone()))
        }
    }

    fn ensure_mutable(&self) -> FacadeResult<()> {
        self.ensure_exists()?;
        if self.is_root() {
            return Err(HostError::Unsupported(
                "the root folder cannot be moved or deleted".into(),
            )
            .into());
        }
        Ok(())
    }
}

impl fmt::Debug for FolderView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderView").field("path", &self.path).finish()
    }
}

/// Pre-order walk that lists a folder's children only when descending into it
struct Walk {
    host: Arc<dyn Host>,
    recursive: bool,
    stack: Vec<std::vec::IntoIter<(String, NodeKind)>>,
    pending: Option<String>,
}

impl Walk {
    fn new(host: Arc<dyn Host>, root: &str, recursive: bool) -> Self {
        Self {
            host,
            recursive,
            stack: Vec::new(),
            pending: Some(root.to_string()),
        }
    }

    fn descend(&mut self, folder: &str) {
        match self.host.children(folder) {
            Ok(children) => self.stack.push(children.into_iter()),
            Err(e) => tracing::warn!(path = %folder, error = %e, "Skipping unreadable folder"),
        }
    }
}

impl Iterator for Walk {
    type Item = (String, NodeKind);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(folder) = self.pending.take() {
            self.descend(&folder);
        }

        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some((path, kind)) => {
                    if self.recursive && kind.is_folder() {
                        self.pending = Some(path.clone());
                    }
                    return Some((path, kind));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Lazy iterator over files, see [`FolderView::files`]
pub struct FileIter {
    walk: Walk,
}

impl Iterator for FileIter {
    type Item = FileView;

    fn next(&mut self) -> Option<FileView> {
        let host = self.walk.host.clone();
        for (path, kind) in self.walk.by_ref() {
            if kind.is_file() {
                return Some(FileView::new(host, path));
            }
        }
        None
    }
}

/// Lazy iterator over folders, see [`FolderView::folders`]
pub struct FolderIter {
    walk: Walk,
}

impl Iterator for FolderIter {
    type Item = FolderView;

    fn next(&mut self) -> Option<FolderView> {
        let host = self.walk.host.clone();
        for (path, kind) in self.walk.by_ref() {
            if kind.is_folder() {
                return Some(FolderView::new(host, path));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use crate::ROOT_PATH;

    fn tree() -> Arc<MemoryHost> {
        Arc::new(
            MemoryHost::new()
                .with_file("a.md", "")
                .with_file("b/c.md", "")
                .with_file("b/d/e.md", "")
                .with_file("b/f.md", "")
                .with_file("g/h.md", ""),
        )
    }

    fn paths_of<I: Iterator<Item = FileView>>(iter: I) -> Vec<String> {
        iter.map(|f| f.path().to_string()).collect()
    }

    #[test]
    fn test_files_non_recursive() {
        let root = FolderView::new(tree(), ROOT_PATH);
        assert_eq!(paths_of(root.files(false).unwrap()), vec!["a.md"]);
    }

    #[test]
    fn test_files_recursive_pre_order() {
        let root = FolderView::new(tree(), ROOT_PATH);
        assert_eq!(
            paths_of(root.files(true).unwrap()),
            vec!["a.md", "b/c.md", "b/d/e.md", "b/f.md", "g/h.md"]
        );
    }

    #[test]
    fn test_folders_recursive() {
        let root = FolderView::new(tree(), ROOT_PATH);
        let folders: Vec<_> = root
            .folders(true)
            .unwrap()
            .map(|f| f.path().to_string())
            .collect();
        assert_eq!(folders, vec!["b", "b/d", "g"]);
    }

    #[test]
    fn test_children_listed_at_descent_time() {
        let host = tree();
        let root = FolderView::new(host.clone(), ROOT_PATH);
        let mut iter = root.folders(true).unwrap();

        let first = iter.next().unwrap();
        assert_eq!(first.path(), "b");
        host.create("b/late/x.md", b"").unwrap();

        let rest: Vec<_> = iter.map(|f| f.path().to_string()).collect();
        assert_eq!(rest, vec!["b/d", "b/late", "g"]);
    }

    #[test]
    fn test_root_cannot_be_deleted() {
        let root = FolderView::new(tree(), ROOT_PATH);
        assert!(root.is_root());
        assert_eq!(root.name(), "");
        assert!(root.delete(false, true).is_err());
    }

    #[test]
    fn test_rename_and_delete() {
        let host = tree();
        let mut folder = FolderView::new(host.clone(), "b");
        folder.rename("moved").unwrap();
        assert_eq!(folder.path(), "moved");
        assert!(host.exists("moved/d/e.md"));

        assert!(folder.delete(false, false).is_err());
        folder.delete(false, true).unwrap();
        assert!(!host.exists("moved"));
    }

    #[test]
    fn test_missing_folder() {
        let folder = FolderView::new(tree(), "zzz");
        assert!(matches!(folder.files(true), Err(FacadeError::FolderNotFound(_))));
    }
}
