//! The hook surface of a loaded script

use crate::facade::{FileView, FolderView, FrontmatterView};
use vault_scripts_api::ScriptError;

pub type HookResult = Result<(), ScriptError>;

/// A loaded script object
///
/// Every hook defaults to a no-op so evaluators only forward the hooks a
/// script actually defines. Hooks are called one at a time, never while the
/// registry is locked.
pub trait ScriptModule: Send + Sync {
    fn on_load(&self) -> HookResult {
        Ok(())
    }

    fn on_unload(&self) -> HookResult {
        Ok(())
    }

    fn on_file_created(&self, _file: &FileView) -> HookResult {
        Ok(())
    }

    fn on_file_modified(&self, _file: &FileView) -> HookResult {
        Ok(())
    }

    fn on_file_deleted(&self, _file: &FileView) -> HookResult {
        Ok(())
    }

    fn on_file_renamed(&self, _file: &FileView, _old_path: &str) -> HookResult {
        Ok(())
    }

    /// `None` when no file is active any more
    fn on_file_opened(&self, _file: Option<&FileView>) -> HookResult {
        Ok(())
    }

    fn on_folder_created(&self, _folder: &FolderView) -> HookResult {
        Ok(())
    }

    fn on_folder_deleted(&self, _folder: &FolderView) -> HookResult {
        Ok(())
    }

    fn on_folder_renamed(&self, _folder: &FolderView, _old_path: &str) -> HookResult {
        Ok(())
    }

    fn on_frontmatter_modified(
        &self,
        _file: &FileView,
        _frontmatter: &FrontmatterView,
    ) -> HookResult {
        Ok(())
    }
}
