use super::{FacadeError, FacadeResult};
use crate::frontmatter::MetadataTypes;
use crate::host::Host;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use vault_scripts_api::{Frontmatter, FrontmatterValue, NodeKind};

/// Working copy of one file's front-matter
///
/// Edits stay in the view until [`FrontmatterView::apply`] writes them back.
/// Clones share the same working copy.
#[derive(Clone)]
pub struct FrontmatterView {
    host: Arc<dyn Host>,
    path: String,
    values: Arc<Mutex<Frontmatter>>,
    types: Arc<MetadataTypes>,
}

impl FrontmatterView {
    pub(crate) fn new(host: Arc<dyn Host>, path: impl Into<String>, values: Frontmatter) -> Self {
        let types = host.metadata_types();
        Self {
            host,
            path: path.into(),
            values: Arc::new(Mutex::new(values)),
            types,
        }
    }

    /// Snapshot the current front-matter of `path`; `None` when it has none
    pub(crate) fn load(host: Arc<dyn Host>, path: &str) -> FacadeResult<Option<Self>> {
        if host.node(path) != Some(NodeKind::File) {
            return Err(FacadeError::FileNotFound(path.to_string()));
        }
        let values = host.metadata(path).and_then(|cache| cache.frontmatter);
        Ok(values.map(|values| Self::new(host, path, values)))
    }

    /// Path of the file this front-matter belongs to
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Key/value pairs in insertion order
    pub fn entries(&self) -> Vec<(String, FrontmatterValue)> {
        self.values
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.lock().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }

    pub fn get(&self, key: &str) -> FacadeResult<FrontmatterValue> {
        self.values
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| FacadeError::KeyNotFound(key.to_string()))
    }

    pub fn set(&self, key: impl Into<String>, value: FrontmatterValue) {
        self.values.lock().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<FrontmatterValue> {
        self.values.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Per key: `Some(valid)` against its registered property type, `None` if untyped
    pub fn validate(&self) -> Vec<(String, Option<bool>)> {
        self.values
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), self.types.validate(key, value)))
            .collect()
    }

    /// Write the working copy back to the file
    ///
    /// Keys present in the file but absent from the view are removed.
    pub fn apply(&self) -> FacadeResult<()> {
        let values = self.values.lock().clone();
        self.host.process_frontmatter(&self.path, &mut |frontmatter| {
            frontmatter.retain(|key, _| values.contains_key(key));
            for (key, value) in &values {
                frontmatter.insert(key.clone(), value.clone());
            }
        })?;
        tracing::debug!(path = %self.path, keys = values.len(), "Front-matter applied");
        Ok(())
    }
}

impl fmt::Debug for FrontmatterView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontmatterView")
            .field("path", &self.path)
            .field("values", &*self.values.lock())
            .finish()
    }
}
