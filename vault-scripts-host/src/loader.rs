//! Script loader
//!
//! Turns a script's source text into a [`ScriptModule`]. The loader itself
//! only routes by file extension; evaluation is delegated to a
//! [`ScriptEvaluator`].

use crate::facade::VaultView;
use crate::lua::LuaEvaluator;
use crate::module::ScriptModule;
use crate::paths;
use std::sync::Arc;
use thiserror::Error;
use vault_scripts_api::ScriptError;

/// Errors that end an enable attempt before the script is registered
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Invalid script {script}: {reason}")]
    InvalidScript { script: String, reason: String },

    #[error("Failed to load {script}: {source}")]
    Load {
        script: String,
        #[source]
        source: ScriptError,
    },

    #[error("Failed to read {script}: {message}")]
    Read { script: String, message: String },
}

impl LoaderError {
    pub fn invalid(script: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidScript {
            script: script.into(),
            reason: reason.into(),
        }
    }

    pub fn load(script: impl Into<String>, source: ScriptError) -> Self {
        Self::Load {
            script: script.into(),
            source,
        }
    }
}

/// Source text of one script, keyed by its file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub name: String,
    pub text: String,
}

impl ScriptSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn extension(&self) -> &str {
        paths::extension(&self.name)
    }
}

/// Evaluates script sources of one language
pub trait ScriptEvaluator: Send + Sync {
    /// File extensions handled, without the dot
    fn extensions(&self) -> &[&'static str];

    /// Evaluate `source` and instantiate the class it returns
    fn evaluate(
        &self,
        source: &ScriptSource,
        vault: VaultView,
    ) -> Result<Box<dyn ScriptModule>, LoaderError>;
}

/// Routes sources to evaluators by file extension
#[derive(Clone)]
pub struct ScriptLoader {
    evaluators: Vec<Arc<dyn ScriptEvaluator>>,
}

impl ScriptLoader {
    /// Loader with the bundled Lua evaluator
    pub fn new() -> Self {
        Self::empty().with_evaluator(LuaEvaluator::new())
    }

    /// Loader without any evaluator
    pub fn empty() -> Self {
        Self {
            evaluators: Vec::new(),
        }
    }

    /// Add an evaluator; later evaluators win for shared extensions
    pub fn with_evaluator(mut self, evaluator: impl ScriptEvaluator + 'static) -> Self {
        self.evaluators.insert(0, Arc::new(evaluator));
        self
    }

    pub fn extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = self
            .evaluators
            .iter()
            .flat_map(|e| e.extensions().iter().copied())
            .collect();
        extensions.sort_unstable();
        extensions.dedup();
        extensions
    }

    /// Whether a file name has an extension some evaluator handles
    pub fn supports(&self, file_name: &str) -> bool {
        self.evaluator_for(paths::extension(file_name)).is_some()
    }

    pub fn load(
        &self,
        source: &ScriptSource,
        vault: VaultView,
    ) -> Result<Box<dyn ScriptModule>, LoaderError> {
        let evaluator = self.evaluator_for(source.extension()).ok_or_else(|| {
            LoaderError::invalid(
                &source.name,
                format!("no evaluator for extension '{}'", source.extension()),
            )
        })?;

        tracing::debug!(script = %source.name, "Evaluating script");
        evaluator.evaluate(source, vault)
    }

    fn evaluator_for(&self, extension: &str) -> Option<&Arc<dyn ScriptEvaluator>> {
        self.evaluators
            .iter()
            .find(|e| e.extensions().contains(&extension))
    }
}

impl Default for ScriptLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandLedger;
    use crate::memory::MemoryHost;

    struct Nothing;

    impl ScriptModule for Nothing {}

    struct EchoEvaluator;

    impl ScriptEvaluator for EchoEvaluator {
        fn extensions(&self) -> &[&'static str] {
            &["echo"]
        }

        fn evaluate(
            &self,
            _source: &ScriptSource,
            _vault: VaultView,
        ) -> Result<Box<dyn ScriptModule>, LoaderError> {
            Ok(Box::new(Nothing))
        }
    }

    fn vault(name: &str) -> VaultView {
        VaultView::new(Arc::new(MemoryHost::new()), name, CommandLedger::new())
    }

    #[test]
    fn test_routes_by_extension() {
        let loader = ScriptLoader::new().with_evaluator(EchoEvaluator);
        assert!(loader.supports("a.lua"));
        assert!(loader.supports("a.luau"));
        assert!(loader.supports("a.echo"));
        assert!(!loader.supports("a.js"));
        assert_eq!(loader.extensions(), vec!["echo", "lua", "luau"]);

        let source = ScriptSource::new("a.echo", "anything");
        assert!(loader.load(&source, vault("a.echo")).is_ok());
    }

    #[test]
    fn test_unknown_extension_is_invalid() {
        let loader = ScriptLoader::new();
        let source = ScriptSource::new("a.js", "class X {}");
        let err = loader.load(&source, vault("a.js")).err().unwrap();
        assert!(matches!(err, LoaderError::InvalidScript { .. }));
    }

    #[test]
    fn test_empty_loader() {
        let loader = ScriptLoader::empty();
        assert!(loader.extensions().is_empty());
        assert!(!loader.supports("a.lua"));
    }
}
