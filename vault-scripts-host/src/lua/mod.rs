//! Luau evaluator
//!
//! Each script gets its own interpreter state with a restricted standard
//! library. The chunk runs in an environment table that only exposes an
//! explicit whitelist of globals, the `VaultScript` base class and inert
//! placeholders for ambient globals.

mod bindings;

use crate::facade::{FileView, FolderView, FrontmatterView, VaultView};
use crate::loader::{LoaderError, ScriptEvaluator, ScriptSource};
use crate::module::{HookResult, ScriptModule};
use mlua::{Function, IntoLuaMulti, Lua, LuaOptions, MultiValue, StdLib, Table, Value};
use vault_scripts_api::{Hook, ScriptError};

const PRELUDE: &str = include_str!("prelude.luau");

/// Pure helpers visible to scripts
const WHITELIST: &[&str] = &[
    "assert",
    "error",
    "ipairs",
    "next",
    "pairs",
    "pcall",
    "xpcall",
    "rawequal",
    "rawget",
    "rawset",
    "rawlen",
    "select",
    "setmetatable",
    "getmetatable",
    "tonumber",
    "tostring",
    "type",
    "unpack",
    "string",
    "table",
    "math",
    "utf8",
];

/// Ambient globals replaced by empty tables
const INERT: &[&str] = &["_G", "os", "io", "package", "debug"];

/// Evaluates `.lua` and `.luau` scripts with Luau
#[derive(Debug, Clone, Copy, Default)]
pub struct LuaEvaluator;

impl LuaEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn create_state() -> mlua::Result<(Lua, Table)> {
        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
            LuaOptions::default(),
        )?;
        let prelude: Table = lua.load(PRELUDE).set_name("=prelude").eval()?;
        Ok((lua, prelude))
    }

    fn sandbox_env(lua: &Lua, script: &str, base: Table) -> mlua::Result<Table> {
        let globals = lua.globals();
        let env = lua.create_table()?;

        for key in WHITELIST {
            env.set(*key, globals.get::<Value>(*key)?)?;
        }
        for key in INERT {
            env.set(*key, lua.create_table()?)?;
        }
        env.set("VaultScript", base)?;

        let owner = script.to_string();
        env.set(
            "print",
            lua.create_function(move |_, args: MultiValue| {
                let line = args
                    .iter()
                    .map(|value| value.to_string())
                    .collect::<mlua::Result<Vec<_>>>()?
                    .join("\t");
                tracing::info!(target: "script", script = %owner, "{}", line);
                Ok(())
            })?,
        )?;

        Ok(env)
    }
}

impl ScriptEvaluator for LuaEvaluator {
    fn extensions(&self) -> &[&'static str] {
        &["lua", "luau"]
    }

    fn evaluate(
        &self,
        source: &ScriptSource,
        vault: VaultView,
    ) -> Result<Box<dyn ScriptModule>, LoaderError> {
        let name = source.name.as_str();
        let load_error = |e: mlua::Error| LoaderError::load(name, script_error(&e));

        let (lua, prelude) = Self::create_state().map_err(load_error)?;
        let base: Table = prelude.get("base").map_err(load_error)?;
        let env = Self::sandbox_env(&lua, name, base).map_err(load_error)?;

        let class: Value = lua
            .load(source.text.as_str())
            .set_name(format!("={}", name))
            .set_environment(env)
            .eval()
            .map_err(load_error)?;

        let is_class: Function = prelude.get("isScriptClass").map_err(load_error)?;
        if !is_class.call::<bool>(class.clone()).map_err(load_error)? {
            return Err(LoaderError::invalid(
                name,
                format!(
                    "the chunk must return a class extending VaultScript, got {}",
                    class.type_name()
                ),
            ));
        }

        let instantiate: Function = prelude.get("instantiate").map_err(load_error)?;
        let instance: Table = instantiate.call((class, vault)).map_err(load_error)?;

        tracing::debug!(script = %name, "Script instantiated");
        Ok(Box::new(LuaScript {
            name: name.to_string(),
            lua,
            instance,
        }))
    }
}

/// A script instance living in its own Luau state
pub struct LuaScript {
    name: String,
    lua: Lua,
    instance: Table,
}

impl LuaScript {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn call_hook(&self, hook: Hook, args: impl IntoLuaMulti) -> HookResult {
        self.try_call_hook(hook, args)
            .map_err(|e| script_error(&e))
    }

    fn try_call_hook(&self, hook: Hook, args: impl IntoLuaMulti) -> mlua::Result<()> {
        let method: Value = self.instance.get(hook.name())?;
        let method = match method {
            Value::Nil => return Ok(()),
            Value::Function(method) => method,
            other => {
                return Err(mlua::Error::RuntimeError(format!(
                    "{} is a {}, not a function",
                    hook.name(),
                    other.type_name()
                )))
            }
        };

        let mut args = args.into_lua_multi(&self.lua)?;
        args.push_front(Value::Table(self.instance.clone()));
        method.call::<()>(args)
    }
}

impl ScriptModule for LuaScript {
    fn on_load(&self) -> HookResult {
        self.call_hook(Hook::OnLoad, ())
    }

    fn on_unload(&self) -> HookResult {
        self.call_hook(Hook::OnUnload, ())
    }

    fn on_file_created(&self, file: &FileView) -> HookResult {
        self.call_hook(Hook::OnFileCreated, file.clone())
    }

    fn on_file_modified(&self, file: &FileView) -> HookResult {
        self.call_hook(Hook::OnFileModified, file.clone())
    }

    fn on_file_deleted(&self, file: &FileView) -> HookResult {
        self.call_hook(Hook::OnFileDeleted, file.clone())
    }

    fn on_file_renamed(&self, file: &FileView, old_path: &str) -> HookResult {
        self.call_hook(Hook::OnFileRenamed, (file.clone(), old_path.to_string()))
    }

    fn on_file_opened(&self, file: Option<&FileView>) -> HookResult {
        self.call_hook(Hook::OnFileOpened, file.cloned())
    }

    fn on_folder_created(&self, folder: &FolderView) -> HookResult {
        self.call_hook(Hook::OnFolderCreated, folder.clone())
    }

    fn on_folder_deleted(&self, folder: &FolderView) -> HookResult {
        self.call_hook(Hook::OnFolderDeleted, folder.clone())
    }

    fn on_folder_renamed(&self, folder: &FolderView, old_path: &str) -> HookResult {
        self.call_hook(Hook::OnFolderRenamed, (folder.clone(), old_path.to_string()))
    }

    fn on_frontmatter_modified(
        &self,
        file: &FileView,
        frontmatter: &FrontmatterView,
    ) -> HookResult {
        self.call_hook(
            Hook::OnFrontmatterModified,
            (file.clone(), frontmatter.clone()),
        )
    }
}

/// Classify a Lua error, unwrapping errors raised through Rust callbacks
pub(crate) fn script_error(err: &mlua::Error) -> ScriptError {
    match err {
        mlua::Error::SyntaxError { message, .. } => ScriptError::new("SyntaxError", message.clone()),
        mlua::Error::RuntimeError(message) => ScriptError::runtime(message.clone()),
        mlua::Error::CallbackError { cause, .. } => script_error(cause),
        mlua::Error::ExternalError(e) => ScriptError::runtime(e.to_string()),
        other => ScriptError::runtime(other.to_string()),
    }
}
