//! Lua bindings for the facade views
//!
//! Method and field names follow the camelCase hook naming scripts use.

use super::script_error;
use crate::commands::CommandAction;
use crate::facade::{
    Connector, Connectors, FacadeError, FileView, FolderView, FrontmatterView, IconConnector,
    VaultView,
};
use crate::paths;
use mlua::{
    Function, Lua, LuaSerdeExt, MetaMethod, MultiValue, SerializeOptions, UserData,
    UserDataFields, UserDataMethods, Value,
};
use vault_scripts_api::{FrontmatterValue, Icon};

/// Largest integer a Luau number holds exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn external(err: FacadeError) -> mlua::Error {
    mlua::Error::external(err)
}

/// Convert a front-matter value; JSON null becomes nil
pub(crate) fn to_lua_value(lua: &Lua, value: &FrontmatterValue) -> mlua::Result<Value> {
    lua.to_value_with(
        value,
        SerializeOptions::new()
            .serialize_none_to_null(false)
            .serialize_unit_to_null(false),
    )
}

/// Convert a Lua value into a front-matter value
///
/// Luau numbers are doubles; whole numbers are stored as integers.
pub(crate) fn from_lua_value(lua: &Lua, value: Value) -> mlua::Result<FrontmatterValue> {
    let mut converted: FrontmatterValue = lua.from_value(value)?;
    integral_numbers(&mut converted);
    Ok(converted)
}

fn integral_numbers(value: &mut FrontmatterValue) {
    match value {
        FrontmatterValue::Number(n) => {
            let whole = n
                .as_f64()
                .filter(|f| n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER);
            if let Some(f) = whole {
                *n = serde_json::Number::from(f as i64);
            }
        }
        FrontmatterValue::Array(items) => items.iter_mut().for_each(integral_numbers),
        FrontmatterValue::Object(map) => map.values_mut().for_each(integral_numbers),
        _ => {}
    }
}

/// Resolve a path string, a file view or a folder view to a vault path
fn node_path(value: &Value) -> mlua::Result<String> {
    match value {
        Value::String(s) => Ok(paths::normalize(&s.to_str()?)),
        Value::UserData(ud) => {
            if let Ok(file) = ud.borrow::<FileView>() {
                return Ok(file.path().to_string());
            }
            if let Ok(folder) = ud.borrow::<FolderView>() {
                return Ok(folder.path().to_string());
            }
            Err(mlua::Error::RuntimeError(
                "expected a file, a folder or a path".to_string(),
            ))
        }
        other => Err(mlua::Error::RuntimeError(format!(
            "expected a file, a folder or a path, got {}",
            other.type_name()
        ))),
    }
}

/// A Lua function kept callable after the script that created it is gone
struct LuaCallback {
    _lua: Lua,
    function: Function,
}

impl LuaCallback {
    fn into_action(self, perform_check: bool) -> CommandAction {
        if perform_check {
            CommandAction::check(move |checking| {
                self.function
                    .call::<Option<bool>>(checking)
                    .map(|available| available.unwrap_or(false))
                    .map_err(|e| script_error(&e))
            })
        } else {
            CommandAction::run(move || {
                self.function
                    .call::<()>(())
                    .map_err(|e| script_error(&e))
            })
        }
    }
}

impl UserData for VaultView {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("root", |_, this| Ok(this.root()));
        fields.add_field_method_get("plugins", |_, this| Ok(this.plugins()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("exists", |_, this, path: String| Ok(this.exists(&path)));

        methods.add_method("getFile", |_, this, path: String| {
            this.get_file(&path).map_err(external)
        });

        methods.add_method(
            "createFile",
            |_, this, (path, data): (String, Option<String>)| {
                this.create_file(&path, data.as_deref().unwrap_or(""))
                    .map_err(external)
            },
        );

        methods.add_method(
            "createBinaryFile",
            |_, this, (path, data): (String, mlua::String)| {
                this.create_binary_file(&path, &data.as_bytes())
                    .map_err(external)
            },
        );

        methods.add_method("getFolder", |_, this, path: String| {
            this.get_folder(&path).map_err(external)
        });

        methods.add_method("createFolder", |_, this, path: String| {
            this.create_folder(&path).map_err(external)
        });

        methods.add_method("getFrontmatter", |_, this, file: Value| {
            let path = node_path(&file)?;
            this.frontmatter(&path).map_err(external)
        });

        methods.add_method(
            "addCommand",
            |lua, this, (name, function, perform_check): (String, Function, Option<bool>)| {
                let callback = LuaCallback {
                    _lua: lua.clone(),
                    function,
                };
                this.add_command(&name, callback.into_action(perform_check.unwrap_or(false)))
                    .map_err(external)
            },
        );

        methods.add_method("notify", |_, this, message: String| {
            this.notify(message);
            Ok(())
        });
    }
}

impl UserData for FileView {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("name", |_, this| Ok(this.name().to_string()));
        fields.add_field_method_get("baseName", |_, this| Ok(this.basename().to_string()));
        fields.add_field_method_get("extension", |_, this| Ok(this.extension().to_string()));
        fields.add_field_method_get("path", |_, this| Ok(this.path().to_string()));
        fields.add_field_method_get("createdDate", |_, this| {
            this.created()
                .map(|date| date.to_rfc3339())
                .map_err(external)
        });
        fields.add_field_method_get("lastModifiedDate", |_, this| {
            this.modified()
                .map(|date| date.to_rfc3339())
                .map_err(external)
        });
        fields.add_field_method_get("parent", |_, this| this.parent().map_err(external));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("copy", |_, this, to: String| {
            this.copy(&to).map_err(external)
        });
        methods.add_method_mut("rename", |_, this, to: String| {
            this.rename(&to).map_err(external)
        });
        methods.add_method("read", |_, this, ()| this.read().map_err(external));
        methods.add_method("readBinary", |lua, this, ()| {
            let bytes = this.read_binary().map_err(external)?;
            lua.create_string(&bytes)
        });
        methods.add_method("update", |_, this, data: String| {
            this.update(&data).map_err(external)
        });
        methods.add_method("updateBinary", |_, this, data: mlua::String| {
            this.update_binary(&data.as_bytes()).map_err(external)
        });
        methods.add_method("append", |_, this, data: String| {
            this.append(&data).map_err(external)
        });
        methods.add_method("delete", |_, this, send_to_trash: Option<bool>| {
            this.delete(send_to_trash.unwrap_or(false))
                .map_err(external)
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("FileView({})", this.path()))
        });
    }
}

impl UserData for FolderView {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("name", |_, this| Ok(this.name().to_string()));
        fields.add_field_method_get("path", |_, this| Ok(this.path().to_string()));
        fields.add_field_method_get("isRoot", |_, this| Ok(this.is_root()));
        fields.add_field_method_get("parent", |_, this| Ok(this.parent()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("files", |lua, this, recursive: Option<bool>| {
            let mut files = this.files(recursive.unwrap_or(false)).map_err(external)?;
            lua.create_function_mut(move |_, _: MultiValue| Ok(files.next()))
        });
        methods.add_method("folders", |lua, this, recursive: Option<bool>| {
            let mut folders = this
                .folders(recursive.unwrap_or(false))
                .map_err(external)?;
            lua.create_function_mut(move |_, _: MultiValue| Ok(folders.next()))
        });
        methods.add_method("copy", |_, this, to: String| {
            this.copy(&to).map_err(external)
        });
        methods.add_method_mut("rename", |_, this, to: String| {
            this.rename(&to).map_err(external)
        });
        methods.add_method(
            "delete",
            |_, this, (send_to_trash, force): (Option<bool>, Option<bool>)| {
                this.delete(send_to_trash.unwrap_or(false), force.unwrap_or(false))
                    .map_err(external)
            },
        );
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("FolderView({})", this.path()))
        });
    }
}

impl UserData for FrontmatterView {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("entries", |lua, this, ()| {
            let mut entries = this.entries().into_iter();
            lua.create_function_mut(move |lua, _: MultiValue| match entries.next() {
                Some((key, value)) => Ok((Some(key), to_lua_value(lua, &value)?)),
                None => Ok((None, Value::Nil)),
            })
        });
        methods.add_method("keys", |_, this, ()| Ok(this.keys()));
        methods.add_method("contains", |_, this, key: String| Ok(this.contains(&key)));
        methods.add_method("get", |lua, this, key: String| {
            let value = this.get(&key).map_err(external)?;
            to_lua_value(lua, &value)
        });
        methods.add_method("set", |lua, this, (key, value): (String, Value)| {
            this.set(key, from_lua_value(lua, value)?);
            Ok(())
        });
        methods.add_method("remove", |lua, this, key: String| match this.remove(&key) {
            Some(value) => to_lua_value(lua, &value),
            None => Ok(Value::Nil),
        });
        methods.add_method("validate", |lua, this, ()| {
            let mut results = this.validate().into_iter();
            lua.create_function_mut(move |_, _: MultiValue| match results.next() {
                Some((key, valid)) => Ok((Some(key), valid)),
                None => Ok((None, None)),
            })
        });
        methods.add_method("apply", |_, this, ()| this.apply().map_err(external));
    }
}

impl UserData for Connectors {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("keys", |_, this, ()| Ok(this.keys()));
        methods.add_method("contains", |_, this, id: String| Ok(this.contains(&id)));
        methods.add_method("get", |_, this, id: String| {
            Ok(this.get(&id).map(|connector| match connector {
                Connector::Icons(icons) => icons,
            }))
        });
    }
}

impl UserData for IconConnector {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("getIcon", |lua, this, node: Value| {
            let path = node_path(&node)?;
            match this.icon(&path) {
                Some(icon) => lua.to_value(&icon),
                None => Ok(Value::Nil),
            }
        });
        methods.add_method("setIcon", |lua, this, (node, icon): (Value, Value)| {
            let path = node_path(&node)?;
            let icon = match icon {
                Value::String(name) => Icon::new(name.to_str()?.to_string()),
                other => lua.from_value::<Icon>(other)?,
            };
            this.set_icon(&path, icon)
                .map_err(|e| external(e.into()))
        });
        methods.add_method("removeIcon", |_, this, node: Value| {
            let path = node_path(&node)?;
            this.remove_icon(&path).map_err(|e| external(e.into()))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandLedger;
    use crate::host::Host;
    use crate::loader::{ScriptEvaluator, ScriptSource};
    use crate::lua::LuaEvaluator;
    use crate::memory::MemoryHost;
    use serde_json::json;
    use std::sync::Arc;
    use vault_scripts_api::Notice;

    /// Run `body` as the `onLoad` hook of a script named `t.lua`
    fn run_on_load(
        host: &Arc<MemoryHost>,
        body: &str,
    ) -> Result<(), vault_scripts_api::ScriptError> {
        let text = format!(
            "local S = VaultScript:extend()\nfunction S:onLoad()\nlocal vault = self.vault\n{}\nend\nreturn S",
            body
        );
        let vault = VaultView::new(host.clone(), "t.lua", CommandLedger::new());
        let script = LuaEvaluator::new()
            .evaluate(&ScriptSource::new("t.lua", text), vault)
            .map_err(|e| vault_scripts_api::ScriptError::runtime(e.to_string()))?;
        script.on_load()
    }

    #[test]
    fn test_file_fields_and_methods() {
        let host = Arc::new(MemoryHost::new().with_file("notes/Log.md", "a"));
        run_on_load(
            &host,
            r#"
            local f = vault:getFile("notes/Log.md")
            assert(f.name == "Log.md" and f.baseName == "Log" and f.extension == "md")
            assert(f.parent.path == "notes")
            assert(type(f.createdDate) == "string")
            f:append("b")
            f:rename("archive/Log.md")
            assert(f.path == "archive/Log.md")
            vault:notify(f:read())
            "#,
        )
        .unwrap();
        assert_eq!(host.notices(), vec![Notice::message("ab")]);
    }

    #[test]
    fn test_folder_iteration() {
        let host = Arc::new(
            MemoryHost::new()
                .with_file("a.md", "")
                .with_file("d/b.md", "")
                .with_file("d/e/c.md", ""),
        );
        run_on_load(
            &host,
            r#"
            local names = {}
            for file in vault.root:files(true) do
                table.insert(names, file.path)
            end
            local shallow = 0
            for _ in vault.root:files() do shallow += 1 end
            local folders = 0
            for _ in vault.root:folders(true) do folders += 1 end
            vault:notify(table.concat(names, ",") .. "|" .. shallow .. "|" .. folders)
            "#,
        )
        .unwrap();
        assert_eq!(
            host.notices(),
            vec![Notice::message("a.md,d/b.md,d/e/c.md|1|2")]
        );
    }

    #[test]
    fn test_frontmatter_round_trip() {
        let host = Arc::new(
            MemoryHost::new().with_file("n.md", "---\ntitle: Old\ncount: 1\n---\nBody"),
        );
        run_on_load(
            &host,
            r#"
            local fm = vault:getFrontmatter("n.md")
            assert(fm:contains("title"))
            assert(fm:get("count") == 1)
            fm:set("title", "New")
            fm:set("count", fm:get("count") + 1)
            fm:set("tags", { "a", "b" })
            fm:apply()
            "#,
        )
        .unwrap();

        let cache = host.metadata("n.md").unwrap();
        let fm = cache.frontmatter.unwrap();
        assert_eq!(fm.get("title"), Some(&json!("New")));
        assert_eq!(fm.get("count"), Some(&json!(2)));
        assert_eq!(fm.get("tags"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_frontmatter_entries_in_order() {
        let host = Arc::new(MemoryHost::new().with_file("n.md", "---\nz: 1\na: 2\n---\n"));
        run_on_load(
            &host,
            r#"
            local keys = {}
            for key, value in vault:getFrontmatter(vault:getFile("n.md")):entries() do
                table.insert(keys, key .. "=" .. tostring(value))
            end
            vault:notify(table.concat(keys, ","))
            "#,
        )
        .unwrap();
        assert_eq!(host.notices(), vec![Notice::message("z=1,a=2")]);
    }

    #[test]
    fn test_get_missing_key_raises() {
        let host = Arc::new(MemoryHost::new().with_file("n.md", "---\na: 1\n---\n"));
        let err = run_on_load(&host, r#"vault:getFrontmatter("n.md"):get("nope")"#).unwrap_err();
        assert!(err.message.contains("Key not found: nope"));
    }

    #[test]
    fn test_add_command_from_lua() {
        let host = Arc::new(MemoryHost::new());
        run_on_load(
            &host,
            r#"
            vault:addCommand("Say Hi", function() vault:notify("hi") end)
            vault:addCommand("Never", function(checking)
                if checking then return false end
                vault:notify("should not run")
            end, true)
            "#,
        )
        .unwrap();

        let commands = host.commands();
        assert!(commands.execute("t-lua:Say-Hi").unwrap());
        assert!(!commands.execute("t-lua:Never").unwrap());
        assert_eq!(host.notices(), vec![Notice::message("hi")]);
        assert_eq!(commands.get("t-lua:Say-Hi").unwrap().name, "t: Say Hi");
    }

    #[test]
    fn test_icons_connector_from_lua() {
        let host = Arc::new(MemoryHost::new().with_icons().with_file("a.md", ""));
        run_on_load(
            &host,
            r#"
            assert(vault.plugins:contains("icons"))
            local icons = vault.plugins:get("icons")
            icons:setIcon(vault:getFile("a.md"), { name = "LiStar", color = "gold" })
            local icon = icons:getIcon("a.md")
            vault:notify(icon.name .. "/" .. icon.color)
            icons:removeIcon("a.md")
            assert(icons:getIcon("a.md") == nil)
            assert(vault.plugins:get("missing") == nil)
            "#,
        )
        .unwrap();
        assert_eq!(host.notices(), vec![Notice::message("LiStar/gold")]);
    }

    #[test]
    fn test_integral_numbers() {
        let mut value = json!({"a": 2.0, "b": [1.5, 3.0]});
        integral_numbers(&mut value);
        assert_eq!(value, json!({"a": 2, "b": [1.5, 3]}));
    }
}
