//! Command handler tests over a temporary vault

use std::fs;
use tempfile::TempDir;
use vault_scripts::app::{self, Vault};
use vault_scripts_api::type_definitions_file_name;
use vault_scripts_host::directory::SCRIPTS_DIR;
use vault_scripts_host::discovery::TYPES_DIR;

const JOURNAL: &str = r##"
local Journal = VaultScript:extend()

function Journal:constructor(vault)
    vault:addCommand("New entry", function()
        vault:createFile("entry.md", "# Today\n")
        vault:notify("created entry.md")
    end)
end

return Journal
"##;

fn vault_with_scripts(scripts: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(SCRIPTS_DIR);
    fs::create_dir_all(&dir).unwrap();
    for (name, text) in scripts {
        fs::write(dir.join(name), text).unwrap();
    }
    temp
}

#[tokio::test]
async fn test_init_creates_scripts_folder_once() {
    let temp = TempDir::new().unwrap();
    let vault = Vault::open(temp.path()).unwrap();

    let first = app::init(&vault).await.unwrap();
    assert!(first.starts_with("Created"));
    assert!(temp
        .path()
        .join(SCRIPTS_DIR)
        .join(TYPES_DIR)
        .join(type_definitions_file_name())
        .exists());

    let second = app::init(&vault).await.unwrap();
    assert!(second.starts_with("Type declarations:"));
}

#[tokio::test]
async fn test_enable_list_disable() {
    let temp = vault_with_scripts(&[("journal.lua", JOURNAL), ("other.lua", JOURNAL)]);
    let vault = Vault::open(temp.path()).unwrap();

    assert_eq!(
        app::enable(&vault, "journal.lua").await.unwrap(),
        "Enabled journal.lua"
    );
    assert_eq!(
        app::list(&vault).await.unwrap(),
        "[x] journal.lua\n[ ] other.lua"
    );

    app::disable(&vault, "journal.lua").await.unwrap();
    assert_eq!(
        app::list(&vault).await.unwrap(),
        "[ ] journal.lua\n[ ] other.lua"
    );
}

#[tokio::test]
async fn test_enable_unknown_script_fails() {
    let temp = vault_with_scripts(&[]);
    let vault = Vault::open(temp.path()).unwrap();

    let err = app::enable(&vault, "nope.lua").await.unwrap_err();
    assert!(format!("{:#}", err).contains("nope.lua"));
    assert!(app::disable(&vault, "nope.lua").await.is_err());
}

#[tokio::test]
async fn test_list_marks_missing_script() {
    let temp = vault_with_scripts(&[("journal.lua", JOURNAL)]);
    let vault = Vault::open(temp.path()).unwrap();
    app::enable(&vault, "journal.lua").await.unwrap();

    fs::remove_file(temp.path().join(SCRIPTS_DIR).join("journal.lua")).unwrap();

    assert_eq!(
        app::list(&vault).await.unwrap(),
        "[!] journal.lua (missing)"
    );
}

#[tokio::test]
async fn test_check_reports_each_script() {
    let temp = vault_with_scripts(&[
        ("broken.lua", "return VaultScript:extend("),
        ("journal.lua", JOURNAL),
    ]);
    let vault = Vault::open(temp.path()).unwrap();

    let ok = app::check(&vault, &["journal.lua".to_string()]).await.unwrap();
    assert_eq!(ok, "ok     journal.lua (1 commands)");
    assert!(vault.host().commands().is_empty());

    let err = app::check(&vault, &[]).await.unwrap_err().to_string();
    assert!(err.contains("error  broken.lua"));
    assert!(err.contains("ok     journal.lua"));
    assert!(err.ends_with("1 of 2 scripts failed"));
}

#[tokio::test]
async fn test_commands_and_exec() {
    let temp = vault_with_scripts(&[("journal.lua", JOURNAL)]);
    let vault = Vault::open(temp.path()).unwrap();

    assert_eq!(
        app::commands(&vault).await.unwrap(),
        "No commands registered"
    );
    app::enable(&vault, "journal.lua").await.unwrap();

    let listed = app::commands(&vault).await.unwrap();
    assert!(listed.starts_with("journal-lua:New-entry\t"));

    let output = app::exec(&vault, "journal-lua:New-entry").await.unwrap();
    assert_eq!(output, "created entry.md\nRan journal-lua:New-entry");
    assert_eq!(
        fs::read_to_string(temp.path().join("entry.md")).unwrap(),
        "# Today\n"
    );

    assert!(app::exec(&vault, "journal-lua:Missing").await.is_err());
}

#[tokio::test]
async fn test_open_missing_vault() {
    let temp = TempDir::new().unwrap();
    assert!(Vault::open(&temp.path().join("absent")).is_err());
}
