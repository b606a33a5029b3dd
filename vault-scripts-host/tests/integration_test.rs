//! End-to-end tests over a directory vault

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use vault_scripts_api::{type_definitions_file_name, Notice};
use vault_scripts_host::directory::SCRIPTS_DIR;
use vault_scripts_host::settings::SETTINGS_FILE;
use vault_scripts_host::{
    metadata_changed_event, DirectoryHost, FileSettingsStore, Host, HostEvent, ManagerConfig,
    ScriptManager, ScriptsDirectory,
};

const TAGGER: &str = r#"
local Tagger = VaultScript:extend()

function Tagger:onLoad()
    self.vault:addCommand("Stamp notes", function()
        for file in self.vault.root:files(true) do
            if file.extension == "md" then
                local fm = self.vault:getFrontmatter(file)
                if fm then
                    fm:set("stamped", true)
                    fm:apply()
                end
            end
        end
    end)
end

function Tagger:onFrontmatterModified(file, frontmatter)
    if frontmatter:contains("status")
        and frontmatter:get("status") == "done"
        and not frontmatter:contains("completed")
    then
        frontmatter:set("completed", "2024-01-01")
        frontmatter:apply()
    end
end

function Tagger:onFileCreated(file)
    self.vault:notify("new note: " .. file.baseName)
end

return Tagger
"#;

fn setup_vault() -> TempDir {
    let temp = TempDir::new().unwrap();
    let scripts = temp.path().join(SCRIPTS_DIR);
    fs::create_dir_all(&scripts).unwrap();
    fs::write(scripts.join("tagger.lua"), TAGGER).unwrap();
    fs::create_dir_all(temp.path().join("notes")).unwrap();
    fs::write(
        temp.path().join("notes/task.md"),
        "---\nstatus: open\n---\nWrite the report\n",
    )
    .unwrap();
    fs::write(temp.path().join("notes/plain.md"), "No front-matter here\n").unwrap();
    temp
}

fn manager_for(root: &Path) -> (Arc<DirectoryHost>, ScriptManager) {
    let host = Arc::new(DirectoryHost::open(root).unwrap());
    let manager = ScriptManager::new(
        host.clone(),
        Arc::new(ScriptsDirectory::new(host.scripts_dir())),
        Arc::new(FileSettingsStore::for_vault(root)),
        ManagerConfig::default(),
    );
    (host, manager)
}

#[tokio::test]
async fn test_type_definitions_installed() {
    let temp = setup_vault();
    let dir = ScriptsDirectory::new(temp.path().join(SCRIPTS_DIR));

    assert!(!dir.ensure().await.unwrap());
    let installed = dir.install_type_definitions().await.unwrap();

    assert!(installed.ends_with(type_definitions_file_name()));
    assert!(fs::read_to_string(installed)
        .unwrap()
        .contains("VaultScript"));
}

#[tokio::test]
async fn test_enable_command_and_frontmatter_hook() {
    let temp = setup_vault();
    let (host, manager) = manager_for(temp.path());
    manager.start().await.unwrap();

    manager.enable_script("tagger.lua").await.unwrap();
    let settings = fs::read_to_string(temp.path().join(SETTINGS_FILE)).unwrap();
    assert!(settings.contains("tagger.lua"));

    // The command only touches notes that already have front-matter
    assert!(host.commands().execute("tagger-lua:Stamp-notes").unwrap());
    assert_eq!(
        host.read("notes/task.md").unwrap(),
        "---\nstatus: open\nstamped: true\n---\nWrite the report\n"
    );
    assert_eq!(
        host.read("notes/plain.md").unwrap(),
        "No front-matter here\n"
    );

    host.write(
        "notes/task.md",
        "---\nstatus: done\nstamped: true\n---\nWrite the report\n",
    )
    .unwrap();
    let event = metadata_changed_event(host.as_ref(), "notes/task.md").unwrap();
    assert_eq!(manager.handle(&event).await, 1);
    let cache = host.metadata("notes/task.md").unwrap();
    assert_eq!(
        cache.frontmatter.unwrap()["completed"],
        serde_json::json!("2024-01-01")
    );

    // The same block again is not a change
    assert_eq!(manager.handle(&event).await, 0);
    assert!(host.notices().iter().all(|n| !n.is_error()));
}

#[tokio::test]
async fn test_enabled_set_survives_restart() {
    let temp = setup_vault();
    {
        let (_host, manager) = manager_for(temp.path());
        manager.start().await.unwrap();
        manager.enable_script("tagger.lua").await.unwrap();
        manager.shutdown().await;
    }

    let (host, manager) = manager_for(temp.path());
    let report = manager.start().await.unwrap();
    assert_eq!(report.loaded, vec!["tagger.lua"]);
    assert!(host.commands().contains("tagger-lua:Stamp-notes"));

    host.create("notes/idea.md", b"").unwrap();
    manager
        .handle(&HostEvent::Created {
            path: "notes/idea.md".into(),
            kind: vault_scripts_api::NodeKind::File,
        })
        .await;
    assert_eq!(host.notices(), vec![Notice::message("new note: idea")]);

    manager.disable_script("tagger.lua").await.unwrap();
    assert!(host.commands().is_empty());
    let settings = fs::read_to_string(temp.path().join(SETTINGS_FILE)).unwrap();
    assert!(!settings.contains("tagger.lua"));
}

#[tokio::test]
async fn test_broken_script_reports_and_others_load() {
    let temp = setup_vault();
    fs::write(
        temp.path().join(SCRIPTS_DIR).join("broken.lua"),
        "return VaultScript:extend(",
    )
    .unwrap();
    let (host, manager) = manager_for(temp.path());
    manager.start().await.unwrap();

    assert!(manager.enable_script("broken.lua").await.is_err());
    manager.enable_script("tagger.lua").await.unwrap();

    let errors: Vec<Notice> = host.notices().into_iter().filter(|n| n.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        Notice::ScriptError { event, script, .. } if event == "On Construct" && script == "broken.lua"
    ));

    let listings = manager.list_scripts().await.unwrap();
    let loaded: Vec<&str> = listings
        .iter()
        .filter(|l| l.loaded)
        .map(|l| l.file_name.as_str())
        .collect();
    assert_eq!(loaded, vec!["tagger.lua"]);
    assert!(listings.iter().all(|l| l.enabled));
}
