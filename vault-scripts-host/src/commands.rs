//! Script commands
//!
//! Scripts register named actions with the host's command palette. Ids are
//! namespaced by the script's file name and recorded on a per-script ledger
//! so that disabling a script removes everything it registered.

use crate::host::{Host, HostError, HostResult};
use crate::paths;
use crate::report::{ErrorReporter, REMOVE_COMMANDS};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use vault_scripts_api::ScriptError;

pub type RunCallback = Arc<dyn Fn() -> Result<(), ScriptError> + Send + Sync>;
pub type CheckCallback = Arc<dyn Fn(bool) -> Result<bool, ScriptError> + Send + Sync>;

/// What a command does when invoked
#[derive(Clone)]
pub enum CommandAction {
    /// Always available, runs the callback
    Run(RunCallback),
    /// Called with `true` to ask for availability, then with `false` to run
    Check(CheckCallback),
}

impl CommandAction {
    pub fn run(callback: impl Fn() -> Result<(), ScriptError> + Send + Sync + 'static) -> Self {
        Self::Run(Arc::new(callback))
    }

    pub fn check(
        callback: impl Fn(bool) -> Result<bool, ScriptError> + Send + Sync + 'static,
    ) -> Self {
        Self::Check(Arc::new(callback))
    }
}

/// A command registered with the host
#[derive(Clone)]
pub struct Command {
    pub id: String,
    pub name: String,
    pub action: CommandAction,
}

impl Command {
    pub fn is_checkable(&self) -> bool {
        matches!(self.action, CommandAction::Check(_))
    }

    /// Whether the command can currently run
    pub fn check(&self) -> Result<bool, ScriptError> {
        match &self.action {
            CommandAction::Run(_) => Ok(true),
            CommandAction::Check(callback) => callback(true),
        }
    }

    /// Run the command; returns `false` when a checkable command declined
    pub fn run(&self) -> Result<bool, ScriptError> {
        match &self.action {
            CommandAction::Run(callback) => {
                callback()?;
                Ok(true)
            }
            CommandAction::Check(callback) => {
                if !callback(true)? {
                    return Ok(false);
                }
                callback(false)?;
                Ok(true)
            }
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("checkable", &self.is_checkable())
            .finish()
    }
}

/// Host-facing command id: `"<file>:<name>"` with every run of characters
/// outside `[A-Za-z0-9:]` collapsed into a single `-`
pub fn command_id(file: &str, name: &str) -> String {
    let raw = format!("{}:{}", file, name);
    let mut id = String::with_capacity(raw.len());
    let mut in_run = false;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == ':' {
            id.push(c);
            in_run = false;
        } else if !in_run {
            id.push('-');
            in_run = true;
        }
    }

    id
}

/// Palette name: `"<file without extension>: <name>"`
pub fn command_display_name(file: &str, name: &str) -> String {
    format!("{}: {}", paths::basename(file), name)
}

/// Ids registered by one script instance
#[derive(Debug, Clone, Default)]
pub struct CommandLedger {
    ids: Arc<Mutex<Vec<String>>>,
}

impl CommandLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id; returns `false` if it was already recorded
    pub fn record(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        let mut ids = self.ids.lock();
        if ids.contains(&id) {
            return false;
        }
        ids.push(id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().iter().any(|recorded| recorded == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.lock().clone()
    }

    /// Drain every recorded id
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.ids.lock())
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}

/// One or more commands could not be removed from the host
#[derive(Debug, thiserror::Error)]
#[error("Failed to remove {} command(s): {}", .failures.len(), format_failures(.failures))]
pub struct CommandRemovalError {
    /// `(id, reason)` for each command that failed
    pub failures: Vec<(String, String)>,
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(id, reason)| format!("{} ({})", id, reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Registers and removes script commands on the host
#[derive(Clone)]
pub struct CommandRegistrar {
    host: Arc<dyn Host>,
    reporter: ErrorReporter,
}

impl CommandRegistrar {
    pub fn new(host: Arc<dyn Host>) -> Self {
        let reporter = ErrorReporter::new(host.clone());
        Self { host, reporter }
    }

    /// Register `action` under `name` for `script` and record it on `ledger`
    ///
    /// Errors raised by the action when it is later invoked are reported as
    /// script errors and treated as "did not run".
    pub fn add(
        &self,
        script: &str,
        ledger: &CommandLedger,
        name: &str,
        action: CommandAction,
    ) -> HostResult<String> {
        let id = command_id(script, name);
        let display_name = command_display_name(script, name);
        let event = format!("Command \"{}\"", display_name);

        let reporter = self.reporter.clone();
        let owner = script.to_string();
        let action = match action {
            CommandAction::Run(callback) => CommandAction::run(move || {
                if let Err(e) = callback() {
                    reporter.report(&event, &owner, &e);
                }
                Ok(())
            }),
            CommandAction::Check(callback) => CommandAction::check(move |checking| {
                callback(checking).or_else(|e| {
                    reporter.report(&event, &owner, &e);
                    Ok(false)
                })
            }),
        };

        self.host.add_command(Command {
            id: id.clone(),
            name: display_name,
            action,
        })?;
        ledger.record(id.clone());

        tracing::debug!(script = %script, command = %id, "Command registered");
        Ok(id)
    }

    /// Remove every command on `ledger`; failures never stop the remaining removals
    pub fn remove_all(&self, ledger: &CommandLedger) -> Result<(), CommandRemovalError> {
        let mut failures = Vec::new();

        for id in ledger.take() {
            match self.host.remove_command(&id) {
                Ok(()) => tracing::debug!(command = %id, "Command removed"),
                Err(e) => failures.push((id, e.to_string())),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CommandRemovalError { failures })
        }
    }

    /// Remove every command on `ledger`, reporting failures as one notice
    pub fn remove_all_reported(&self, script: &str, ledger: &CommandLedger) {
        if let Err(e) = self.remove_all(ledger) {
            self.reporter.report(REMOVE_COMMANDS, script, &e);
        }
    }
}

/// Command palette storage shared by the bundled hosts
#[derive(Debug, Default)]
pub struct CommandTable {
    commands: RwLock<Vec<Command>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a command, replacing any command with the same id
    pub fn insert(&self, command: Command) {
        let mut commands = self.commands.write();
        match commands.iter_mut().find(|c| c.id == command.id) {
            Some(existing) => *existing = command,
            None => commands.push(command),
        }
    }

    pub fn remove(&self, id: &str) -> HostResult<()> {
        let mut commands = self.commands.write();
        let before = commands.len();
        commands.retain(|c| c.id != id);
        if commands.len() == before {
            return Err(HostError::Command(format!("unknown command: {}", id)));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Command> {
        self.commands.read().iter().find(|c| c.id == id).cloned()
    }

    /// Every command in registration order
    pub fn list(&self) -> Vec<Command> {
        self.commands.read().clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.commands.read().iter().any(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    /// Run a command by id; the table lock is released before the callback runs
    pub fn execute(&self, id: &str) -> HostResult<bool> {
        let command = self
            .get(id)
            .ok_or_else(|| HostError::Command(format!("unknown command: {}", id)))?;
        command
            .run()
            .map_err(|e| HostError::Command(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vault_scripts_api::Notice;

    #[test]
    fn test_command_id_sanitization() {
        let id = command_id("My Script.lua", "Do / Thing!");
        assert_eq!(id, "My-Script-lua:Do-Thing-");
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '-'));
        assert_eq!(
            command_display_name("My Script.lua", "Do / Thing!"),
            "My Script: Do / Thing!"
        );
    }

    #[test]
    fn test_display_name_without_extension() {
        assert_eq!(command_display_name("tool", "Go"), "tool: Go");
    }

    #[test]
    fn test_ledger_deduplicates() {
        let ledger = CommandLedger::new();
        assert!(ledger.record("a"));
        assert!(!ledger.record("a"));
        assert!(ledger.record("b"));
        assert_eq!(ledger.ids(), vec!["a", "b"]);
        assert_eq!(ledger.take(), vec!["a", "b"]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_checkable_command_runs_only_when_available() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let command = Command {
            id: "x".into(),
            name: "x".into(),
            action: CommandAction::check(move |checking| {
                if !checking {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(false)
            }),
        };

        assert!(!command.check().unwrap());
        assert!(!command.run().unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registrar_add_and_remove_all() {
        let host = Arc::new(MemoryHost::new());
        let registrar = CommandRegistrar::new(host.clone());
        let ledger = CommandLedger::new();

        let id = registrar
            .add("tools.lua", &ledger, "Tidy", CommandAction::run(|| Ok(())))
            .unwrap();
        assert_eq!(id, "tools-lua:Tidy");
        assert!(host.commands().contains(&id));
        assert_eq!(host.commands().get(&id).unwrap().name, "tools: Tidy");

        registrar.remove_all(&ledger).unwrap();
        assert!(host.commands().is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_remove_all_collects_failures() {
        let host = Arc::new(MemoryHost::new());
        let registrar = CommandRegistrar::new(host.clone());
        let ledger = CommandLedger::new();

        for name in ["One", "Two", "Three"] {
            registrar
                .add("s.lua", &ledger, name, CommandAction::run(|| Ok(())))
                .unwrap();
        }
        host.fail_command_removal("s-lua:One");
        host.fail_command_removal("s-lua:Three");

        let err = registrar.remove_all(&ledger).unwrap_err();
        let failed: Vec<_> = err.failures.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["s-lua:One", "s-lua:Three"]);
        assert!(!host.commands().contains("s-lua:Two"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_remove_all_reported_sends_one_notice() {
        let host = Arc::new(MemoryHost::new());
        let registrar = CommandRegistrar::new(host.clone());
        let ledger = CommandLedger::new();

        for name in ["One", "Two"] {
            registrar
                .add("s.lua", &ledger, name, CommandAction::run(|| Ok(())))
                .unwrap();
            host.fail_command_removal(&command_id("s.lua", name));
        }

        registrar.remove_all_reported("s.lua", &ledger);

        let notices = host.notices();
        assert_eq!(notices.len(), 1);
        match &notices[0] {
            Notice::ScriptError {
                event,
                script,
                message,
            } => {
                assert_eq!(event, REMOVE_COMMANDS);
                assert_eq!(script, "s.lua");
                assert!(message.contains("s-lua:One"));
                assert!(message.contains("s-lua:Two"));
            }
            other => panic!("unexpected notice: {other:?}"),
        }
    }

    #[test]
    fn test_failing_action_is_reported() {
        let host = Arc::new(MemoryHost::new());
        let registrar = CommandRegistrar::new(host.clone());
        let ledger = CommandLedger::new();

        let id = registrar
            .add(
                "s.lua",
                &ledger,
                "Explode",
                CommandAction::run(|| Err(ScriptError::runtime("kaboom"))),
            )
            .unwrap();

        assert!(host.commands().execute(&id).unwrap());
        let notices = host.notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].to_string().contains("kaboom"));
    }
}
