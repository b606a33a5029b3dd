//! Command line interface.

use crate::tracing_support::TracingFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "vault-scripts", version)]
#[command(about = "Run user scripts against the notes in a vault directory", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Vault directory
    #[arg(long, env = "VAULT_SCRIPTS_VAULT", default_value = ".", global = true)]
    pub vault: PathBuf,

    /// Log output format
    #[arg(
        long,
        env = "VAULT_SCRIPTS_LOG_FORMAT",
        value_enum,
        default_value_t = TracingFormat::Compact,
        global = true
    )]
    pub log_format: TracingFormat,

    /// Log filter, overrides RUST_LOG (e.g. `debug`)
    #[arg(long, global = true)]
    pub log: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the scripts folder and install the type declarations
    Init,

    /// List scripts and whether they are enabled
    List,

    /// Enable a script and load it once to check it starts
    Enable {
        /// Script file name, e.g. `tagger.lua`
        script: String,
    },

    /// Disable a script
    Disable {
        /// Script file name
        script: String,
    },

    /// Evaluate scripts without running their hooks
    Check {
        /// Script file names; defaults to every script in the scripts folder
        scripts: Vec<String>,
    },

    /// List the commands registered by the enabled scripts
    Commands,

    /// Run a command registered by an enabled script
    Exec {
        /// Command id, as printed by `commands`
        id: String,
    },

    /// Load the enabled scripts and dispatch vault changes until interrupted
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Quiet period before file events are dispatched, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub debounce_ms: u64,

    /// Drop scripts whose onLoad hook fails
    #[arg(long)]
    pub strict_on_load: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "vault-scripts",
            "--vault",
            "/tmp/notes",
            "run",
            "--debounce-ms",
            "100",
            "--strict-on-load",
        ]);
        assert_eq!(cli.global.vault, PathBuf::from("/tmp/notes"));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.debounce_ms, 100);
                assert!(args.strict_on_load);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_check_many() {
        let cli = Cli::parse_from(["vault-scripts", "check", "a.lua", "b.lua", "--log-format", "json"]);
        assert_eq!(cli.global.log_format, TracingFormat::Json);
        assert!(matches!(cli.command, Commands::Check { scripts } if scripts.len() == 2));
    }
}
