//! vault-scripts: command line front end for the vault script runtime
//!
//! Parses the command line, installs the tracing subscriber and hands the
//! command to [`app::run`].

pub mod app;
pub mod cli;
pub mod tracing_support;

pub use app::{run, Vault};
pub use cli::{Cli, Commands, GlobalArgs, RunArgs};
pub use tracing_support::{init_subscriber, TracingConfig, TracingFormat};
