use clap::Parser;
use std::process::ExitCode;
use vault_scripts::{init_subscriber, Cli, TracingConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = TracingConfig {
        filter: cli.global.log.clone(),
        format: cli.global.log_format,
        timestamps: false,
        target: false,
    };
    if let Err(e) = init_subscriber(&tracing) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match vault_scripts::run(cli).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
