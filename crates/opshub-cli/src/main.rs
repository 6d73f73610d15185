//! opshubctl
//!
//! Operator CLI for per-user Kubernetes access.

use clap::Parser;

use opshub_cli::{Cli, Result};

async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    opshub_common::telemetry::init_logging(&config.access.log)?;
    cli.run(config).await
}

#[tokio::main]
async fn main() {
    if let Err(e) = execute(Cli::parse()).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
