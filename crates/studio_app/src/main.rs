mod cli;
mod commands;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use studio_logging::{studio_info, DEFAULT_LOG_FILE};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    studio_logging::initialize(cli.log.into(), cli.level(), Path::new(DEFAULT_LOG_FILE));

    let config = cli.engine_config()?;
    studio_info!(
        "Using state dir {} and service {}",
        config.state_dir.display(),
        config.service.base_url
    );
    commands::execute(&config, cli.command).await
}
