//! shardmap CLI application
//!
//! Read-only inspection of sharded safetensors models: directory summaries,
//! per-shard split plans and tensor lookup.

use anyhow::Result;
use clap::Parser;
use shardmap_cli::Cli;
use shardmap_cli::exit::{EXIT_SUCCESS, exit_code};
use shardmap_cli::logging::setup_logging;
use tracing::error;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.global.log_level.as_deref(), cli.global.log_format) {
        eprintln!("{e}");
    }

    let code = match run(&cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("Error: {e}");
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {cause}");
            }
            exit_code(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.global.load_config()?;
    cli.command.execute(&config)
}
