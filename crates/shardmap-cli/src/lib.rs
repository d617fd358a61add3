//! shardmap CLI library
//!
//! The argument definitions and commands live here so tests can drive them
//! without spawning the binary.

pub mod commands;
pub mod exit;
pub mod logging;
pub mod output;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use shardmap_common::{LoadConfig, RebasePolicy};
use std::path::PathBuf;

use commands::{InspectCommand, LookupCommand, PlanCommand};
use logging::LogFormat;

/// shardmap - inspect memory-mapped sharded safetensors models
#[derive(Parser, Debug)]
#[command(name = "shardmap")]
#[command(about = "Inspect split plans and tensors of sharded safetensors models")]
#[command(long_about = r#"
shardmap opens a sharded safetensors model read-only, partitions every shard
into memory-mapped regions no longer than 2^31 - 1 bytes, and resolves tensors
by name.

Examples:
  # Summarise a model directory
  shardmap inspect /models/llama-7b

  # Show how one shard is cut into regions
  shardmap plan /models/llama-7b/model-00001-of-00002.safetensors

  # Resolve a tensor and print its first values
  shardmap lookup /models/llama-7b model.embed_tokens.weight --values 8
"#)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format
    #[arg(long, value_name = "FORMAT", global = true, default_value = "compact")]
    pub log_format: LogFormat,

    /// Index document file name inside the model root
    #[arg(long, value_name = "NAME", global = true)]
    pub index_file: Option<String>,

    /// Maximum byte length of one mapped region
    #[arg(long, value_name = "BYTES", global = true)]
    pub max_split_len: Option<u64>,

    /// How offsets are rebased when a shard is split (strict_packing, split_start)
    #[arg(long, value_name = "POLICY", global = true)]
    pub rebase_policy: Option<RebasePolicy>,

    /// Load shard files in parallel
    #[arg(long, global = true)]
    pub parallel: bool,
}

impl GlobalOptions {
    /// Defaults, then the config file, then `SHARDMAP_*`, then these flags.
    pub fn load_config(&self) -> Result<LoadConfig> {
        let mut config = match &self.config {
            Some(path) => LoadConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => LoadConfig::default(),
        };
        config.apply_env_overrides().context("Invalid SHARDMAP_* environment override")?;

        if let Some(index_file) = &self.index_file {
            config.index_file = index_file.clone();
        }
        if let Some(max_split_len) = self.max_split_len {
            config.max_split_len = max_split_len;
        }
        if let Some(policy) = self.rebase_policy {
            config.rebase_policy = policy;
        }
        if self.parallel {
            config.parallel = true;
        }
        config.validate().context("Invalid command-line options")?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarise every shard of a model directory
    Inspect(InspectCommand),

    /// Show the split plan of a single shard file
    Plan(PlanCommand),

    /// Resolve one tensor by name
    #[command(alias = "get")]
    Lookup(LookupCommand),
}

impl Commands {
    pub fn execute(&self, config: &LoadConfig) -> Result<()> {
        match self {
            Self::Inspect(cmd) => cmd.execute(config),
            Self::Plan(cmd) => cmd.execute(config),
            Self::Lookup(cmd) => cmd.execute(config),
        }
    }
}

/// The clap command tree, for help and completion generation.
pub fn build_cli() -> clap::Command {
    Cli::command()
}
