//! Load configuration
//!
//! Layering, lowest precedence first: [`LoadConfig::default`], an optional
//! TOML file ([`LoadConfig::from_file`]), `SHARDMAP_*` environment variables
//! ([`LoadConfig::apply_env_overrides`]), then whatever the caller sets last.

use crate::{Result, ShardMapError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;


/// Largest byte length a single mapped region may cover (`2^31 - 1`).
pub const MAX_SPLIT_LENGTH: u64 = i32::MAX as u64;

/// Header prefix mapped to decode the per-file tensor table.
pub const DEFAULT_HEADER_PROBE_LEN: u64 = 1 << 20;

/// File name of the top-level index document inside a model root.
pub const DEFAULT_INDEX_FILE: &str = "model.safetensors.index.json";

/// How tensor offsets are rebased when a file is split into several regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebasePolicy {
    /// Subtract the end of the previous split and require that the next split
    /// starts exactly there; a padding gap is a `PackingViolation`.
    #[default]
    StrictPacking,
    /// Subtract each split's own lowest start offset, tolerating gaps.
    SplitStart,
}

impl RebasePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrictPacking => "strict_packing",
            Self::SplitStart => "split_start",
        }
    }
}

impl fmt::Display for RebasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebasePolicy {
    type Err = ShardMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict_packing" | "strict" => Ok(Self::StrictPacking),
            "split_start" | "start" => Ok(Self::SplitStart),
            other => Err(ShardMapError::Config(format!(
                "unknown rebase policy '{other}' (expected strict_packing or split_start)"
            ))),
        }
    }
}

/// Settings for loading a sharded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Index document file name, relative to the model root
    pub index_file: String,
    /// Bytes mapped from the start of each shard to decode its header
    pub header_probe_len: u64,
    /// Upper bound on the byte length of one mapped region
    pub max_split_len: u64,
    pub rebase_policy: RebasePolicy,
    /// Load distinct shard files on the rayon pool
    pub parallel: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            index_file: DEFAULT_INDEX_FILE.to_string(),
            header_probe_len: DEFAULT_HEADER_PROBE_LEN,
            max_split_len: MAX_SPLIT_LENGTH,
            rebase_policy: RebasePolicy::default(),
            parallel: false,
        }
    }
}

impl LoadConfig {
    /// Read a TOML config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ShardMapError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            ShardMapError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `SHARDMAP_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Overlay `SHARDMAP_INDEX_FILE`, `SHARDMAP_HEADER_PROBE_LEN`,
    /// `SHARDMAP_MAX_SPLIT_LEN`, `SHARDMAP_REBASE_POLICY` and
    /// `SHARDMAP_PARALLEL` onto this config.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = env::var("SHARDMAP_INDEX_FILE") {
            self.index_file = v;
        }
        if let Ok(v) = env::var("SHARDMAP_HEADER_PROBE_LEN") {
            self.header_probe_len = parse_u64("SHARDMAP_HEADER_PROBE_LEN", &v)?;
        }
        if let Ok(v) = env::var("SHARDMAP_MAX_SPLIT_LEN") {
            self.max_split_len = parse_u64("SHARDMAP_MAX_SPLIT_LEN", &v)?;
        }
        if let Ok(v) = env::var("SHARDMAP_REBASE_POLICY") {
            self.rebase_policy = v.parse()?;
        }
        if let Ok(v) = env::var("SHARDMAP_PARALLEL") {
            self.parallel = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        debug!("Load config after env overrides: {:?}", self);
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_file.trim().is_empty() {
            return Err(ShardMapError::Config("index_file must not be empty".to_string()));
        }
        if self.header_probe_len < 8 {
            return Err(ShardMapError::Config(format!(
                "header_probe_len must be at least 8 bytes, got {}",
                self.header_probe_len
            )));
        }
        if self.max_split_len == 0 || self.max_split_len > MAX_SPLIT_LENGTH {
            return Err(ShardMapError::Config(format!(
                "max_split_len must be in 1..={MAX_SPLIT_LENGTH}, got {}",
                self.max_split_len
            )));
        }
        Ok(())
    }

    pub fn with_index_file(mut self, index_file: impl Into<String>) -> Self {
        self.index_file = index_file.into();
        self
    }

    pub fn with_max_split_len(mut self, max_split_len: u64) -> Self {
        self.max_split_len = max_split_len;
        self
    }

    pub fn with_rebase_policy(mut self, policy: RebasePolicy) -> Self {
        self.rebase_policy = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

fn parse_u64(var: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .replace('_', "")
        .parse()
        .map_err(|e| ShardMapError::Config(format!("{var}={value}: {e}")))
}
