//! Error types for shard loading

use std::path::Path;
use thiserror::Error;

/// Result alias used throughout shardmap
pub type Result<T> = std::result::Result<T, ShardMapError>;

/// Errors raised while loading or querying sharded weights.
///
/// Every load-phase variant is fatal to the whole load; `UnknownTensor` and
/// `Conversion` are local to a single lookup.
#[derive(Error, Debug)]
pub enum ShardMapError {
    #[error("Shard file not found or unreadable: {path}: {source}")]
    FileNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File too large: {path} is {len} bytes (addressable limit {limit})")]
    FileTooLarge { path: String, len: u64, limit: u64 },

    #[error("Malformed header in {path}: {reason}")]
    MalformedHeader { path: String, reason: String },

    #[error("Tensor too large to map: '{name}' spans [{start}, {end}), limit {limit} bytes")]
    TensorSpanTooLarge { name: String, start: u64, end: u64, limit: u64 },

    #[error("Tensor '{name}' ends at byte {end}, past the {data_len}-byte data section")]
    OffsetOutOfBounds { name: String, end: u64, data_len: u64 },

    #[error("Cannot convert tensor '{name}': {reason}")]
    Conversion { name: String, reason: String },

    #[error("Unknown tensor: {name}")]
    UnknownTensor { name: String },

    #[error("Packing violation: split starts at {actual}, expected {expected}")]
    PackingViolation { expected: u64, actual: u64 },

    #[error("Index document error: {0}")]
    Index(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShardMapError {
    pub fn file_not_found(path: &Path, source: std::io::Error) -> Self {
        Self::FileNotFound { path: path.display().to_string(), source }
    }

    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        Self::MalformedHeader { path: path.display().to_string(), reason: reason.into() }
    }

    pub fn unknown_tensor(name: impl Into<String>) -> Self {
        Self::UnknownTensor { name: name.into() }
    }

    /// True for errors that abort a load rather than a single query.
    pub fn is_load_error(&self) -> bool {
        !matches!(self, Self::UnknownTensor { .. } | Self::Conversion { .. })
    }
}
