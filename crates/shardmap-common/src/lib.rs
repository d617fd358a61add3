//! Common types for shardmap
//!
//! This crate provides the foundational types shared by the format decoder,
//! the loader and the CLI: the error enum, load configuration and tensor
//! element types.

pub mod config;
pub mod dtype;
pub mod error;

pub use config::{
    DEFAULT_HEADER_PROBE_LEN, DEFAULT_INDEX_FILE, LoadConfig, MAX_SPLIT_LENGTH, RebasePolicy,
};
pub use dtype::DType;
pub use error::{Result, ShardMapError};
