//! Safetensors shard header and index document decoding.
//!
//! Provides the two format decoders the loader consumes: the top-level
//! `model.safetensors.index.json` mapping tensors to shard files, and the
//! per-shard header yielding a [`TensorOffsetTable`]. Neither touches tensor
//! data.
//!
//! # Example
//!
//! ```no_run
//! use shardmap_format::{IndexDocument, decode_header};
//! use std::path::Path;
//!
//! let index = IndexDocument::from_path(Path::new("model.safetensors.index.json")).unwrap();
//! for file in index.shard_files() {
//!     let bytes = std::fs::read(file).unwrap();
//!     let header = decode_header(&bytes).unwrap();
//!     println!("{file}: {} tensors", header.table.len());
//! }
//! ```

pub mod header;
pub mod index;
pub mod table;

pub use header::{
    DecodedHeader, HEADER_LEN_PREFIX, HeaderError, MAX_HEADER_LEN, METADATA_KEY, decode_header,
    declared_header_len,
};
pub use index::IndexDocument;
pub use table::{OffsetPair, TensorEntry, TensorOffsetTable};
