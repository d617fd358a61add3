//! Safetensors shard header decoder
//!
//! ```text
//! SHARD := HEADER_LEN HEADER DATA
//! HEADER_LEN := u64 little-endian
//! HEADER := JSON {
//!   "__metadata__": { "key": "value", ... },       (optional)
//!   "tensor_name": {
//!     "dtype": "F32" | "BF16" | ...,
//!     "shape": [d0, d1, ...],
//!     "data_offsets": [start, end]                  (relative to DATA)
//!   },
//!   ...
//! }
//! ```

use crate::table::{OffsetPair, TensorEntry, TensorOffsetTable};
use serde::Deserialize;
use shardmap_common::DType;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Width of the little-endian header length prefix.
pub const HEADER_LEN_PREFIX: usize = 8;

/// Reserved key holding the shard's string metadata.
pub const METADATA_KEY: &str = "__metadata__";

/// Headers larger than this are rejected outright.
pub const MAX_HEADER_LEN: u64 = 100_000_000;

/// Why a shard header could not be decoded.
#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("header needs {needed} bytes but only {available} are available")]
    Truncated { needed: u64, available: u64 },

    #[error("declared header length {len} exceeds the 100000000-byte limit")]
    TooLarge { len: u64 },

    #[error("header is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid entry for tensor '{name}': {reason}")]
    InvalidTensor { name: String, reason: String },

    #[error("invalid __metadata__ block: {0}")]
    InvalidMetadata(String),
}

/// A decoded header and where the data section begins.
#[derive(Debug, Clone)]
pub struct DecodedHeader {
    pub table: TensorOffsetTable,
    /// Absolute file position of the first data byte
    pub end_of_header: u64,
}

#[derive(Deserialize)]
struct RawTensorInfo {
    dtype: DType,
    shape: Vec<u64>,
    data_offsets: [u64; 2],
}

/// Read the declared JSON header length from the prefix.
///
/// Returns `None` if fewer than 8 bytes are available.
pub fn declared_header_len(data: &[u8]) -> Option<u64> {
    let prefix: [u8; HEADER_LEN_PREFIX] = data.get(..HEADER_LEN_PREFIX)?.try_into().ok()?;
    Some(u64::from_le_bytes(prefix))
}

/// Decode the header at the start of `data`.
///
/// `data` only needs to cover the prefix and the JSON header; the data
/// section is not touched.
pub fn decode_header(data: &[u8]) -> Result<DecodedHeader, HeaderError> {
    let header_len = declared_header_len(data).ok_or(HeaderError::Truncated {
        needed: HEADER_LEN_PREFIX as u64,
        available: data.len() as u64,
    })?;
    if header_len > MAX_HEADER_LEN {
        return Err(HeaderError::TooLarge { len: header_len });
    }

    let end_of_header = HEADER_LEN_PREFIX as u64 + header_len;
    if end_of_header > data.len() as u64 {
        return Err(HeaderError::Truncated { needed: end_of_header, available: data.len() as u64 });
    }

    let json = &data[HEADER_LEN_PREFIX..end_of_header as usize];
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(json)?;

    let mut tensors = BTreeMap::new();
    let mut metadata = BTreeMap::new();
    for (name, value) in raw {
        if name == METADATA_KEY {
            metadata = serde_json::from_value(value)
                .map_err(|e| HeaderError::InvalidMetadata(e.to_string()))?;
            continue;
        }
        let entry = decode_entry(&name, value)?;
        tensors.insert(name, entry);
    }

    debug!(
        "Decoded header: {} tensors, {} metadata keys, data starts at {}",
        tensors.len(),
        metadata.len(),
        end_of_header
    );

    Ok(DecodedHeader { table: TensorOffsetTable::new(tensors, metadata), end_of_header })
}

fn decode_entry(name: &str, value: serde_json::Value) -> Result<TensorEntry, HeaderError> {
    let invalid = |reason: String| HeaderError::InvalidTensor { name: name.to_string(), reason };

    let info: RawTensorInfo = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
    let [start, end] = info.data_offsets;
    let offsets = OffsetPair::new(start, end)
        .ok_or_else(|| invalid(format!("data_offsets start {start} > end {end}")))?;

    let expected = info
        .shape
        .iter()
        .try_fold(info.dtype.size_in_bytes() as u64, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| invalid(format!("shape {:?} overflows", info.shape)))?;
    if expected != offsets.len() {
        return Err(invalid(format!(
            "shape {:?} of {} needs {expected} bytes, data_offsets cover {}",
            info.shape,
            info.dtype,
            offsets.len()
        )));
    }

    Ok(TensorEntry { dtype: info.dtype, shape: info.shape, offsets })
}
