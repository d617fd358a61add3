//! Top-level index document (`model.safetensors.index.json`)

use serde::{Deserialize, Serialize};
use shardmap_common::{Result, ShardMapError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Tensor name → shard file mapping plus opaque metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Passed through unchanged (commonly `{"total_size": N}`)
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Tensor name → shard file name relative to the model root
    pub weight_map: BTreeMap<String, String>,
}

impl IndexDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ShardMapError::Index(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| ShardMapError::file_not_found(path, e))?;
        let doc = Self::from_slice(&bytes)
            .map_err(|e| ShardMapError::Index(format!("{}: {e}", path.display())))?;
        debug!(
            "Read index {}: {} tensors across {} shard files",
            path.display(),
            doc.weight_map.len(),
            doc.shard_files().len()
        );
        Ok(doc)
    }

    /// Distinct shard file names, sorted.
    pub fn shard_files(&self) -> BTreeSet<&str> {
        self.weight_map.values().map(String::as_str).collect()
    }

    pub fn file_for(&self, tensor: &str) -> Option<&str> {
        self.weight_map.get(tensor).map(String::as_str)
    }

    /// Tensors the index assigns to `file`.
    pub fn tensors_in<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.weight_map.iter().filter(move |(_, f)| f.as_str() == file).map(|(n, _)| n.as_str())
    }

    /// `metadata.total_size`, when present and numeric.
    pub fn total_size(&self) -> Option<u64> {
        self.metadata.get("total_size").and_then(serde_json::Value::as_u64)
    }
}
