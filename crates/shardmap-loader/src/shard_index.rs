//! Name-based access to every tensor of a sharded model

use crate::region::{Region, RegionId, RegionMap, TensorLocation};
use crate::view::WeightView;
use rayon::prelude::*;
use shardmap_common::{LoadConfig, Result, ShardMapError};
use shardmap_format::{IndexDocument, OffsetPair};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One mapped region, flattened for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    pub file: String,
    pub region: RegionId,
    /// Range within the file's data section
    pub range: OffsetPair,
    /// Subtracted from member offsets
    pub base: u64,
    pub tensors: usize,
    pub mapped_bytes: usize,
}

/// Every shard of a model, opened once and resolved by tensor name.
///
/// Built from an [`IndexDocument`] without I/O, populated by
/// [`ShardIndex::load`], released by [`ShardIndex::close`]. Views returned by
/// [`ShardIndex::lookup`] borrow the index, so it cannot be closed while any
/// of them is alive.
#[derive(Debug)]
pub struct ShardIndex {
    document: IndexDocument,
    config: LoadConfig,
    root: Option<PathBuf>,
    files: BTreeMap<String, RegionMap>,
    /// Tensor name → shard file holding it
    by_tensor: BTreeMap<String, String>,
}

impl ShardIndex {
    pub fn new(document: IndexDocument) -> Self {
        Self::with_config(document, LoadConfig::default())
    }

    pub fn with_config(document: IndexDocument, config: LoadConfig) -> Self {
        Self { document, config, root: None, files: BTreeMap::new(), by_tensor: BTreeMap::new() }
    }

    /// Read `root/<index_file>` and load every shard it names.
    pub fn open(root: &Path, config: LoadConfig) -> Result<Self> {
        config.validate()?;
        let document = IndexDocument::from_path(&root.join(&config.index_file))?;
        let mut index = Self::with_config(document, config);
        index.load(root)?;
        Ok(index)
    }

    /// Open, decode, plan and map each shard file named by the document.
    ///
    /// Files already loaded are skipped. Loading from a different root while
    /// loaded is a `Config` error and leaves the index untouched; any other
    /// failure closes the index before the error is returned.
    pub fn load(&mut self, root: &Path) -> Result<()> {
        self.config.validate()?;
        if let Some(current) = self.root.as_deref().filter(|current| *current != root) {
            return Err(ShardMapError::Config(format!(
                "index already loaded from {}, close it before loading {}",
                current.display(),
                root.display()
            )));
        }

        let pending: Vec<String> = self
            .document
            .shard_files()
            .into_iter()
            .filter(|f| !self.files.contains_key(*f))
            .map(str::to_string)
            .collect();

        info!(
            "Loading {} shard files from {} ({})",
            pending.len(),
            root.display(),
            if self.config.parallel { "parallel" } else { "sequential" }
        );

        let config = &self.config;
        let load_one = |file: &String| RegionMap::load(&root.join(file), config);
        let loaded: Vec<Result<RegionMap>> = if config.parallel {
            pending.par_iter().map(load_one).collect()
        } else {
            pending.iter().map(load_one).collect()
        };

        for (file, result) in pending.into_iter().zip(loaded) {
            match result {
                Ok(map) => {
                    self.files.insert(file, map);
                }
                Err(e) => {
                    warn!("Failed to load {}: {}", file, e);
                    self.close();
                    return Err(e);
                }
            }
        }

        self.root = Some(root.to_path_buf());
        self.rebuild_tensor_index();
        info!(
            "Loaded {} tensors in {} regions across {} files",
            self.by_tensor.len(),
            self.region_count(),
            self.files.len()
        );
        Ok(())
    }

    fn rebuild_tensor_index(&mut self) {
        self.by_tensor.clear();
        for (name, file) in &self.document.weight_map {
            match self.files.get(file) {
                Some(map) if map.contains(name) => {
                    self.by_tensor.insert(name.clone(), file.clone());
                }
                Some(_) => {
                    warn!("Index assigns {} to {} but its header has no such tensor", name, file)
                }
                None => {}
            }
        }
        for (file, map) in &self.files {
            let unlisted =
                map.locations().keys().filter(|n| !self.by_tensor.contains_key(*n)).count();
            if unlisted > 0 {
                debug!("{} has {} tensors not named by the index", file, unlisted);
            }
        }
    }

    /// Region and rebased offsets holding `name`.
    pub fn resolve(&self, name: &str) -> Result<(&Region, &TensorLocation)> {
        self.region_map_for(name)?.resolve(name)
    }

    /// Borrowed view of a tensor's bytes.
    pub fn lookup(&self, name: &str) -> Result<WeightView<'_>> {
        let (key, file) = self
            .by_tensor
            .get_key_value(name)
            .ok_or_else(|| ShardMapError::unknown_tensor(name))?;
        let map = self.files.get(file).ok_or_else(|| ShardMapError::unknown_tensor(name))?;
        let (region, location) = map.resolve(name)?;
        let data = region.slice(location.offsets).ok_or_else(|| ShardMapError::OffsetOutOfBounds {
            name: name.to_string(),
            end: location.offsets.end(),
            data_len: region.len() as u64,
        })?;
        debug!("Lookup {} -> {} region {} {}", name, file, location.region, location.offsets);
        Ok(WeightView::new(key, location.dtype, &location.shape, data))
    }

    /// Release every mapping and file handle. Never fails; safe to repeat.
    pub fn close(&mut self) {
        if self.files.is_empty() && self.root.is_none() {
            return;
        }
        for map in self.files.values_mut() {
            map.close();
        }
        debug!("Closed {} shard files", self.files.len());
        self.files.clear();
        self.by_tensor.clear();
        self.root = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn document(&self) -> &IndexDocument {
        &self.document
    }

    /// The index document's opaque metadata.
    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.document.metadata
    }

    /// Distinct shard file names, sorted.
    pub fn shard_files(&self) -> Vec<&str> {
        self.document.shard_files().into_iter().collect()
    }

    /// Every resolvable tensor name, sorted.
    pub fn tensor_names(&self) -> impl Iterator<Item = &str> {
        self.by_tensor.keys().map(String::as_str)
    }

    pub fn tensor_count(&self) -> usize {
        self.by_tensor.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_tensor.contains_key(name)
    }

    /// Shard file and location of `name`.
    pub fn tensor_info(&self, name: &str) -> Option<(&str, &TensorLocation)> {
        let file = self.by_tensor.get(name)?;
        let location = self.files.get(file)?.location(name)?;
        Some((file.as_str(), location))
    }

    pub fn region_map(&self, file: &str) -> Option<&RegionMap> {
        self.files.get(file)
    }

    pub fn region_count(&self) -> usize {
        self.files.values().map(|m| m.regions().len()).sum()
    }

    /// Every region of every file, in file then byte order.
    pub fn split_summaries(&self) -> Vec<SplitSummary> {
        self.files
            .iter()
            .flat_map(|(file, map)| {
                map.regions().iter().map(move |region| SplitSummary {
                    file: file.clone(),
                    region: region.id(),
                    range: region.split().range(),
                    base: region.split().base(),
                    tensors: region.split().tensors().len(),
                    mapped_bytes: region.len(),
                })
            })
            .collect()
    }

    fn region_map_for(&self, name: &str) -> Result<&RegionMap> {
        self.by_tensor
            .get(name)
            .and_then(|file| self.files.get(file))
            .ok_or_else(|| ShardMapError::unknown_tensor(name))
    }
}
