//! Memory-mapped regions of one shard file

use crate::planner::{Split, SplitPlanner};
use memmap2::{Mmap, MmapOptions};
use shardmap_common::{DType, LoadConfig, Result, ShardMapError};
use shardmap_format::{HeaderError, OffsetPair, TensorEntry, TensorOffsetTable, decode_header};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Index of a region within its [`RegionMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(pub usize);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A read-only mapping covering exactly one split.
pub struct Region {
    id: RegionId,
    /// Absolute file range backing the mapping
    file_range: OffsetPair,
    split: Split,
    mmap: Option<Mmap>,
}

impl Region {
    fn map(file: &File, id: RegionId, end_of_header: u64, split: Split) -> Result<Self> {
        let window = split.window();
        let file_range = window.shift(end_of_header).ok_or(ShardMapError::PackingViolation {
            expected: end_of_header,
            actual: window.start(),
        })?;

        let mmap = if file_range.is_empty() {
            None
        } else {
            let len = usize::try_from(file_range.len()).map_err(|_| ShardMapError::FileTooLarge {
                path: format!("region {id}"),
                len: file_range.len(),
                limit: usize::MAX as u64,
            })?;
            // SAFETY: the file is opened read-only and held open by the owning
            // RegionMap for as long as this mapping lives.
            let mmap = unsafe { MmapOptions::new().offset(file_range.start()).len(len).map(file) }?;
            Some(mmap)
        };

        debug!("Mapped region {} over file bytes {}", id, file_range);
        Ok(Self { id, file_range, split, mmap })
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn file_range(&self) -> OffsetPair {
        self.file_range
    }

    pub fn split(&self) -> &Split {
        &self.split
    }

    pub fn len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Bytes of a tensor given its rebased offsets.
    pub fn slice(&self, offsets: OffsetPair) -> Option<&[u8]> {
        self.as_slice().get(offsets.as_usize_range()?)
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("file_range", &self.file_range)
            .field("tensors", &self.split.tensors().len())
            .field("mapped", &self.mmap.is_some())
            .finish()
    }
}

/// Where a tensor lives once its file is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLocation {
    pub region: RegionId,
    /// Offsets relative to the start of `region`
    pub offsets: OffsetPair,
    pub dtype: DType,
    pub shape: Vec<u64>,
}

/// Every region of one shard file plus the name → location reverse index.
pub struct RegionMap {
    path: PathBuf,
    file: Option<File>,
    file_len: u64,
    end_of_header: u64,
    metadata: BTreeMap<String, String>,
    regions: Vec<Region>,
    locations: BTreeMap<String, TensorLocation>,
}

impl RegionMap {
    /// Open, decode, plan and map one shard file.
    pub fn load(path: &Path, config: &LoadConfig) -> Result<Self> {
        config.validate()?;
        let file = File::open(path).map_err(|e| ShardMapError::file_not_found(path, e))?;
        let file_len = file.metadata().map_err(|e| ShardMapError::file_not_found(path, e))?.len();

        let limit = (i64::MAX as u64).min(usize::MAX as u64);
        if file_len > limit {
            return Err(ShardMapError::FileTooLarge {
                path: path.display().to_string(),
                len: file_len,
                limit,
            });
        }

        let (table, end_of_header) = read_header(&file, path, file_len, config.header_probe_len)?;
        let data_len = file_len - end_of_header;

        let splits = SplitPlanner::from_config(config).plan(&table, data_len)?;
        let mut regions = Vec::with_capacity(splits.len());
        let mut locations = BTreeMap::new();
        for (i, split) in splits.into_iter().enumerate() {
            let id = RegionId(i);
            for (name, offsets) in split.tensors() {
                let Some(TensorEntry { dtype, shape, .. }) = table.get(name) else {
                    continue;
                };
                let location = TensorLocation {
                    region: id,
                    offsets: *offsets,
                    dtype: *dtype,
                    shape: shape.clone(),
                };
                locations.insert(name.clone(), location);
            }
            regions.push(Region::map(&file, id, end_of_header, split)?);
        }

        info!(
            "Loaded {}: {} tensors in {} regions ({} bytes)",
            path.display(),
            locations.len(),
            regions.len(),
            file_len
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            file_len,
            end_of_header,
            metadata: table.metadata().clone(),
            regions,
            locations,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Absolute position of the first data byte.
    pub fn end_of_header(&self) -> u64 {
        self.end_of_header
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    pub fn locations(&self) -> &BTreeMap<String, TensorLocation> {
        &self.locations
    }

    pub fn location(&self, name: &str) -> Option<&TensorLocation> {
        self.locations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.locations.contains_key(name)
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// The region holding `name` and its rebased offsets.
    pub fn resolve(&self, name: &str) -> Result<(&Region, &TensorLocation)> {
        let unknown = || ShardMapError::unknown_tensor(name);
        let location = self.locations.get(name).ok_or_else(unknown)?;
        let region = self.region(location.region).ok_or_else(unknown)?;
        Ok((region, location))
    }

    /// Drop every mapping, then the file handle. Safe to call repeatedly.
    pub fn close(&mut self) {
        let regions = self.regions.len();
        self.locations.clear();
        self.regions.clear();
        if self.file.take().is_some() {
            debug!("Closed {} ({} regions released)", self.path.display(), regions);
        }
    }
}

impl fmt::Debug for RegionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionMap")
            .field("path", &self.path)
            .field("file_len", &self.file_len)
            .field("end_of_header", &self.end_of_header)
            .field("regions", &self.regions)
            .field("tensors", &self.locations.len())
            .finish()
    }
}

/// Decode the header from a bounded prefix of the file.
///
/// The probe covers `min(probe_len, file_len)` bytes, never less than the
/// length prefix. A header declared longer than the probe is re-read at its
/// full length when the file holds it.
pub fn read_header(
    file: &File,
    path: &Path,
    file_len: u64,
    probe_len: u64,
) -> Result<(TensorOffsetTable, u64)> {
    if file_len < shardmap_format::HEADER_LEN_PREFIX as u64 {
        return Err(ShardMapError::malformed(path, format!("file is only {file_len} bytes")));
    }

    let prefix = shardmap_format::HEADER_LEN_PREFIX as u64;
    let probe = map_prefix(file, probe_len.max(prefix).min(file_len))?;
    let decoded = match decode_header(&probe) {
        Ok(decoded) => decoded,
        Err(HeaderError::Truncated { needed, .. }) if needed <= file_len => {
            debug!("Header of {} needs {} bytes, remapping past the probe", path.display(), needed);
            let full = map_prefix(file, needed)?;
            decode_header(&full).map_err(|e| ShardMapError::malformed(path, e.to_string()))?
        }
        Err(e) => return Err(ShardMapError::malformed(path, e.to_string())),
    };
    Ok((decoded.table, decoded.end_of_header))
}

fn map_prefix(file: &File, len: u64) -> Result<Mmap> {
    let len = usize::try_from(len)
        .map_err(|_| std::io::Error::other("header probe exceeds usize"))?;
    // SAFETY: read-only mapping dropped before this load step returns.
    Ok(unsafe { MmapOptions::new().len(len).map(file) }?)
}
