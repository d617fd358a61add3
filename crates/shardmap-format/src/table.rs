//! Per-file tensor offset table

use shardmap_common::DType;
use std::collections::BTreeMap;
use std::fmt;

/// Half-open byte range `[start, end)`.
///
/// Offsets are relative to some base: a shard's data section, or after
/// rebasing, the start of the region holding the tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OffsetPair {
    start: u64,
    end: u64,
}

impl OffsetPair {
    /// Returns `None` when `start > end`.
    pub const fn new(start: u64, end: u64) -> Option<Self> {
        if start <= end { Some(Self { start, end }) } else { None }
    }

    pub const fn start(self) -> u64 {
        self.start
    }

    pub const fn end(self) -> u64 {
        self.end
    }

    pub const fn len(self) -> u64 {
        self.end - self.start
    }

    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// Re-express this range relative to `base`.
    ///
    /// Returns `None` if the range starts before `base`.
    pub const fn rebase(self, base: u64) -> Option<Self> {
        if self.start < base {
            return None;
        }
        Some(Self { start: self.start - base, end: self.end - base })
    }

    /// Inverse of [`OffsetPair::rebase`].
    pub fn shift(self, base: u64) -> Option<Self> {
        Some(Self { start: self.start.checked_add(base)?, end: self.end.checked_add(base)? })
    }

    pub fn as_usize_range(self) -> Option<std::ops::Range<usize>> {
        Some(usize::try_from(self.start).ok()?..usize::try_from(self.end).ok()?)
    }
}

impl fmt::Display for OffsetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// One tensor described by a shard header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorEntry {
    pub dtype: DType,
    pub shape: Vec<u64>,
    /// Position within the shard's data section
    pub offsets: OffsetPair,
}

impl TensorEntry {
    pub fn numel(&self) -> u64 {
        self.shape.iter().product()
    }
}

/// Tensor name → entry for one shard, plus the header's opaque metadata.
///
/// Immutable after construction. Iteration is by name, which carries no
/// meaning for planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TensorOffsetTable {
    tensors: BTreeMap<String, TensorEntry>,
    metadata: BTreeMap<String, String>,
}

impl TensorOffsetTable {
    pub fn new(tensors: BTreeMap<String, TensorEntry>, metadata: BTreeMap<String, String>) -> Self {
        Self { tensors, metadata }
    }

    pub fn get(&self, name: &str) -> Option<&TensorEntry> {
        self.tensors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TensorEntry)> {
        self.tensors.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Highest end offset of any tensor; 0 for an empty table.
    pub fn data_extent(&self) -> u64 {
        self.tensors.values().map(|e| e.offsets.end()).max().unwrap_or(0)
    }

    /// First tensor (by name) whose range runs past `data_len`.
    pub fn find_out_of_bounds(&self, data_len: u64) -> Option<(&str, OffsetPair)> {
        self.iter().find(|(_, e)| e.offsets.end() > data_len).map(|(n, e)| (n, e.offsets))
    }
}
