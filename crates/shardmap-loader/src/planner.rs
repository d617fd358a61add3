//! Split planning
//!
//! A single mapping cannot cover more than [`MAX_SPLIT_LENGTH`] bytes, so a
//! shard's data section is partitioned greedily into splits. Each split
//! holds a whole number of tensors, and every tensor's offsets are rebased
//! to the start of the split that will hold it in memory.
//!
//! Selection is driven by offsets rather than by the order of the table: a
//! split takes every remaining tensor whose absolute end falls inside the
//! window `[anchor, anchor + max_split_len]`.

use shardmap_common::{LoadConfig, MAX_SPLIT_LENGTH, RebasePolicy, Result, ShardMapError};
use shardmap_format::{OffsetPair, TensorOffsetTable};
use std::collections::BTreeMap;
use tracing::debug;

/// A contiguous byte range of one shard, sized to fit one mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    range: OffsetPair,
    base: u64,
    tensors: BTreeMap<String, OffsetPair>,
}

impl Split {
    /// Range within the shard's data section.
    pub fn range(&self) -> OffsetPair {
        self.range
    }

    /// Offset subtracted from every member during rebasing.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Bytes a region must map for rebased offsets to index into it:
    /// `[base, range.end)`. Equal to `range` on packed input.
    pub fn window(&self) -> OffsetPair {
        OffsetPair::new(self.base, self.range.end()).unwrap_or(self.range)
    }

    pub fn len(&self) -> u64 {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Member tensors with split-relative offsets.
    pub fn tensors(&self) -> &BTreeMap<String, OffsetPair> {
        &self.tensors
    }

    pub fn get(&self, name: &str) -> Option<OffsetPair> {
        self.tensors.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }
}

/// Partitions a shard's offset table into mappable splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlanner {
    max_split_len: u64,
    policy: RebasePolicy,
}

impl Default for SplitPlanner {
    fn default() -> Self {
        Self { max_split_len: MAX_SPLIT_LENGTH, policy: RebasePolicy::default() }
    }
}

impl SplitPlanner {
    /// `max_split_len` is clamped to `1..=MAX_SPLIT_LENGTH`.
    pub fn new(max_split_len: u64, policy: RebasePolicy) -> Self {
        Self { max_split_len: max_split_len.clamp(1, MAX_SPLIT_LENGTH), policy }
    }

    pub fn from_config(config: &LoadConfig) -> Self {
        Self::new(config.max_split_len, config.rebase_policy)
    }

    pub fn max_split_len(&self) -> u64 {
        self.max_split_len
    }

    pub fn policy(&self) -> RebasePolicy {
        self.policy
    }

    /// Plan the splits for a table whose data section is `data_len` bytes.
    ///
    /// Splits come back in increasing byte order; every tensor of `table`
    /// lands in exactly one of them. An empty table yields no splits.
    ///
    /// # Errors
    ///
    /// - `OffsetOutOfBounds` if a tensor ends past `data_len`
    /// - `TensorSpanTooLarge` if a tensor cannot fit any split
    /// - `PackingViolation` under [`RebasePolicy::StrictPacking`] when a
    ///   split would not start where the previous one ended
    pub fn plan(&self, table: &TensorOffsetTable, data_len: u64) -> Result<Vec<Split>> {
        if let Some((name, pair)) = table.find_out_of_bounds(data_len) {
            return Err(ShardMapError::OffsetOutOfBounds {
                name: name.to_string(),
                end: pair.end(),
                data_len,
            });
        }

        let mut remaining: BTreeMap<&str, OffsetPair> =
            table.iter().map(|(name, entry)| (name, entry.offsets)).collect();
        let mut splits = Vec::new();
        let mut boundary = 0u64;

        while !remaining.is_empty() {
            let next_start = remaining.values().map(|p| p.start()).min().unwrap_or(boundary);
            let anchor = match self.policy {
                RebasePolicy::StrictPacking => {
                    if next_start != boundary {
                        return Err(ShardMapError::PackingViolation {
                            expected: boundary,
                            actual: next_start,
                        });
                    }
                    boundary
                }
                RebasePolicy::SplitStart => next_start,
            };
            // Exclusive: a split may be exactly `max_split_len` bytes long.
            let limit = anchor.saturating_add(self.max_split_len).saturating_add(1);

            let (group, rest): (BTreeMap<&str, OffsetPair>, BTreeMap<&str, OffsetPair>) =
                std::mem::take(&mut remaining).into_iter().partition(|(_, p)| p.end() < limit);
            remaining = rest;

            if group.is_empty() {
                let (name, pair) = remaining
                    .iter()
                    .min_by_key(|(_, p)| (p.start(), p.end()))
                    .map(|(n, p)| (n.to_string(), *p))
                    .unwrap_or_default();
                return Err(ShardMapError::TensorSpanTooLarge {
                    name,
                    start: pair.start(),
                    end: pair.end(),
                    limit: self.max_split_len,
                });
            }

            let range_start = group.values().map(|p| p.start()).min().unwrap_or(anchor);
            let range_end = group.values().map(|p| p.end()).max().unwrap_or(anchor);
            let range = OffsetPair::new(range_start, range_end).ok_or(
                ShardMapError::PackingViolation { expected: range_start, actual: range_end },
            )?;

            let mut tensors = BTreeMap::new();
            for (name, pair) in group {
                let rebased = pair.rebase(anchor).ok_or(ShardMapError::PackingViolation {
                    expected: anchor,
                    actual: pair.start(),
                })?;
                debug!("Adding tensor {} to split {} as {}", name, range, rebased);
                tensors.insert(name.to_string(), rebased);
            }

            debug!("Adding split {} with {} tensors", range, tensors.len());
            splits.push(Split { range, base: anchor, tensors });
            boundary = range_end;
        }

        Ok(splits)
    }
}

/// Plan with the default ceiling and strict packing.
pub fn plan(table: &TensorOffsetTable, data_len: u64) -> Result<Vec<Split>> {
    SplitPlanner::default().plan(table, data_len)
}
