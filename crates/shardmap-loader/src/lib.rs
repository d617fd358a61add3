//! Memory-mapped loading of sharded safetensors models.
//!
//! A shard larger than one mapping can address is cut into several
//! regions by the [`SplitPlanner`]; each region holds whole tensors whose
//! offsets are rebased to it. [`ShardIndex`] ties every region of every
//! shard together behind name-based lookup.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! let index = shardmap_loader::load(Path::new("/models/llama")).unwrap();
//! let view = index.lookup("model.embed_tokens.weight").unwrap();
//! println!("{} {:?} {} bytes", view.dtype(), view.shape(), view.len());
//! ```

pub mod planner;
pub mod region;
pub mod shard_index;
pub mod view;

pub use planner::{Split, SplitPlanner, plan};
pub use region::{Region, RegionId, RegionMap, TensorLocation, read_header};
pub use shard_index::{ShardIndex, SplitSummary};
pub use view::WeightView;

pub use shardmap_common::{LoadConfig, RebasePolicy, Result, ShardMapError};

use std::path::Path;

/// Load the model rooted at `root` with default settings.
pub fn load(root: &Path) -> Result<ShardIndex> {
    ShardIndex::open(root, LoadConfig::default())
}

/// Load with settings from `SHARDMAP_*` environment variables.
pub fn load_from_env(root: &Path) -> Result<ShardIndex> {
    ShardIndex::open(root, LoadConfig::from_env()?)
}
