//! Split plan of a single shard file

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use shardmap_common::{LoadConfig, ShardMapError};
use shardmap_loader::{SplitPlanner, read_header};
use std::fs::File;
use std::path::PathBuf;

use crate::output::{OutputFormat, format_bytes};

/// Plan command arguments
#[derive(Args, Debug)]
pub struct PlanCommand {
    /// Shard file to plan
    #[arg(value_name = "SHARD")]
    pub shard: PathBuf,

    /// List the members of every split
    #[arg(long)]
    pub tensors: bool,

    /// Output format as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub shard: String,
    pub file_len: u64,
    pub data_offset: u64,
    pub data_len: u64,
    pub max_split_len: u64,
    pub rebase_policy: String,
    pub splits: Vec<SplitReport>,
}

#[derive(Debug, Serialize)]
pub struct SplitReport {
    pub start: u64,
    pub end: u64,
    pub base: u64,
    pub tensor_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tensors: Vec<PlannedTensor>,
}

#[derive(Debug, Serialize)]
pub struct PlannedTensor {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

impl PlanCommand {
    pub fn execute(&self, config: &LoadConfig) -> Result<()> {
        let report = self.report(config)?;
        OutputFormat::from_json_flag(self.json).emit(&report, print_report)
    }

    /// Decode the header and plan without mapping any data.
    pub fn report(&self, config: &LoadConfig) -> Result<PlanReport> {
        let file = File::open(&self.shard)
            .map_err(|e| ShardMapError::file_not_found(&self.shard, e))
            .with_context(|| format!("Failed to open shard {}", self.shard.display()))?;
        let file_len = file.metadata()?.len();
        let (table, data_offset) =
            read_header(&file, &self.shard, file_len, config.header_probe_len)?;
        let data_len = file_len - data_offset;

        let planner = SplitPlanner::from_config(config);
        let splits = planner
            .plan(&table, data_len)
            .with_context(|| format!("Failed to plan {}", self.shard.display()))?;

        let splits = splits
            .iter()
            .map(|split| SplitReport {
                start: split.range().start(),
                end: split.range().end(),
                base: split.base(),
                tensor_count: split.tensors().len(),
                tensors: if self.tensors {
                    split
                        .tensors()
                        .iter()
                        .map(|(name, pair)| PlannedTensor {
                            name: name.clone(),
                            start: pair.start(),
                            end: pair.end(),
                        })
                        .collect()
                } else {
                    Vec::new()
                },
            })
            .collect();

        Ok(PlanReport {
            shard: self.shard.display().to_string(),
            file_len,
            data_offset,
            data_len,
            max_split_len: planner.max_split_len(),
            rebase_policy: planner.policy().to_string(),
            splits,
        })
    }
}

fn print_report(report: &PlanReport) {
    println!("Shard:    {}", report.shard);
    println!("Data:     {} at offset {}", format_bytes(report.data_len), report.data_offset);
    println!("Ceiling:  {} ({})", format_bytes(report.max_split_len), report.rebase_policy);
    println!("Splits:   {}", report.splits.len());
    for (i, s) in report.splits.iter().enumerate() {
        println!(
            "  #{:<3} [{}, {})  {:>10}  base {}  {} tensors",
            i,
            s.start,
            s.end,
            format_bytes(s.end - s.start),
            s.base,
            s.tensor_count
        );
        for t in &s.tensors {
            println!("        {:<48} [{}, {})", t.name, t.start, t.end);
        }
    }
}
