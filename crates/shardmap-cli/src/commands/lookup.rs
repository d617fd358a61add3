//! Tensor lookup by name

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use shardmap_common::LoadConfig;
use shardmap_loader::ShardIndex;
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Lookup command arguments
#[derive(Args, Debug)]
pub struct LookupCommand {
    /// Model root directory holding the index document
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Tensor name
    #[arg(value_name = "TENSOR")]
    pub tensor: String,

    /// Print the first N values (F32, F16 and BF16 only)
    #[arg(long, value_name = "N")]
    pub values: Option<usize>,

    /// Output format as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct LookupReport {
    pub name: String,
    pub file: String,
    pub dtype: String,
    pub shape: Vec<u64>,
    pub numel: u64,
    pub bytes: usize,
    pub region: usize,
    pub start: u64,
    pub end: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f32>>,
}

impl LookupCommand {
    pub fn execute(&self, config: &LoadConfig) -> Result<()> {
        let index = ShardIndex::open(&self.root, config.clone())
            .with_context(|| format!("Failed to load model from {}", self.root.display()))?;
        let report = self.report(&index)?;
        OutputFormat::from_json_flag(self.json).emit(&report, print_report)
    }

    pub fn report(&self, index: &ShardIndex) -> Result<LookupReport> {
        let view = index.lookup(&self.tensor)?;
        let (file, location) = index
            .tensor_info(&self.tensor)
            .with_context(|| format!("No location recorded for {}", self.tensor))?;

        let values = match self.values {
            Some(n) => {
                let mut values = view.to_f32_vec()?;
                values.truncate(n);
                Some(values)
            }
            None => None,
        };

        Ok(LookupReport {
            name: view.name().to_string(),
            file: file.to_string(),
            dtype: view.dtype().to_string(),
            shape: view.shape().to_vec(),
            numel: view.numel(),
            bytes: view.len(),
            region: location.region.0,
            start: location.offsets.start(),
            end: location.offsets.end(),
            values,
        })
    }
}

fn print_report(report: &LookupReport) {
    println!("Tensor:   {}", report.name);
    println!("Dtype:    {}", report.dtype);
    println!("Shape:    {:?} ({} elements, {} bytes)", report.shape, report.numel, report.bytes);
    println!(
        "Location: {} region #{} [{}, {})",
        report.file, report.region, report.start, report.end
    );
    if let Some(values) = &report.values {
        println!("Values:   {values:?}");
    }
}
