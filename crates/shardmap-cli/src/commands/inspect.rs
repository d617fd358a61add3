//! Model directory summary

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use shardmap_common::LoadConfig;
use shardmap_loader::ShardIndex;
use std::path::PathBuf;
use tracing::debug;

use crate::output::{OutputFormat, format_bytes};

/// Inspect command arguments
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Model root directory holding the index document
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Also list every tensor with its dtype, shape and region
    #[arg(long)]
    pub tensors: bool,

    /// Output format as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub root: String,
    pub index_file: String,
    pub total_size: Option<u64>,
    pub tensor_count: usize,
    pub region_count: usize,
    pub files: Vec<FileReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tensors: Vec<TensorReport>,
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub file: String,
    pub file_len: u64,
    pub data_offset: u64,
    pub tensors: usize,
    pub regions: usize,
}

#[derive(Debug, Serialize)]
pub struct TensorReport {
    pub name: String,
    pub file: String,
    pub dtype: String,
    pub shape: Vec<u64>,
    pub region: usize,
    pub start: u64,
    pub end: u64,
}

impl InspectCommand {
    pub fn execute(&self, config: &LoadConfig) -> Result<()> {
        let index = ShardIndex::open(&self.root, config.clone())
            .with_context(|| format!("Failed to load model from {}", self.root.display()))?;
        let report = self.report(&index, config);
        debug!("Inspected {} files", report.files.len());
        OutputFormat::from_json_flag(self.json).emit(&report, print_report)
    }

    pub fn report(&self, index: &ShardIndex, config: &LoadConfig) -> InspectReport {
        let files = index
            .shard_files()
            .into_iter()
            .filter_map(|file| {
                let map = index.region_map(file)?;
                Some(FileReport {
                    file: file.to_string(),
                    file_len: map.file_len(),
                    data_offset: map.end_of_header(),
                    tensors: map.locations().len(),
                    regions: map.regions().len(),
                })
            })
            .collect();

        let tensors = if self.tensors {
            index
                .tensor_names()
                .filter_map(|name| {
                    let (file, location) = index.tensor_info(name)?;
                    Some(TensorReport {
                        name: name.to_string(),
                        file: file.to_string(),
                        dtype: location.dtype.to_string(),
                        shape: location.shape.clone(),
                        region: location.region.0,
                        start: location.offsets.start(),
                        end: location.offsets.end(),
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        InspectReport {
            root: self.root.display().to_string(),
            index_file: config.index_file.clone(),
            total_size: index.document().total_size(),
            tensor_count: index.tensor_count(),
            region_count: index.region_count(),
            files,
            tensors,
        }
    }
}

fn print_report(report: &InspectReport) {
    println!("Model:    {}", report.root);
    println!("Index:    {}", report.index_file);
    if let Some(total) = report.total_size {
        println!("Size:     {} ({})", format_bytes(total), total);
    }
    println!("Tensors:  {}", report.tensor_count);
    println!("Regions:  {}", report.region_count);
    println!();
    for f in &report.files {
        println!(
            "  {:<40} {:>12}  data@{:<8} {:>5} tensors {:>3} regions",
            f.file,
            format_bytes(f.file_len),
            f.data_offset,
            f.tensors,
            f.regions
        );
    }
    if !report.tensors.is_empty() {
        println!();
        for t in &report.tensors {
            println!(
                "  {:<48} {:<6} {:<16} {} #{} [{}, {})",
                t.name,
                t.dtype,
                format!("{:?}", t.shape),
                t.file,
                t.region,
                t.start,
                t.end
            );
        }
    }
}
