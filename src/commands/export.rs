use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::config::Config;
use crate::core::gpu::{GpuSnapshot, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

pub fn execute(matches: &ArgMatches, config: &Config) -> Result<()> {
    let format = if matches.get_flag("csv") {
        ExportFormat::Csv
    } else {
        ExportFormat::Json
    };
    let dir = matches
        .get_one::<PathBuf>("dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let mut session = Session::init(config);
    let snapshot = session
        .snapshot()
        .map_err(|e| anyhow::anyhow!("No GPU telemetry available: {}", e))?;

    let path = export_snapshot(&snapshot, format, &dir, Local::now())?;
    println!("{} {}", "Export completed:".green(), path.display());
    Ok(())
}

/// `gpustat_export_<date>_<time>.<ext>`, with dashes so the name is valid everywhere
pub fn export_file_name(format: ExportFormat, at: DateTime<Local>) -> String {
    format!(
        "gpustat_export_{}.{}",
        at.format("%Y-%m-%d_%H-%M-%S"),
        format.extension()
    )
}

/// Write one snapshot into `dir` and return the file written
pub fn export_snapshot(
    snapshot: &GpuSnapshot,
    format: ExportFormat,
    dir: &Path,
    at: DateTime<Local>,
) -> Result<PathBuf> {
    let contents = match format {
        ExportFormat::Json => snapshot.to_json_pretty()?,
        ExportFormat::Csv => snapshot.to_csv(),
    };

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory: {:?}", dir))?;
    let path = dir.join(export_file_name(format, at));
    fs::write(&path, contents).with_context(|| format!("Failed to write export: {:?}", path))?;

    log::debug!("Exported {} GPU record(s) to {:?}", snapshot.gpus.len(), path);
    Ok(path)
}
