//! Persistence layer.
//!
//! The engine keeps no history between runs. The only thing written to disk
//! is the end-of-run summary, as pretty-printed JSON.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::accountant::RunSummary;
use crate::types::TradeGateError;

/// Default summary file path.
pub const DEFAULT_SUMMARY_FILE: &str = "tradegate_summary.json";

/// Write the run summary, replacing any previous file.
pub fn save_summary(summary: &RunSummary, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SUMMARY_FILE);
    let json = serde_json::to_string_pretty(summary).context("Failed to serialise run summary")?;

    std::fs::write(path, &json)
        .map_err(|e| TradeGateError::Storage(format!("failed to write summary to {path}: {e}")))?;

    info!(path, trades = summary.total_trades, "Run summary saved");
    Ok(())
}

/// Read a previously written summary. Returns None if the file doesn't exist.
pub fn load_summary(path: Option<&str>) -> Result<Option<RunSummary>> {
    let path = path.unwrap_or(DEFAULT_SUMMARY_FILE);

    if !Path::new(path).exists() {
        debug!(path, "No summary file found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read summary from {path}"))?;
    let summary: RunSummary =
        serde_json::from_str(&json).context(format!("Failed to parse summary from {path}"))?;
    Ok(Some(summary))
}
