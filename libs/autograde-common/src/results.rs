use crate::types::Report;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Serialize the report and write it to the results file
///
/// Missing parent directories are created. An existing file is replaced.
pub fn write_report(path: &Path, report: &Report) -> Result<()> {
    let payload = serde_json::to_string(report).context("Failed to serialize report")?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create results directory {}", parent.display())
            })?;
        }
    }

    fs::write(path, payload)
        .with_context(|| format!("Failed to write results file {}", path.display()))?;

    Ok(())
}

/// Read a previously written report back
pub fn read_report(path: &Path) -> Result<Report> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file {}", path.display()))?;
    serde_json::from_str(&content).context("Failed to parse results file")
}
