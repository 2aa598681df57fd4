//! Merge trail: JSONL merge log and same-source report

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, warn};

/// One applied cluster merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeLogEntry {
    pub cluster_id: usize,
    pub primary_id: String,
    pub merged_ids: Vec<String>,
    pub score: f64,
    /// At least one member pair shared a source name
    pub same_source: bool,
    pub timestamp: String,
}

fn open_append(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Append entries to the merge log (one JSON object per line)
pub fn append_merge_log(path: &Path, entries: &[MergeLogEntry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut file = open_append(path)?;
    for entry in entries {
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{}", line)?;
    }
    file.sync_all()?;
    debug!(path = %path.display(), entries = entries.len(), "Merge log appended");
    Ok(())
}

/// Read the merge log; unreadable lines are skipped with a warning
pub fn read_merge_log(path: &Path) -> Result<Vec<MergeLogEntry>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MergeLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path = %path.display(), line = line_no + 1, error = %e, "Skipping merge log line"),
        }
    }
    Ok(entries)
}

/// Merge log entries ordered least certain first, for manual review
pub fn validation_export(entries: &[MergeLogEntry]) -> Vec<MergeLogEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.primary_id.cmp(&b.primary_id))
    });
    sorted
}

/// Append prevented same-source merges as `primary,dupe` lines
pub fn append_same_source_report(path: &Path, pairs: &[(String, String)]) -> Result<()> {
    if pairs.is_empty() {
        return Ok(());
    }
    let mut file = open_append(path)?;
    for (primary, dupe) in pairs {
        writeln!(file, "{},{}", primary, dupe)?;
    }
    debug!(path = %path.display(), pairs = pairs.len(), "Same-source report appended");
    Ok(())
}
