//! Store overview for `revdup info`

use crate::store::StoreState;
use revdup_common::record::origin_source;
use serde::Serialize;
use std::collections::BTreeMap;

/// Origin tokens of one record that share a source name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SameSourceGroup {
    pub record_id: String,
    pub source: String,
    pub tokens: Vec<String>,
}

/// Summary of the current store content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InfoReport {
    pub records: usize,
    pub moved_dupe_ids: usize,
    pub status_counts: BTreeMap<String, usize>,
    /// Records per origin source name
    pub source_counts: BTreeMap<String, usize>,
    /// Records that already hold more than one token from a source
    pub same_source_groups: Vec<SameSourceGroup>,
}

pub fn info_report(state: &StoreState) -> InfoReport {
    let mut report = InfoReport {
        records: state.records.len(),
        moved_dupe_ids: state.moved_dupe_ids.len(),
        ..InfoReport::default()
    };

    for record in state.records.values() {
        *report
            .status_counts
            .entry(record.status().to_string())
            .or_default() += 1;

        let mut by_source: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for token in record.origin() {
            by_source.entry(origin_source(token)).or_default().push(token.clone());
        }
        for (source, tokens) in by_source {
            *report.source_counts.entry(source.to_string()).or_default() += 1;
            if tokens.len() > 1 {
                report.same_source_groups.push(SameSourceGroup {
                    record_id: record.id().to_string(),
                    source: source.to_string(),
                    tokens,
                });
            }
        }
    }
    report
}

impl InfoReport {
    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{} record(s), {} merged-away id(s)",
            self.records, self.moved_dupe_ids
        )];
        lines.push("Status:".to_string());
        for (status, count) in &self.status_counts {
            lines.push(format!("  {:<30} {}", status, count));
        }
        lines.push("Sources:".to_string());
        for (source, count) in &self.source_counts {
            lines.push(format!("  {:<30} {}", source, count));
        }
        if !self.same_source_groups.is_empty() {
            lines.push("Same-source merges present:".to_string());
            for group in &self.same_source_groups {
                lines.push(format!(
                    "  {} ({}): {}",
                    group.record_id,
                    group.source,
                    group.tokens.join(", ")
                ));
            }
        }
        lines
    }
}
