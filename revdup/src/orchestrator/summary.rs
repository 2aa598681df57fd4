//! End-of-run summary

use crate::error::DedupeError;
use crate::merge::MergeCounters;
use serde::{Deserialize, Serialize};

/// How pairs were decided in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    /// Trained classifier
    Model,
    /// Similarity thresholds only
    Simple,
    /// No trained model and too many records for the simple mode
    Skipped,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupeSummary {
    pub method: Option<ScoringMethod>,
    pub eligible: usize,
    pub background: usize,
    pub candidate_pairs: usize,
    pub scored_pairs: usize,
    pub unscored_pairs: usize,
    pub potential_duplicates_unresolved: usize,
    pub clusters_merged: usize,
    pub clusters_below_threshold: usize,
    pub merges_applied: usize,
    pub prevented_same_source: usize,
    pub prevented_cross_level: usize,
    pub prevented_invalid: usize,
    pub same_source_warned: usize,
    pub promoted: usize,
}

impl DedupeSummary {
    pub(crate) fn record_merges(&mut self, counters: &MergeCounters) {
        self.merges_applied = counters.applied;
        self.prevented_same_source = counters.prevented_same_source;
        self.prevented_cross_level = counters.prevented_cross_level;
        self.prevented_invalid = counters.prevented_invalid;
        self.same_source_warned = counters.same_source_warned;
    }

    pub fn prevented(&self) -> usize {
        self.prevented_same_source + self.prevented_cross_level + self.prevented_invalid
    }

    /// One-line summary for the CLI
    pub fn display_string(&self) -> String {
        let mut line = format!(
            "Dedupe complete: {} merge(s) applied, {} prevented (same-source: {}, cross-level: {}, invalid: {}), {} record(s) promoted",
            self.merges_applied,
            self.prevented(),
            self.prevented_same_source,
            self.prevented_cross_level,
            self.prevented_invalid,
            self.promoted
        );
        if self.unscored_pairs > 0 {
            line.push_str(&format!(", {} unscored pair(s)", self.unscored_pairs));
        }
        if self.potential_duplicates_unresolved > 0 {
            line.push_str(&format!(
                ", {} potential duplicate(s) left unresolved",
                self.potential_duplicates_unresolved
            ));
        }
        if self.method == Some(ScoringMethod::Skipped) {
            line.push_str(" (no trained classifier: run `revdup train` first)");
        }
        line
    }
}

/// Summary line for a run that aborted
pub fn failure_line(error: &DedupeError) -> String {
    format!("Dedupe aborted ({}): {}", error.kind(), error)
}
