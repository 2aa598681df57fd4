//! Progress events of a dedupe run

use super::DedupeSummary;
use serde::{Deserialize, Serialize};

/// Dedupe run events for progress reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DedupeEvent {
    /// Records loaded and partitioned
    RunStarted {
        records: usize,
        eligible: usize,
        background: usize,
        /// Unix timestamp (seconds since epoch)
        timestamp: i64,
    },

    /// Candidate pairs produced by blocking
    BlockingCompleted { candidate_pairs: usize, out_of_core: bool },

    /// Candidate pairs scored
    ScoringCompleted {
        scored: usize,
        unscored: usize,
        /// "model" or "simple"
        method: String,
    },

    /// Potential duplicate nobody labeled
    PotentialDuplicate { id_a: String, id_b: String, score: f64 },

    /// Match graph partitioned
    ClustersFormed {
        clusters: usize,
        to_merge: usize,
        below_threshold: usize,
    },

    /// A pair merge was blocked by a policy gate
    MergeRejected {
        primary_id: String,
        dupe_id: String,
        reason: String,
    },

    /// Save rejected, retrying on a fresh read
    StoreConflictRetry { message: String },

    /// Run finished and persisted
    RunCompleted { summary: DedupeSummary },

    /// Run aborted
    Error { kind: String, message: String },
}
