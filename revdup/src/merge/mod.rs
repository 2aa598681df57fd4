//! Merge application
//!
//! Clusters (or user-given pairs) are folded into a single surviving record.
//! Each pair passes the legality gates in `policy` first; a rejected pair is
//! counted and the rest of the cluster still merges. Every merge records
//! `moved_dupe_ids[dupe] = survivor` and re-runs the quality model on the
//! survivor.

pub mod fuse;
pub mod log;
pub mod policy;
pub mod unmerge;

pub use fuse::merge_into;
pub use log::{append_merge_log, append_same_source_report, read_merge_log, validation_export, MergeLogEntry};
pub use policy::{is_cross_level, select_primary, RejectReason, SameSource};
pub use unmerge::{unmerge, UnmergeReport};

use crate::cluster::Cluster;
use crate::error::{DedupeError, Result};
use crate::store::StoreState;
use revdup_common::config::{DedupeSettings, SameSourcePolicy};
use revdup_common::time::now_iso8601;
use revdup_common::{QualityModel, RecordStatus};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Per-run merge counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounters {
    pub applied: usize,
    pub prevented_same_source: usize,
    pub prevented_cross_level: usize,
    pub prevented_invalid: usize,
    /// Same-source merges applied under the `warn` policy
    pub same_source_warned: usize,
}

impl MergeCounters {
    pub fn prevented(&self) -> usize {
        self.prevented_same_source + self.prevented_cross_level + self.prevented_invalid
    }

    fn count_rejection(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::CrossLevel => self.prevented_cross_level += 1,
            RejectReason::SameSource { .. } => self.prevented_same_source += 1,
            RejectReason::InvalidMerge { .. } => self.prevented_invalid += 1,
        }
    }
}

/// Everything a batch of merges produced
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub counters: MergeCounters,
    pub log_entries: Vec<MergeLogEntry>,
    /// `(primary, dupe)` pairs blocked by the same-source gate
    pub same_source_rejections: Vec<(String, String)>,
    /// Every rejected pair, as `MergeRejected` errors
    pub rejections: Vec<DedupeError>,
}

/// One applied pair merge
#[derive(Debug, Clone, PartialEq, Eq)]
struct MergeStep {
    primary_id: String,
    dupe_id: String,
    same_source: bool,
}

/// Applies merges to a store state
pub struct MergeApplicator<'a> {
    settings: &'a DedupeSettings,
    quality: &'a QualityModel,
}

impl<'a> MergeApplicator<'a> {
    pub fn new(settings: &'a DedupeSettings, quality: &'a QualityModel) -> Self {
        Self { settings, quality }
    }

    /// Merge every cluster, in ascending cluster id order
    pub fn apply_clusters(&self, state: &mut StoreState, clusters: &[Cluster]) -> Result<MergeOutcome> {
        let mut ordered: Vec<&Cluster> = clusters.iter().collect();
        ordered.sort_by_key(|c| c.cluster_id);

        let mut outcome = MergeOutcome::default();
        for cluster in ordered {
            let label = cluster.cluster_id;
            self.apply_set(state, label, &cluster.members, cluster.score, &mut outcome)?;
        }
        info!(
            applied = outcome.counters.applied,
            prevented = outcome.counters.prevented(),
            "Cluster merges applied"
        );
        Ok(outcome)
    }

    /// Merge user-given id pairs through the same gates
    pub fn apply_pairs(&self, state: &mut StoreState, pairs: &[(String, String)]) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome::default();
        for (index, (a, b)) in pairs.iter().enumerate() {
            for id in [a, b] {
                if !state.records.contains_key(id) && !state.moved_dupe_ids.contains_key(id) {
                    return Err(DedupeError::InputIneligible(format!("unknown record id {}", id)));
                }
            }
            self.apply_set(state, index, &[a.clone(), b.clone()], 1.0, &mut outcome)?;
        }
        Ok(outcome)
    }

    fn apply_set(
        &self,
        state: &mut StoreState,
        cluster_id: usize,
        members: &[String],
        score: f64,
        outcome: &mut MergeOutcome,
    ) -> Result<()> {
        let resolved: BTreeSet<String> = members
            .iter()
            .map(|id| state.resolve_survivor(id).to_string())
            .filter(|id| state.records.contains_key(id))
            .collect();
        if resolved.len() < 2 {
            debug!(cluster_id, "Cluster collapses to one record, skipped");
            return Ok(());
        }

        let mut ids = resolved.into_iter();
        let mut survivor = match ids.next() {
            Some(id) => id,
            None => return Ok(()),
        };
        let mut merged_ids = Vec::new();
        let mut same_source = false;

        for member in ids {
            match self.merge_pair(state, &survivor, &member) {
                Ok(step) => {
                    outcome.counters.applied += 1;
                    if step.same_source {
                        outcome.counters.same_source_warned += 1;
                        same_source = true;
                    }
                    merged_ids.push(step.dupe_id);
                    survivor = step.primary_id;
                }
                Err(DedupeError::MergeRejected {
                    primary_id,
                    dupe_id,
                    reason,
                }) => {
                    outcome.counters.count_rejection(&reason);
                    if matches!(reason, RejectReason::SameSource { .. }) {
                        outcome
                            .same_source_rejections
                            .push((primary_id.clone(), dupe_id.clone()));
                    }
                    outcome.rejections.push(DedupeError::MergeRejected {
                        primary_id,
                        dupe_id,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if !merged_ids.is_empty() {
            outcome.log_entries.push(MergeLogEntry {
                cluster_id,
                primary_id: survivor,
                merged_ids,
                score,
                same_source,
                timestamp: now_iso8601(),
            });
        }
        Ok(())
    }

    /// Gate and apply one pair merge
    fn merge_pair(&self, state: &mut StoreState, id_a: &str, id_b: &str) -> Result<MergeStep> {
        let (a, b) = match (state.records.get(id_a), state.records.get(id_b)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(DedupeError::InvariantViolation(format!(
                    "merge of {} and {} refers to a missing record",
                    id_a, id_b
                )))
            }
        };
        let (primary, dupe) = select_primary(a, b);
        let rejected = |reason: RejectReason| DedupeError::MergeRejected {
            primary_id: primary.id().to_string(),
            dupe_id: dupe.id().to_string(),
            reason,
        };

        if !self.settings.force_cross_level && is_cross_level(primary.entrytype(), dupe.entrytype()) {
            return Err(rejected(RejectReason::CrossLevel));
        }

        let mut same_source = false;
        if let SameSource::Conflict(sources) = policy::same_source(primary, dupe) {
            match self.settings.same_source_policy {
                SameSourcePolicy::Prevent => {
                    info!(
                        primary_id = %primary.id(),
                        dupe_id = %dupe.id(),
                        sources = %sources.join(","),
                        "Same-source merge prevented"
                    );
                    return Err(rejected(RejectReason::SameSource { sources }));
                }
                SameSourcePolicy::Warn => {
                    warn!(
                        primary_id = %primary.id(),
                        dupe_id = %dupe.id(),
                        sources = %sources.join(","),
                        "Applying same-source merge"
                    );
                    same_source = true;
                }
            }
        }

        if let Some(detail) = policy::invalid_merge(primary, dupe) {
            return Err(rejected(RejectReason::InvalidMerge { detail }));
        }

        let primary_id = primary.id().to_string();
        let dupe_id = dupe.id().to_string();
        let dupe = match state.records.remove(&dupe_id) {
            Some(dupe) => dupe,
            None => return Err(DedupeError::InvariantViolation(format!("record {} vanished", dupe_id))),
        };
        let primary = match state.records.get_mut(&primary_id) {
            Some(primary) => primary,
            None => return Err(DedupeError::InvariantViolation(format!("record {} vanished", primary_id))),
        };

        merge_into(primary, &dupe, &self.settings.preferred_masterdata_sources);
        self.quality.run(primary, false);

        for target in state.moved_dupe_ids.values_mut() {
            if *target == dupe_id {
                *target = primary_id.clone();
            }
        }
        state.moved_dupe_ids.insert(dupe_id.clone(), primary_id.clone());

        debug!(primary_id = %primary_id, dupe_id = %dupe_id, "Records merged");
        Ok(MergeStep {
            primary_id,
            dupe_id,
            same_source,
        })
    }

    /// Promote every remaining `md_prepared` record to `md_processed`
    pub fn promote_remaining(&self, state: &mut StoreState) -> Result<usize> {
        let mut promoted = 0;
        for record in state.records.values_mut() {
            if record.status() == RecordStatus::MdPrepared {
                record.set_status(RecordStatus::MdProcessed)?;
                promoted += 1;
            }
        }
        info!(promoted, "Records promoted to md_processed");
        Ok(promoted)
    }
}
