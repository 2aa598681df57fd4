//! Similarity-only duplicate identification for small record sets
//!
//! Background records come first in the queue, eligible records after them.
//! Each eligible record is compared with every record before it; its best
//! match decides: at or below `non_dup_threshold` nothing happens, at or
//! above `dup_threshold` the pair is a duplicate, and anything in between is
//! a potential duplicate that a labeler may confirm in a second pass.

use crate::error::{DedupeError, Result};
use crate::learning::{LabelResponse, LabelStats, Labeler};
use crate::similarity::{classify, similarity, ComparisonRecord, Decision, ScoredPair};
use revdup_common::config::DedupeSettings;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Decisions of a simple-mode pass
#[derive(Debug, Default)]
pub struct SimpleOutcome {
    /// Pairs decided (or confirmed) as duplicates
    pub duplicates: Vec<ScoredPair>,
    /// Potential duplicates nobody labeled
    pub unresolved: Vec<ScoredPair>,
    /// Eligible records that got a best match
    pub compared: usize,
}

/// Best-match decisions for every eligible record
pub fn best_matches(
    queue: &[ComparisonRecord],
    eligible: &HashSet<String>,
    settings: &DedupeSettings,
) -> Vec<ScoredPair> {
    let mut decisions = Vec::new();
    for (index, record) in queue.iter().enumerate() {
        if !eligible.contains(&record.id) || index == 0 {
            continue;
        }
        let mut best: Option<(&ComparisonRecord, f64)> = None;
        for previous in &queue[..index] {
            let score = similarity(previous, record);
            if best.map(|(_, s)| score > s).unwrap_or(score > 0.0) {
                best = Some((previous, score));
            }
        }
        let Some((other, score)) = best else {
            continue;
        };
        let decision = classify(score, settings);
        debug!(
            record_id = %record.id,
            other_id = %other.id,
            score,
            decision = ?decision,
            "Best match"
        );
        decisions.push(ScoredPair::new(&record.id, &other.id, score, decision));
    }
    decisions
}

/// Run the simple mode, asking `labeler` about potential duplicates
pub async fn simple_dedupe(
    queue: &[ComparisonRecord],
    eligible: &HashSet<String>,
    settings: &DedupeSettings,
    labeler: Option<&mut (dyn Labeler + '_)>,
    cancel: &CancellationToken,
) -> Result<SimpleOutcome> {
    let decisions = best_matches(queue, eligible, settings);
    let mut outcome = SimpleOutcome {
        compared: decisions.len(),
        ..SimpleOutcome::default()
    };
    let mut potential = Vec::new();
    for pair in decisions {
        match pair.decision {
            Decision::Duplicate => outcome.duplicates.push(pair),
            Decision::PotentialDuplicate => potential.push(pair),
            Decision::NoDuplicate => {}
        }
    }

    let (confirmed, unresolved) = label_potential_duplicates(queue, potential, labeler, cancel).await?;
    outcome.duplicates.extend(confirmed);
    outcome.unresolved = unresolved;
    info!(
        duplicates = outcome.duplicates.len(),
        unresolved = outcome.unresolved.len(),
        "Simple duplicate identification complete"
    );
    Ok(outcome)
}

/// Ask `labeler` about potential duplicates
///
/// Returns the pairs labeled as matches (now `Duplicate`) and the pairs left
/// unlabeled. Pairs labeled distinct are dropped. Without a labeler every
/// pair stays unresolved.
pub async fn label_potential_duplicates(
    queue: &[ComparisonRecord],
    potential: Vec<ScoredPair>,
    labeler: Option<&mut (dyn Labeler + '_)>,
    cancel: &CancellationToken,
) -> Result<(Vec<ScoredPair>, Vec<ScoredPair>)> {
    let Some(labeler) = labeler else {
        if !potential.is_empty() {
            info!(potential = potential.len(), "Potential duplicates left for manual review");
        }
        return Ok((Vec::new(), potential));
    };

    let by_id: HashMap<&str, &ComparisonRecord> = queue.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut labels: Vec<Option<bool>> = vec![None; potential.len()];
    let mut index = 0;
    while index < potential.len() {
        let pair = &potential[index];
        let (Some(a), Some(b)) = (by_id.get(pair.id_a.as_str()), by_id.get(pair.id_b.as_str())) else {
            index += 1;
            continue;
        };
        let stats = LabelStats {
            matches: labels.iter().filter(|l| **l == Some(true)).count(),
            distincts: labels.iter().filter(|l| **l == Some(false)).count(),
            remaining: potential.len() - index,
        };
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DedupeError::Cancelled),
            response = labeler.present((*a, *b), &stats) => response,
        };
        match response {
            LabelResponse::Match => labels[index] = Some(true),
            LabelResponse::Distinct => labels[index] = Some(false),
            LabelResponse::Uncertain => labels[index] = None,
            LabelResponse::Previous => {
                index = index.saturating_sub(1);
                continue;
            }
            LabelResponse::Finished => break,
            LabelResponse::Cancel => return Err(DedupeError::LabelerCancelled),
        }
        index += 1;
    }

    let mut confirmed = Vec::new();
    let mut unresolved = Vec::new();
    for (pair, label) in potential.into_iter().zip(labels) {
        match label {
            Some(true) => confirmed.push(ScoredPair {
                decision: Decision::Duplicate,
                ..pair
            }),
            Some(false) => {}
            None => unresolved.push(pair),
        }
    }
    Ok((confirmed, unresolved))
}
