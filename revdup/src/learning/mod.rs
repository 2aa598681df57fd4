//! Active-learning deduplication
//!
//! The classifier is a pure interface: `train(labeled pairs) -> model` and
//! `score(model, pair) -> probability`. The default implementation is a
//! logistic regression over the field similarities plus one "missing"
//! indicator per field.

pub mod artifacts;
pub mod training;

pub use artifacts::{ArtifactLock, ArtifactPaths, TrainingData};
pub use training::{
    CuratedIndex, CuratedVerdict, LabelResponse, LabelStats, Labeler, Trainer, TrainingOptions,
    TrainingOutcome, TrainingState,
};

use crate::error::{DedupeError, Result};
use crate::similarity::{classify, field_similarities, ComparisonRecord, ScoredPair};
use revdup_common::config::DedupeSettings;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Number of classifier features
pub const FEATURE_COUNT: usize = 14;

/// Default recall the decision cut-off is calibrated to
pub const DEFAULT_TARGET_RECALL: f64 = 0.9;

/// Learned classifier parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Probability reaching the target recall on the training matches
    pub threshold: f64,
}

/// Pair classifier
pub trait Classifier: Send + Sync {
    fn train(&self, pairs: &TrainingData) -> Result<TrainedModel>;

    fn score(&self, model: &TrainedModel, a: &ComparisonRecord, b: &ComparisonRecord) -> Result<f64>;
}

/// Logistic regression trained by batch gradient descent with L2 regularization
#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    pub target_recall: f64,
}

impl Default for LogisticClassifier {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 2000,
            l2: 0.001,
            target_recall: DEFAULT_TARGET_RECALL,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn predict(weights: &[f64], bias: f64, features: &[f64; FEATURE_COUNT]) -> f64 {
    let z: f64 = weights.iter().zip(features.iter()).map(|(w, x)| w * x).sum::<f64>() + bias;
    sigmoid(z)
}

impl Classifier for LogisticClassifier {
    fn train(&self, pairs: &TrainingData) -> Result<TrainedModel> {
        let samples: Vec<([f64; FEATURE_COUNT], f64)> = pairs
            .matches
            .iter()
            .map(|(a, b)| (field_similarities(a, b).features(), 1.0))
            .chain(
                pairs
                    .distinct
                    .iter()
                    .map(|(a, b)| (field_similarities(a, b).features(), 0.0)),
            )
            .collect();

        if pairs.matches.is_empty() || pairs.distinct.is_empty() {
            return Err(DedupeError::InputIneligible(
                "training needs both match and distinct labels".to_string(),
            ));
        }

        // Class weights so the minority class is not drowned out
        let n = samples.len() as f64;
        let pos_weight = n / (2.0 * pairs.matches.len() as f64);
        let neg_weight = n / (2.0 * pairs.distinct.len() as f64);

        let mut weights = vec![0.0; FEATURE_COUNT];
        let mut bias = 0.0;
        for _ in 0..self.epochs {
            let mut grad_w = vec![0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for (features, label) in &samples {
                let sample_weight = if *label > 0.5 { pos_weight } else { neg_weight };
                let error = (predict(&weights, bias, features) - label) * sample_weight;
                for (g, x) in grad_w.iter_mut().zip(features.iter()) {
                    *g += error * x;
                }
                grad_b += error;
            }
            for (w, g) in weights.iter_mut().zip(grad_w.iter()) {
                *w -= self.learning_rate * (g / n + self.l2 * *w);
            }
            bias -= self.learning_rate * grad_b / n;
        }

        let mut match_probabilities: Vec<f64> = samples
            .iter()
            .filter(|(_, label)| *label > 0.5)
            .map(|(features, _)| predict(&weights, bias, features))
            .collect();
        match_probabilities.sort_by(|a, b| a.total_cmp(b));
        let cut_index = ((1.0 - self.target_recall) * match_probabilities.len() as f64).floor() as usize;
        let calibrated = match_probabilities
            .get(cut_index.min(match_probabilities.len().saturating_sub(1)))
            .copied()
            .unwrap_or(0.5);
        let threshold = calibrated.min(0.5);

        info!(
            samples = samples.len(),
            matches = pairs.matches.len(),
            distinct = pairs.distinct.len(),
            threshold,
            "Classifier trained"
        );
        Ok(TrainedModel {
            weights,
            bias,
            threshold,
        })
    }

    fn score(&self, model: &TrainedModel, a: &ComparisonRecord, b: &ComparisonRecord) -> Result<f64> {
        if a.is_blank() || b.is_blank() {
            return Err(DedupeError::PairUnscored {
                id_a: a.id.clone(),
                id_b: b.id.clone(),
                reason: "every compared field is missing".to_string(),
            });
        }
        if model.weights.len() != FEATURE_COUNT {
            return Err(DedupeError::CorruptArtifact(format!(
                "model has {} weights, expected {}",
                model.weights.len(),
                FEATURE_COUNT
            )));
        }
        let features = field_similarities(a, b).features();
        Ok(predict(&model.weights, model.bias, &features))
    }
}

/// Result of scoring a batch of candidate pairs
#[derive(Debug, Default)]
pub struct ScoringOutcome {
    pub pairs: Vec<ScoredPair>,
    pub unscored: Vec<DedupeError>,
}

/// Score candidate pairs in parallel
///
/// Match probabilities are decided against `non_dup_threshold` and
/// `dup_threshold`, so a probability between the two is a potential
/// duplicate. Pairs whose records are unknown or that the classifier cannot
/// score are reported in `unscored`; they never abort the batch.
pub fn score_pairs(
    classifier: &dyn Classifier,
    model: &TrainedModel,
    settings: &DedupeSettings,
    records: &HashMap<String, ComparisonRecord>,
    candidates: &[(String, String)],
) -> ScoringOutcome {
    let results: Vec<Result<ScoredPair>> = candidates
        .par_iter()
        .map(|(id_a, id_b)| {
            let (a, b) = match (records.get(id_a), records.get(id_b)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(DedupeError::PairUnscored {
                        id_a: id_a.clone(),
                        id_b: id_b.clone(),
                        reason: "record not in working set".to_string(),
                    })
                }
            };
            let score = classifier.score(model, a, b)?;
            Ok(ScoredPair::new(id_a, id_b, score, classify(score, settings)))
        })
        .collect();

    let mut outcome = ScoringOutcome::default();
    for result in results {
        match result {
            Ok(pair) => outcome.pairs.push(pair),
            Err(e) => outcome.unscored.push(e),
        }
    }
    debug!(
        scored = outcome.pairs.len(),
        unscored = outcome.unscored.len(),
        "Pair scoring complete"
    );
    outcome
}
