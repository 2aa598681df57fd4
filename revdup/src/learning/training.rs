//! Interactive classifier training
//!
//! State machine: `NeedsSample -> AwaitingLabel -> Training -> Ready`.
//!
//! Only one pair is outstanding at a time. Labels go into a FIFO buffer that
//! is written back to the training file whenever the session ends, including
//! on cancellation, so no labeling work is lost.

use super::artifacts::{self, ArtifactLock, ArtifactPaths, TrainingData};
use super::Classifier;
use crate::blocking::candidate_pairs;
use crate::error::{DedupeError, Result};
use crate::similarity::{similarity, ComparisonRecord};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use revdup_common::config::DedupeSettings;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Labels after which "finished" is accepted without confirmation
const MIN_LABELS_PER_CLASS_TO_FINISH: usize = 30;

/// Labels per class needed before a classifier is trained
const MIN_LABELS_PER_CLASS_TO_TRAIN: usize = 10;

/// Distinct labels with no match that trigger the mark-remaining offer
const MARK_REMAINING_DISTINCT_LIMIT: usize = 100;

/// Distinct labels allowed per match label
const BALANCE_RATIO: usize = 3;

/// Training state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainingState {
    NeedsSample,
    AwaitingLabel,
    Training,
    Ready,
}

/// Labeler answer for one presented pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelResponse {
    Match,
    Distinct,
    Uncertain,
    Finished,
    Previous,
    Cancel,
}

/// Counters shown to the labeler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelStats {
    pub matches: usize,
    pub distincts: usize,
    pub remaining: usize,
}

/// Interactive source of pair labels
#[async_trait]
pub trait Labeler: Send {
    async fn present(
        &mut self,
        pair: (&ComparisonRecord, &ComparisonRecord),
        stats: &LabelStats,
    ) -> LabelResponse;

    /// Asked when the user finishes before enough labels exist
    async fn confirm_finish(&mut self, stats: &LabelStats) -> bool;

    /// Asked after many distinct labels and no match
    async fn confirm_mark_remaining(&mut self, stats: &LabelStats) -> bool;
}

/// Curated-index verdict on two origin sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuratedVerdict {
    Duplicate,
    NonDuplicate,
    Unknown,
}

/// Read-only oracle consulted before asking the labeler
#[async_trait]
pub trait CuratedIndex: Send + Sync {
    async fn verdict(&self, origin_a: &[String], origin_b: &[String]) -> CuratedVerdict;
}

/// Knobs of a training session
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    /// Whole store fits in memory (no sampling)
    pub in_memory: bool,
    /// Disable the distinct/match balance rule
    pub balance_override: bool,
    /// Sampling seed
    pub seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            in_memory: true,
            balance_override: false,
            seed: 42,
        }
    }
}

/// How a training session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingOutcome {
    /// Classifier trained and settings persisted
    Trained { matches: usize, distincts: usize },
    /// Labels saved, training skipped
    InsufficientLabels { matches: usize, distincts: usize },
    /// Remaining pairs marked distinct at the labeler's request, training skipped
    MarkedRemainingDistinct { distincts: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Match,
    Distinct,
}

#[derive(Debug, Clone)]
struct Candidate {
    a: ComparisonRecord,
    b: ComparisonRecord,
    similarity: f64,
}

impl Candidate {
    fn new(a: ComparisonRecord, b: ComparisonRecord) -> Self {
        let similarity = similarity(&a, &b);
        Self { a, b, similarity }
    }

    fn key(&self) -> (String, String) {
        pair_key(&self.a.id, &self.b.id)
    }

    fn distinct_likely(&self) -> bool {
        self.similarity < 0.5
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// FIFO of labeled pairs
#[derive(Debug, Default)]
struct LabelBuffer {
    entries: VecDeque<(Candidate, Label)>,
}

impl LabelBuffer {
    fn from_training_data(data: TrainingData) -> Self {
        let mut buffer = Self::default();
        for (a, b) in data.matches {
            buffer.entries.push_back((Candidate::new(a, b), Label::Match));
        }
        for (a, b) in data.distinct {
            buffer.entries.push_back((Candidate::new(a, b), Label::Distinct));
        }
        buffer
    }

    fn push(&mut self, candidate: Candidate, label: Label) {
        self.entries.push_back((candidate, label));
    }

    fn pop_last(&mut self) -> Option<Candidate> {
        self.entries.pop_back().map(|(candidate, _)| candidate)
    }

    fn count(&self, label: Label) -> usize {
        self.entries.iter().filter(|(_, l)| *l == label).count()
    }

    fn labeled_keys(&self) -> BTreeSet<(String, String)> {
        self.entries.iter().map(|(c, _)| c.key()).collect()
    }

    fn to_training_data(&self) -> TrainingData {
        let mut data = TrainingData::default();
        for (candidate, label) in &self.entries {
            let pair = (candidate.a.clone(), candidate.b.clone());
            match label {
                Label::Match => data.matches.push(pair),
                Label::Distinct => data.distinct.push(pair),
            }
        }
        data
    }
}

/// Candidate queue ordered by uncertainty, with balance-deferred pairs held aside
struct CandidateQueue {
    queue: VecDeque<Candidate>,
    deferred: VecDeque<Candidate>,
}

impl CandidateQueue {
    fn len(&self) -> usize {
        self.queue.len() + self.deferred.len()
    }

    fn next(&mut self, matches: usize, distincts: usize, balance_override: bool) -> Option<Candidate> {
        let distinct_allowed = balance_override || distincts < BALANCE_RATIO * matches.max(1);
        if distinct_allowed {
            if let Some(candidate) = self.deferred.pop_front() {
                return Some(candidate);
            }
        }
        while let Some(candidate) = self.queue.pop_front() {
            if candidate.distinct_likely() && !distinct_allowed {
                debug!(
                    id_a = %candidate.a.id,
                    id_b = %candidate.b.id,
                    "Deferring distinct-likely pair for label balance"
                );
                self.deferred.push_back(candidate);
                continue;
            }
            return Some(candidate);
        }
        // Nothing else left: balance no longer applies
        self.deferred.pop_front()
    }

    fn drain(&mut self) -> Vec<Candidate> {
        self.queue.drain(..).chain(self.deferred.drain(..)).collect()
    }
}

/// Active-learning trainer
pub struct Trainer<'a> {
    settings: &'a DedupeSettings,
    options: TrainingOptions,
    paths: ArtifactPaths,
    classifier: &'a dyn Classifier,
    cancel: CancellationToken,
    state: TrainingState,
}

impl<'a> Trainer<'a> {
    pub fn new(
        settings: &'a DedupeSettings,
        options: TrainingOptions,
        paths: ArtifactPaths,
        classifier: &'a dyn Classifier,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            options,
            paths,
            classifier,
            cancel,
            state: TrainingState::NeedsSample,
        }
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    /// Select the training sample
    pub fn sample(&self, records: &[ComparisonRecord]) -> Result<Vec<ComparisonRecord>> {
        if records.is_empty() {
            return Err(DedupeError::InputIneligible("no records to train on".to_string()));
        }
        let mut sample: Vec<ComparisonRecord> = if self.options.in_memory {
            records.to_vec()
        } else {
            let size = records.len().min(self.settings.sample_size);
            let mut rng = StdRng::seed_from_u64(self.options.seed);
            records.choose_multiple(&mut rng, size).cloned().collect()
        };
        if sample.len() < self.settings.min_sample_size {
            return Err(DedupeError::SampleTooSmall {
                size: sample.len(),
                minimum: self.settings.min_sample_size,
            });
        }
        sample.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sample)
    }

    /// Unlabeled candidate pairs, most uncertain (similarity closest to 0.5) first
    fn uncertain_first(
        &self,
        sample: &[ComparisonRecord],
        labeled: &BTreeSet<(String, String)>,
    ) -> VecDeque<Candidate> {
        let by_id: HashMap<&str, &ComparisonRecord> =
            sample.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut candidates: Vec<Candidate> = candidate_pairs(sample, self.settings.max_block_size)
            .into_iter()
            .filter(|key| !labeled.contains(key))
            .filter_map(|(a, b)| {
                let (a, b) = (by_id.get(a.as_str())?, by_id.get(b.as_str())?);
                Some(Candidate::new((*a).clone(), (*b).clone()))
            })
            .collect();
        candidates.sort_by(|x, y| {
            (x.similarity - 0.5)
                .abs()
                .total_cmp(&(y.similarity - 0.5).abs())
                .then_with(|| x.key().cmp(&y.key()))
        });
        candidates.into()
    }

    fn flush(&self, buffer: &LabelBuffer) -> Result<()> {
        artifacts::write_training_file(&self.paths.training_file(), &buffer.to_training_data())
    }

    /// Run a labeling session and train when enough labels exist
    pub async fn run(
        &mut self,
        records: &[ComparisonRecord],
        labeler: &mut dyn Labeler,
        curated: Option<&dyn CuratedIndex>,
    ) -> Result<TrainingOutcome> {
        let _lock = ArtifactLock::acquire(&self.paths)?;

        self.state = TrainingState::NeedsSample;
        let sample = self.sample(records)?;
        info!(sample = sample.len(), "Training sample selected");

        let mut buffer = match artifacts::read_training_file(&self.paths.training_file())? {
            Some(existing) => LabelBuffer::from_training_data(existing),
            None => LabelBuffer::default(),
        };
        let mut candidates = CandidateQueue {
            queue: self.uncertain_first(&sample, &buffer.labeled_keys()),
            deferred: VecDeque::new(),
        };
        self.state = TrainingState::AwaitingLabel;

        let mut current: Option<Candidate> = None;
        let mut offered_mark_remaining = false;
        loop {
            if self.cancel.is_cancelled() {
                self.flush(&buffer)?;
                return Err(DedupeError::Cancelled);
            }

            let matches = buffer.count(Label::Match);
            let distincts = buffer.count(Label::Distinct);
            let stats = LabelStats {
                matches,
                distincts,
                remaining: candidates.len() + usize::from(current.is_some()),
            };

            if matches + distincts > self.settings.max_associations_to_check {
                info!(matches, distincts, "Label limit reached");
                break;
            }

            if matches == 0 && distincts > MARK_REMAINING_DISTINCT_LIMIT && !offered_mark_remaining {
                offered_mark_remaining = true;
                if labeler.confirm_mark_remaining(&stats).await {
                    if let Some(candidate) = current.take() {
                        buffer.push(candidate, Label::Distinct);
                    }
                    for candidate in candidates.drain() {
                        buffer.push(candidate, Label::Distinct);
                    }
                    self.flush(&buffer)?;
                    let distincts = buffer.count(Label::Distinct);
                    info!(distincts, "Remaining pairs marked as distinct, training skipped");
                    return Ok(TrainingOutcome::MarkedRemainingDistinct { distincts });
                }
            }

            let candidate = match current.take() {
                Some(candidate) => candidate,
                None => match candidates.next(matches, distincts, self.options.balance_override) {
                    Some(candidate) => candidate,
                    None => {
                        info!("No unlabeled candidate pairs left");
                        break;
                    }
                },
            };

            if let (Some(x), Some(y)) = (&candidate.a.colrev_id, &candidate.b.colrev_id) {
                if x == y {
                    debug!(id_a = %candidate.a.id, id_b = %candidate.b.id, "Auto-match on colrev_id");
                    buffer.push(candidate, Label::Match);
                    continue;
                }
            }

            if let Some(index) = curated {
                match index.verdict(&candidate.a.origin, &candidate.b.origin).await {
                    CuratedVerdict::Duplicate => {
                        buffer.push(candidate, Label::Match);
                        continue;
                    }
                    CuratedVerdict::NonDuplicate => {
                        buffer.push(candidate, Label::Distinct);
                        continue;
                    }
                    CuratedVerdict::Unknown => {}
                }
            }

            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.flush(&buffer)?;
                    return Err(DedupeError::Cancelled);
                }
                response = labeler.present((&candidate.a, &candidate.b), &stats) => response,
            };

            match response {
                LabelResponse::Match => buffer.push(candidate, Label::Match),
                LabelResponse::Distinct => buffer.push(candidate, Label::Distinct),
                LabelResponse::Uncertain => {
                    debug!(id_a = %candidate.a.id, id_b = %candidate.b.id, "Pair skipped as uncertain");
                }
                LabelResponse::Previous => match buffer.pop_last() {
                    Some(previous) => {
                        candidates.queue.push_front(candidate);
                        current = Some(previous);
                    }
                    None => current = Some(candidate),
                },
                LabelResponse::Finished => {
                    let enough = matches >= MIN_LABELS_PER_CLASS_TO_FINISH
                        && distincts >= MIN_LABELS_PER_CLASS_TO_FINISH;
                    if enough || labeler.confirm_finish(&stats).await {
                        break;
                    }
                    current = Some(candidate);
                }
                LabelResponse::Cancel => {
                    self.flush(&buffer)?;
                    warn!(matches, distincts, "Labeling cancelled, labels saved");
                    return Err(DedupeError::LabelerCancelled);
                }
            }
        }

        self.flush(&buffer)?;
        let matches = buffer.count(Label::Match);
        let distincts = buffer.count(Label::Distinct);
        if matches <= MIN_LABELS_PER_CLASS_TO_TRAIN || distincts <= MIN_LABELS_PER_CLASS_TO_TRAIN {
            warn!(
                matches,
                distincts,
                "Not enough labels to train (need more than {} of each)",
                MIN_LABELS_PER_CLASS_TO_TRAIN
            );
            return Ok(TrainingOutcome::InsufficientLabels { matches, distincts });
        }

        self.state = TrainingState::Training;
        let model = self.classifier.train(&buffer.to_training_data())?;
        artifacts::write_settings(&self.paths.settings_file(), &model)?;
        self.state = TrainingState::Ready;
        info!(matches, distincts, "Training complete");
        Ok(TrainingOutcome::Trained { matches, distincts })
    }
}
