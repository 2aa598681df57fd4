//! Dedupe orchestrator
//!
//! Runs the whole pipeline for one project:
//! 1. Load the store and check its invariants
//! 2. Compute colrev_ids and partition records into eligible (`md_prepared`)
//!    and background (already processed) records
//! 3. Block, in memory or through an on-disk blocking database whose pairs
//!    are scored batch by batch
//! 4. Score candidate pairs with the trained classifier, or fall back to
//!    the similarity-only mode for small record sets; both decide against
//!    `non_dup_threshold` / `dup_threshold` and hand potential duplicates to
//!    the labeler
//! 5. Cluster, merge clusters above `merge_threshold`, promote
//! 6. Save (retrying once on a store conflict), then append the merge log
//!    and the same-source report
//!
//! Cancellation is honoured up to the point where merges are applied; a
//! cancelled run never changes the store.

mod events;
pub mod simple;
mod summary;

pub use events::DedupeEvent;
pub use summary::{failure_line, DedupeSummary, ScoringMethod};

use crate::blocking::{candidate_pairs, needs_out_of_core, CandidatePair, DiskBlockingMap};
use crate::cluster::{cluster_pairs, split_by_merge_threshold, Cluster};
use crate::error::{DedupeError, Result};
use crate::learning::artifacts::{self, ArtifactLock, ArtifactPaths};
use crate::learning::{
    score_pairs, Classifier, CuratedIndex, Labeler, LogisticClassifier, TrainedModel, Trainer,
    TrainingOptions, TrainingOutcome,
};
use crate::merge::{
    append_merge_log, append_same_source_report, unmerge, MergeApplicator, MergeOutcome, UnmergeReport,
};
use crate::similarity::{ComparisonRecord, Decision, ScoredPair};
use crate::store::{RecordStore, StoreState};
use revdup_common::config::DedupeSettings;
use revdup_common::quality::is_retracted;
use revdup_common::record::colrev_id::create_colrev_id;
use revdup_common::{QualityModel, RecordStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pairs fetched per on-disk join batch
const DISK_BATCH_SIZE: usize = 10_000;

/// How pairs get decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeMode {
    /// Trained classifier when one exists, otherwise the simple mode for
    /// small record sets
    Auto,
    /// Similarity thresholds only
    Simple,
    /// Trained classifier only; missing artifacts are an error
    Trained,
}

/// Run configuration
#[derive(Debug, Clone)]
pub struct DedupeConfig {
    pub settings: DedupeSettings,
    pub mode: DedupeMode,
    /// Lift the simple-mode record ceiling
    pub force: bool,
    pub artifacts: ArtifactPaths,
    /// Force (or forbid) out-of-core blocking; `None` decides from available RAM
    pub out_of_core: Option<bool>,
}

impl DedupeConfig {
    pub fn new(settings: DedupeSettings, artifacts: ArtifactPaths) -> Self {
        Self {
            settings,
            mode: DedupeMode::Auto,
            force: false,
            artifacts,
            out_of_core: None,
        }
    }
}

/// Records of one run, split by role
struct Partition {
    /// Eligible and background records, background first
    queue: Vec<ComparisonRecord>,
    eligible: HashSet<String>,
}

impl Partition {
    fn background(&self) -> usize {
        self.queue.len() - self.eligible.len()
    }
}

/// Compute colrev_ids of eligible records and split the store
///
/// Retracted `md_prepared` records go to `rev_prescreen_excluded` through the
/// quality model and take no further part in the run.
fn prepare(state: &mut StoreState, quality: &QualityModel) -> Partition {
    let mut background = Vec::new();
    let mut eligible_records = Vec::new();
    let mut eligible = HashSet::new();

    for record in state.records.values_mut() {
        match record.status() {
            RecordStatus::MdPrepared if is_retracted(record) => {
                quality.run(record, false);
                info!(record_id = %record.id(), "Retracted record excluded");
            }
            RecordStatus::MdPrepared => {
                match create_colrev_id(record) {
                    Ok(colrev_id) => record.set_colrev_id(Some(colrev_id)),
                    Err(e) => {
                        debug!(record_id = %record.id(), error = %e, "No colrev_id");
                        record.set_colrev_id(None);
                    }
                }
                eligible.insert(record.id().to_string());
                eligible_records.push(ComparisonRecord::from_record(record));
            }
            RecordStatus::RevPrescreenExcluded => {}
            status if status > RecordStatus::MdPrepared && !is_retracted(record) => {
                background.push(ComparisonRecord::from_record(record));
            }
            _ => {}
        }
    }

    background.extend(eligible_records);
    Partition {
        queue: background,
        eligible,
    }
}

/// Tally of a trained-classifier scoring pass
#[derive(Default)]
struct ModelScoring {
    candidates: usize,
    scored: usize,
    unscored: usize,
    duplicates: Vec<ScoredPair>,
    potential: Vec<ScoredPair>,
}

/// Dedupe pipeline over one record store
pub struct DedupePipeline {
    config: DedupeConfig,
    store: Arc<dyn RecordStore>,
    quality: QualityModel,
    classifier: Arc<dyn Classifier>,
    event_tx: Option<mpsc::Sender<DedupeEvent>>,
    cancel: CancellationToken,
}

impl DedupePipeline {
    /// Create new pipeline with the default classifier and quality model
    pub fn new(config: DedupeConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            config,
            store,
            quality: QualityModel::new(),
            classifier: Arc::new(LogisticClassifier::default()),
            event_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create pipeline with event channel for progress reporting
    pub fn with_events(
        config: DedupeConfig,
        store: Arc<dyn RecordStore>,
        event_tx: mpsc::Sender<DedupeEvent>,
    ) -> Self {
        Self {
            event_tx: Some(event_tx),
            ..Self::new(config, store)
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_quality_model(mut self, quality: QualityModel) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DedupeConfig {
        &self.config
    }

    /// Emit event if event channel is configured
    async fn emit_event(&self, event: DedupeEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(DedupeError::Cancelled);
        }
        Ok(())
    }

    /// Run deduplication end to end
    ///
    /// `labeler` is consulted for potential duplicates, pairs scored between
    /// `non_dup_threshold` and `dup_threshold`. Without one they are left
    /// unresolved and reported. Fatal errors are also reported as an `Error`
    /// event.
    pub async fn run(&self, labeler: Option<&mut (dyn Labeler + '_)>) -> Result<DedupeSummary> {
        match self.run_inner(labeler).await {
            Ok(summary) => {
                info!("{}", summary.display_string());
                self.emit_event(DedupeEvent::RunCompleted {
                    summary: summary.clone(),
                })
                .await;
                Ok(summary)
            }
            Err(e) => {
                warn!("{}", failure_line(&e));
                self.emit_event(DedupeEvent::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    async fn run_inner(&self, labeler: Option<&mut (dyn Labeler + '_)>) -> Result<DedupeSummary> {
        let settings = &self.config.settings;
        settings.validate()?;
        let _lock = ArtifactLock::acquire(&self.config.artifacts)?;

        let loaded = self.store.load_all().await?;
        loaded.state.check_invariants()?;
        let mut state = loaded.state;
        let partition = prepare(&mut state, &self.quality);

        let mut summary = DedupeSummary {
            eligible: partition.eligible.len(),
            background: partition.background(),
            ..DedupeSummary::default()
        };
        info!(
            records = state.records.len(),
            eligible = summary.eligible,
            background = summary.background,
            "Dedupe run started"
        );
        self.emit_event(DedupeEvent::RunStarted {
            records: state.records.len(),
            eligible: summary.eligible,
            background: summary.background,
            timestamp: chrono::Utc::now().timestamp(),
        })
        .await;

        let model = artifacts::read_settings(&self.config.artifacts.settings_file())?;
        let method = match (self.config.mode, &model) {
            (DedupeMode::Trained, None) => {
                return Err(DedupeError::MissingArtifacts(format!(
                    "no classifier settings at {} (run `revdup train` first)",
                    self.config.artifacts.settings_file().display()
                )))
            }
            (DedupeMode::Simple, _) => ScoringMethod::Simple,
            (_, Some(_)) => ScoringMethod::Model,
            (DedupeMode::Auto, None) if self.simple_mode_allowed(&partition) => ScoringMethod::Simple,
            (DedupeMode::Auto, None) => ScoringMethod::Skipped,
        };
        summary.method = Some(method);

        let pairs = match method {
            ScoringMethod::Skipped => {
                info!(
                    eligible = summary.eligible,
                    ceiling = settings.simple_mode_ceiling,
                    "No trained classifier and too many records for the simple mode, nothing applied"
                );
                return Ok(summary);
            }
            ScoringMethod::Simple => {
                if !self.simple_mode_allowed(&partition) {
                    return Err(DedupeError::InputIneligible(format!(
                        "{} records exceed the simple-mode ceiling of {} (use --force or train a classifier)",
                        summary.eligible, settings.simple_mode_ceiling
                    )));
                }
                let outcome =
                    simple::simple_dedupe(&partition.queue, &partition.eligible, settings, labeler, &self.cancel)
                        .await?;
                summary.scored_pairs = outcome.compared;
                self.report_unresolved(&mut summary, &outcome.unresolved).await;
                self.emit_event(DedupeEvent::ScoringCompleted {
                    scored: outcome.compared,
                    unscored: 0,
                    method: "simple".to_string(),
                })
                .await;
                outcome.duplicates
            }
            ScoringMethod::Model => {
                let model = match model {
                    Some(model) => model,
                    None => return Err(DedupeError::MissingArtifacts("classifier settings".to_string())),
                };
                let scoring = self.score_with_model(&partition, &model).await?;
                summary.candidate_pairs = scoring.candidates;
                summary.scored_pairs = scoring.scored;
                summary.unscored_pairs = scoring.unscored;
                self.emit_event(DedupeEvent::ScoringCompleted {
                    scored: scoring.scored,
                    unscored: scoring.unscored,
                    method: "model".to_string(),
                })
                .await;

                let (confirmed, unresolved) = simple::label_potential_duplicates(
                    &partition.queue,
                    scoring.potential,
                    labeler,
                    &self.cancel,
                )
                .await?;
                self.report_unresolved(&mut summary, &unresolved).await;
                let mut duplicates = scoring.duplicates;
                // a labeled match is certain, whatever the classifier said
                duplicates.extend(confirmed.into_iter().map(|pair| ScoredPair { score: 1.0, ..pair }));
                duplicates
            }
        };

        let clusters = self.form_clusters(&partition, &pairs, method).await;
        summary.clusters_merged = clusters.0.len();
        summary.clusters_below_threshold = clusters.1;

        self.check_cancelled()?;

        let mut revision = loaded.revision;
        let mut retried = false;
        let outcome = loop {
            let (outcome, promoted) = self.apply(&mut state, &clusters.0)?;
            match self.store.save_all(&state, revision).await {
                Ok(_) => {
                    summary.promoted = promoted;
                    break outcome;
                }
                Err(DedupeError::StoreConflict(message)) if !retried => {
                    warn!(message = %message, "Store conflict, re-reading and retrying once");
                    self.emit_event(DedupeEvent::StoreConflictRetry { message }).await;
                    retried = true;
                    let reloaded = self.store.load_all().await?;
                    reloaded.state.check_invariants()?;
                    state = reloaded.state;
                    revision = reloaded.revision;
                    prepare(&mut state, &self.quality);
                }
                Err(e) => return Err(e),
            }
        };

        summary.record_merges(&outcome.counters);
        self.write_merge_trail(&outcome).await?;
        Ok(summary)
    }

    fn simple_mode_allowed(&self, partition: &Partition) -> bool {
        self.config.force || partition.eligible.len() <= self.config.settings.simple_mode_ceiling
    }

    async fn report_unresolved(&self, summary: &mut DedupeSummary, unresolved: &[ScoredPair]) {
        summary.potential_duplicates_unresolved = unresolved.len();
        for pair in unresolved {
            self.emit_event(DedupeEvent::PotentialDuplicate {
                id_a: pair.id_a.clone(),
                id_b: pair.id_b.clone(),
                score: pair.score,
            })
            .await;
        }
    }

    /// Block and score every candidate pair with at least one eligible record
    ///
    /// Out of core, candidate pairs come out of the blocking database one
    /// batch at a time; only (potential) duplicates outlive their batch.
    async fn score_with_model(&self, partition: &Partition, model: &TrainedModel) -> Result<ModelScoring> {
        let out_of_core = self
            .config
            .out_of_core
            .unwrap_or_else(|| needs_out_of_core(partition.queue.len()));
        let by_id: HashMap<String, ComparisonRecord> = partition
            .queue
            .iter()
            .map(|r| (r.id.clone(), r.clone()))
            .collect();

        let mut scoring = ModelScoring::default();
        if out_of_core {
            info!(records = partition.queue.len(), "Blocking out of core");
            let map = DiskBlockingMap::create().await?;
            let result = self
                .score_disk_batches(&map, partition, model, &by_id, &mut scoring)
                .await;
            map.close().await?;
            result?;
        } else {
            let candidates = candidate_pairs(&partition.queue, self.config.settings.max_block_size);
            self.score_batch(partition, model, &by_id, candidates, &mut scoring);
        }

        info!(
            candidate_pairs = scoring.candidates,
            duplicates = scoring.duplicates.len(),
            potential = scoring.potential.len(),
            out_of_core,
            "Blocking and scoring complete"
        );
        self.emit_event(DedupeEvent::BlockingCompleted {
            candidate_pairs: scoring.candidates,
            out_of_core,
        })
        .await;
        Ok(scoring)
    }

    async fn score_disk_batches(
        &self,
        map: &DiskBlockingMap,
        partition: &Partition,
        model: &TrainedModel,
        by_id: &HashMap<String, ComparisonRecord>,
        scoring: &mut ModelScoring,
    ) -> Result<()> {
        map.insert_keys(&partition.queue).await?;
        let mut batches = map.batches(self.config.settings.max_block_size, DISK_BATCH_SIZE);
        while let Some(batch) = batches.next(&self.cancel).await? {
            self.score_batch(partition, model, by_id, batch, scoring);
        }
        Ok(())
    }

    fn score_batch(
        &self,
        partition: &Partition,
        model: &TrainedModel,
        by_id: &HashMap<String, ComparisonRecord>,
        batch: Vec<CandidatePair>,
        scoring: &mut ModelScoring,
    ) {
        let candidates: Vec<CandidatePair> = batch
            .into_iter()
            .filter(|(a, b)| partition.eligible.contains(a) || partition.eligible.contains(b))
            .collect();
        scoring.candidates += candidates.len();

        let outcome = score_pairs(
            self.classifier.as_ref(),
            model,
            &self.config.settings,
            by_id,
            &candidates,
        );
        for error in &outcome.unscored {
            debug!(error = %error, "Pair unscored");
        }
        scoring.scored += outcome.pairs.len();
        scoring.unscored += outcome.unscored.len();
        for pair in outcome.pairs {
            match pair.decision {
                Decision::Duplicate => scoring.duplicates.push(pair),
                Decision::PotentialDuplicate => scoring.potential.push(pair),
                Decision::NoDuplicate => {}
            }
        }
    }

    /// Clusters to merge, plus the number below the merge threshold
    async fn form_clusters(
        &self,
        partition: &Partition,
        pairs: &[ScoredPair],
        method: ScoringMethod,
    ) -> (Vec<Cluster>, usize) {
        let settings = &self.config.settings;
        let ids = partition.queue.iter().map(|r| r.id.as_str());
        let (to_merge, below) = if method == ScoringMethod::Simple {
            let clusters = cluster_pairs(ids, pairs, 0.0);
            (clusters.into_iter().filter(|c| !c.is_singleton()).collect(), Vec::new())
        } else {
            let clusters = cluster_pairs(ids, pairs, settings.partition_threshold);
            split_by_merge_threshold(clusters, settings.merge_threshold)
        };
        if !below.is_empty() {
            info!(clusters = below.len(), "Clusters below merge threshold kept apart");
        }
        self.emit_event(DedupeEvent::ClustersFormed {
            clusters: to_merge.len() + below.len(),
            to_merge: to_merge.len(),
            below_threshold: below.len(),
        })
        .await;
        (to_merge, below.len())
    }

    fn apply(&self, state: &mut StoreState, clusters: &[Cluster]) -> Result<(MergeOutcome, usize)> {
        let applicator = MergeApplicator::new(&self.config.settings, &self.quality);
        let outcome = applicator.apply_clusters(state, clusters)?;
        let promoted = if self.config.settings.complete_dedupe {
            applicator.promote_remaining(state)?
        } else {
            0
        };
        Ok((outcome, promoted))
    }

    async fn write_merge_trail(&self, outcome: &MergeOutcome) -> Result<()> {
        for rejection in &outcome.rejections {
            if let DedupeError::MergeRejected {
                primary_id,
                dupe_id,
                reason,
            } = rejection
            {
                self.emit_event(DedupeEvent::MergeRejected {
                    primary_id: primary_id.clone(),
                    dupe_id: dupe_id.clone(),
                    reason: reason.to_string(),
                })
                .await;
            }
        }
        append_merge_log(&self.config.artifacts.merge_log(), &outcome.log_entries)?;
        append_same_source_report(
            &self.config.artifacts.same_source_report(),
            &outcome.same_source_rejections,
        )?;
        Ok(())
    }

    /// Merge user-given id pairs and save
    pub async fn merge_pairs(&self, pairs: &[(String, String)]) -> Result<DedupeSummary> {
        let loaded = self.store.load_all().await?;
        loaded.state.check_invariants()?;
        let mut state = loaded.state;

        let applicator = MergeApplicator::new(&self.config.settings, &self.quality);
        let outcome = applicator.apply_pairs(&mut state, pairs)?;
        self.store.save_all(&state, loaded.revision).await?;
        self.write_merge_trail(&outcome).await?;

        let mut summary = DedupeSummary::default();
        summary.record_merges(&outcome.counters);
        info!("{}", summary.display_string());
        Ok(summary)
    }

    /// Split merged records back apart using the store's snapshots
    pub async fn unmerge(&self, ids: &[String]) -> Result<UnmergeReport> {
        let loaded = self.store.load_all().await?;
        let history = self.store.snapshot_history().await?;
        let mut state = loaded.state;

        let report = unmerge(&mut state, &history, ids);
        for diagnostic in &report.diagnostics {
            warn!("{}", diagnostic);
        }
        if !report.restored.is_empty() {
            state.check_invariants()?;
            self.store.save_all(&state, loaded.revision).await?;
        }
        Ok(report)
    }

    /// Interactive classifier training over the current store
    pub async fn train(
        &self,
        labeler: &mut dyn Labeler,
        curated: Option<&dyn CuratedIndex>,
    ) -> Result<TrainingOutcome> {
        let loaded = self.store.load_all().await?;
        loaded.state.check_invariants()?;
        let mut state = loaded.state;
        let partition = prepare(&mut state, &self.quality);

        let out_of_core = self
            .config
            .out_of_core
            .unwrap_or_else(|| needs_out_of_core(partition.queue.len()));
        let options = TrainingOptions {
            in_memory: !out_of_core,
            ..TrainingOptions::default()
        };
        let mut trainer = Trainer::new(
            &self.config.settings,
            options,
            self.config.artifacts.clone(),
            self.classifier.as_ref(),
            self.cancel.clone(),
        );
        trainer.run(&partition.queue, labeler, curated).await
    }
}
