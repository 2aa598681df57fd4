//! End-to-end dedupe runs over an in-memory store
//!
//! Covers the guard scenarios (same source, cross level, retraction), merge
//! and unmerge round trips, run modes, store conflicts and the event stream.

mod helpers;

use helpers::*;
use revdup::learning::artifacts::write_settings;
use revdup::learning::{Classifier, LabelResponse, Labeler, TrainedModel, TrainingData};
use revdup::merge::read_merge_log;
use revdup::orchestrator::ScoringMethod;
use revdup::similarity::ComparisonRecord;
use revdup::{DedupeError, DedupeEvent, DedupeMode, DedupePipeline};
use revdup_common::config::{DedupeSettings, SameSourcePolicy};
use revdup_common::quality::check_registered_notes;
use revdup_common::{EntryType, RecordStatus};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::sync::Arc;

const EJIS_DOI: &str = "10.1057/EJIS.2014.41";

fn bansal(id: &str, origin: &str, author: &str) -> revdup_common::Record {
    article(
        id,
        origin,
        &[
            ("author", author),
            ("title", "The role of privacy assurance mechanisms in building trust"),
            ("journal", "European Journal of Information Systems"),
            ("year", "2015"),
            ("volume", "24"),
            ("number", "6"),
            ("pages", "624--644"),
            ("doi", EJIS_DOI),
        ],
    )
}

fn bansal_pair() -> Vec<revdup_common::Record> {
    vec![
        bansal("Bansal2015", "crossref/0001", "Bansal, G. and Zahedi, F. M."),
        bansal("Bansal2015a", "dblp/0001", "Bansal, Gaurav and Zahedi, F. Mariam"),
    ]
}

fn all_origins(state: &revdup::StoreState) -> BTreeSet<String> {
    state
        .records
        .values()
        .flat_map(|r| r.origin().iter().cloned())
        .collect()
}

/// Ten unrelated articles, the first two also present from a second source
fn copied_articles() -> Vec<revdup_common::Record> {
    let mut records = distinct_articles(10, "crossref");
    records.push(distinct_article(0, "r000a", "dblp/0000"));
    records.push(distinct_article(1, "r001a", "dblp/0001"));
    records
}

/// Classifier settings that only trust matching pages, titles and authors
fn pages_and_title_model() -> TrainedModel {
    TrainedModel {
        weights: vec![2.0, 6.0, 0.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        bias: -7.0,
        threshold: 0.5,
    }
}

/// Classifier returning a fixed probability per pair, 0.1 for unlisted pairs
struct FixedScores(HashMap<(String, String), f64>);

impl FixedScores {
    fn new(scores: &[(&str, &str, f64)]) -> Self {
        Self(
            scores
                .iter()
                .map(|(a, b, p)| ((a.to_string(), b.to_string()), *p))
                .collect(),
        )
    }
}

impl Classifier for FixedScores {
    fn train(&self, _pairs: &TrainingData) -> revdup::Result<TrainedModel> {
        Err(DedupeError::InputIneligible("fixed scores cannot be trained".to_string()))
    }

    fn score(&self, _model: &TrainedModel, a: &ComparisonRecord, b: &ComparisonRecord) -> revdup::Result<f64> {
        let (lo, hi) = if a.id <= b.id { (&a.id, &b.id) } else { (&b.id, &a.id) };
        Ok(self.0.get(&(lo.clone(), hi.clone())).copied().unwrap_or(0.1))
    }
}

/// Three copied papers scored in the duplicate, potential and distinct bands
fn banded_project() -> (Project, Arc<FixedScores>) {
    let mut records = distinct_articles(6, "crossref");
    records.push(distinct_article(0, "r000a", "dblp/0000"));
    records.push(distinct_article(1, "r001a", "dblp/0001"));
    records.push(distinct_article(2, "r002a", "dblp/0002"));
    let project = Project::new(records);
    write_settings(&project.artifacts().settings_file(), &pages_and_title_model()).unwrap();
    let scores = FixedScores::new(&[("r000", "r000a", 0.97), ("r001", "r001a", 0.8), ("r002", "r002a", 0.6)]);
    (project, Arc::new(scores))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_exact_duplicate_merged() {
    let project = Project::new(bansal_pair());

    let summary = project.pipeline().run(None).await.unwrap();

    assert_eq!(summary.method, Some(ScoringMethod::Simple));
    assert_eq!(summary.merges_applied, 1);
    assert_eq!(summary.prevented(), 0);

    let state = project.state();
    assert_eq!(state.records.len(), 1);
    let survivor = &state.records["Bansal2015"];
    assert_eq!(survivor.origin(), &["crossref/0001".to_string(), "dblp/0001".to_string()]);
    assert_eq!(survivor.status(), RecordStatus::MdProcessed);
    assert_eq!(survivor.get("doi"), Some(EJIS_DOI));
    assert_eq!(state.moved_dupe_ids["Bansal2015a"], "Bansal2015");

    let log = read_merge_log(&project.artifacts().merge_log()).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].primary_id, "Bansal2015");
    assert_eq!(log[0].merged_ids, vec!["Bansal2015a".to_string()]);
    assert!(!log[0].same_source);
}

#[tokio::test]
async fn test_same_source_merge_prevented() {
    let project = Project::new([
        bansal("Bansal2015", "crossref/0001", "Bansal, G. and Zahedi, F. M."),
        article(
            "Bansal2015a",
            "crossref/0002",
            &[
                ("author", "Bansal, G. and Zahedi, F. M."),
                ("title", "The role of privacy assurance mechanisms in building trust"),
                ("journal", "European Journal of Information Systems"),
                ("year", "2015"),
                ("volume", "24"),
                ("number", "6"),
                ("pages", "625--644"),
            ],
        ),
    ]);

    let summary = project.pipeline().run(None).await.unwrap();

    assert_eq!(summary.merges_applied, 0);
    assert_eq!(summary.prevented_same_source, 1);
    let state = project.state();
    assert_eq!(state.records.len(), 2);
    assert!(state.moved_dupe_ids.is_empty());
    // nothing blocks promotion of the records kept apart
    assert!(state.records.values().all(|r| r.status() == RecordStatus::MdProcessed));

    let report = fs::read_to_string(project.artifacts().same_source_report()).unwrap();
    assert_eq!(report.lines().collect::<Vec<_>>(), vec!["Bansal2015,Bansal2015a"]);
    assert!(read_merge_log(&project.artifacts().merge_log()).unwrap().is_empty());
}

#[tokio::test]
async fn test_same_source_merge_warned_when_configured() {
    let project = Project::new([
        bansal("Bansal2015", "crossref/0001", "Bansal, G. and Zahedi, F. M."),
        bansal("Bansal2015a", "crossref/0002", "Bansal, G. and Zahedi, F. M."),
    ]);
    let settings = DedupeSettings {
        same_source_policy: SameSourcePolicy::Warn,
        ..DedupeSettings::default()
    };

    let summary = project.pipeline_with(settings).run(None).await.unwrap();

    assert_eq!(summary.merges_applied, 1);
    assert_eq!(summary.same_source_warned, 1);
    let log = read_merge_log(&project.artifacts().merge_log()).unwrap();
    assert!(log[0].same_source);
}

#[tokio::test]
async fn test_cross_level_merge_prevented() {
    let proceedings = record_with(
        "ICIS2020",
        EntryType::Proceedings,
        RecordStatus::MdPrepared,
        "dblp/conf-icis-2020",
        &[
            ("title", "Proceedings of the International Conference on Information Systems"),
            ("booktitle", "International Conference on Information Systems"),
            ("year", "2020"),
        ],
    );
    let paper = record_with(
        "Smith2020",
        EntryType::Inproceedings,
        RecordStatus::MdPrepared,
        "crossref/0042",
        &[
            ("author", "Smith, John"),
            ("title", "Digital nudging in online platforms"),
            ("booktitle", "International Conference on Information Systems"),
            ("year", "2020"),
        ],
    );
    let project = Project::new([proceedings, paper]);

    let summary = project
        .pipeline()
        .merge_pairs(&[("ICIS2020".to_string(), "Smith2020".to_string())])
        .await
        .unwrap();

    assert_eq!(summary.merges_applied, 0);
    assert_eq!(summary.prevented_cross_level, 1);
    let state = project.state();
    assert!(state.records.contains_key("ICIS2020"));
    assert!(state.records.contains_key("Smith2020"));
}

#[tokio::test]
async fn test_retracted_record_excluded_from_dedupe() {
    let mut records = bansal_pair();
    let mut retracted = bansal("Bansal2015b", "scopus/0001", "Bansal, G. and Zahedi, F. M.");
    retracted.update_field("retracted", "true", "crossref", "", false);
    records.push(retracted);
    let project = Project::new(records);

    let summary = project.pipeline().run(None).await.unwrap();

    assert_eq!(summary.eligible, 2);
    assert_eq!(summary.merges_applied, 1);
    let state = project.state();
    let excluded = &state.records["Bansal2015b"];
    assert_eq!(excluded.status(), RecordStatus::RevPrescreenExcluded);
    assert_eq!(excluded.get("prescreen_exclusion"), Some("retracted"));
    assert_eq!(excluded.origin(), &["scopus/0001".to_string()]);
    assert!(!state.records["Bansal2015"].has_origin("scopus/0001"));
    assert!(!state.moved_dupe_ids.contains_key("Bansal2015b"));
}

#[tokio::test]
async fn test_unmerge_restores_both_records() {
    let project = Project::new(bansal_pair());
    let before = project.state();
    let pipeline = project.pipeline();
    pipeline.run(None).await.unwrap();
    assert_eq!(project.state().records.len(), 1);

    let report = pipeline.unmerge(&["Bansal2015".to_string()]).await.unwrap();

    assert_eq!(report.restored_count(), 1);
    assert!(report.diagnostics.is_empty());
    let state = project.state();
    assert_eq!(state.records.len(), 2);
    assert!(state.moved_dupe_ids.is_empty());
    for (id, original) in &before.records {
        let restored = &state.records[id];
        assert_eq!(restored.status(), RecordStatus::MdProcessed);
        assert_eq!(restored.origin(), original.origin());
        assert_eq!(restored.fields(), original.fields());
    }
}

#[tokio::test]
async fn test_unmerge_of_unmerged_record_is_a_no_op() {
    let project = Project::new(bansal_pair());
    let pipeline = project.pipeline();
    pipeline.run(None).await.unwrap();
    let revision = project.store.revision();

    let report = pipeline.unmerge(&["Bansal2015a".to_string()]).await.unwrap();

    assert!(report.restored.is_empty());
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(project.store.revision(), revision);
}

// ============================================================================
// Boundaries and modes
// ============================================================================

#[tokio::test]
async fn test_empty_store_runs_cleanly() {
    let project = Project::new([]);

    let summary = project.pipeline().run(None).await.unwrap();

    assert_eq!(summary.merges_applied, 0);
    assert_eq!(summary.promoted, 0);
    assert!(project.state().records.is_empty());
}

#[tokio::test]
async fn test_single_record_promoted_only_with_complete_dedupe() {
    let project = Project::new([article("Smith2020", "crossref/0001", &[])]);
    let summary = project.pipeline().run(None).await.unwrap();
    assert_eq!(summary.promoted, 1);
    assert_eq!(project.record("Smith2020").status(), RecordStatus::MdProcessed);

    let project = Project::new([article("Smith2020", "crossref/0001", &[])]);
    let settings = DedupeSettings {
        complete_dedupe: false,
        ..DedupeSettings::default()
    };
    let summary = project.pipeline_with(settings).run(None).await.unwrap();
    assert_eq!(summary.promoted, 0);
    assert_eq!(project.record("Smith2020").status(), RecordStatus::MdPrepared);
}

#[tokio::test]
async fn test_trained_mode_without_artifacts_fails() {
    let project = Project::new(bansal_pair());
    let mut config = project.config(DedupeSettings::default());
    config.mode = DedupeMode::Trained;

    let err = DedupePipeline::new(config, project.store.clone())
        .run(None)
        .await
        .unwrap_err();

    assert!(matches!(err, DedupeError::MissingArtifacts(_)));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(project.store.revision(), 0);
}

#[tokio::test]
async fn test_auto_mode_skips_large_untrained_store() {
    let project = Project::new(distinct_articles(41, "crossref"));
    let before = project.state();

    let summary = project.pipeline().run(None).await.unwrap();

    assert_eq!(summary.method, Some(ScoringMethod::Skipped));
    assert_eq!(summary.merges_applied, 0);
    assert_eq!(summary.promoted, 0);
    assert_eq!(project.state(), before);
    assert!(summary.display_string().contains("revdup train"));
}

#[tokio::test]
async fn test_simple_mode_above_ceiling_needs_force() {
    let project = Project::new(distinct_articles(41, "crossref"));
    let mut config = project.config(DedupeSettings::default());
    config.mode = DedupeMode::Simple;

    let err = DedupePipeline::new(config.clone(), project.store.clone())
        .run(None)
        .await
        .unwrap_err();
    assert!(matches!(err, DedupeError::InputIneligible(_)));
    assert_eq!(err.exit_code(), 2);

    config.force = true;
    let summary = DedupePipeline::new(config, project.store.clone())
        .run(None)
        .await
        .unwrap();
    assert_eq!(summary.method, Some(ScoringMethod::Simple));
    assert_eq!(summary.merges_applied, 0);
    assert_eq!(summary.promoted, 41);
}

#[tokio::test]
async fn test_trained_mode_merges_with_stored_classifier() {
    let project = Project::new(copied_articles());
    write_settings(&project.artifacts().settings_file(), &pages_and_title_model()).unwrap();
    let mut config = project.config(DedupeSettings::default());
    config.mode = DedupeMode::Trained;

    let summary = DedupePipeline::new(config, project.store.clone())
        .run(None)
        .await
        .unwrap();

    assert_eq!(summary.method, Some(ScoringMethod::Model));
    assert!(summary.candidate_pairs >= 2);
    assert_eq!(summary.merges_applied, 2);
    let state = project.state();
    assert_eq!(state.records.len(), 10);
    assert_eq!(state.moved_dupe_ids["r000a"], "r000");
    assert_eq!(state.moved_dupe_ids["r001a"], "r001");
}

#[tokio::test]
async fn test_trained_mode_decides_by_dedupe_thresholds() {
    let (project, scores) = banded_project();
    let (tx, mut rx) = tokio::sync::mpsc::channel(256);
    let mut config = project.config(DedupeSettings::default());
    config.mode = DedupeMode::Trained;

    let summary = DedupePipeline::with_events(config, project.store.clone(), tx)
        .with_classifier(scores)
        .run(None)
        .await
        .unwrap();

    // 0.97 merged, 0.8 left for review, 0.6 kept apart
    assert_eq!(summary.merges_applied, 1);
    assert_eq!(summary.potential_duplicates_unresolved, 1);
    let state = project.state();
    assert_eq!(state.moved_dupe_ids.len(), 1);
    assert_eq!(state.moved_dupe_ids["r000a"], "r000");
    assert!(state.records.contains_key("r001a"));
    assert!(state.records.contains_key("r002a"));

    let potential: Vec<(String, String)> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            DedupeEvent::PotentialDuplicate { id_a, id_b, .. } => Some((id_a, id_b)),
            _ => None,
        })
        .collect();
    assert_eq!(potential, vec![("r001".to_string(), "r001a".to_string())]);
}

#[tokio::test]
async fn test_trained_mode_asks_about_potential_duplicates() {
    let (project, scores) = banded_project();
    let mut config = project.config(DedupeSettings::default());
    config.mode = DedupeMode::Trained;
    let mut labeler = ScriptedLabeler::new([LabelResponse::Match], LabelResponse::Distinct);

    let labeler_ref: &mut dyn Labeler = &mut labeler;
    let summary = DedupePipeline::new(config, project.store.clone())
        .with_classifier(scores)
        .run(Some(labeler_ref))
        .await
        .unwrap();

    assert_eq!(labeler.presented, vec![("r001".to_string(), "r001a".to_string())]);
    assert_eq!(summary.merges_applied, 2);
    assert_eq!(summary.potential_duplicates_unresolved, 0);
    let state = project.state();
    assert_eq!(state.moved_dupe_ids["r001a"], "r001");
    assert!(state.records.contains_key("r002a"));
}

#[tokio::test]
async fn test_out_of_core_run_matches_in_memory_run() {
    let mut results = Vec::new();
    for out_of_core in [false, true] {
        let project = Project::new(copied_articles());
        write_settings(&project.artifacts().settings_file(), &pages_and_title_model()).unwrap();
        let mut config = project.config(DedupeSettings::default());
        config.mode = DedupeMode::Trained;
        config.out_of_core = Some(out_of_core);

        let summary = DedupePipeline::new(config, project.store.clone())
            .run(None)
            .await
            .unwrap();

        let log: Vec<(usize, String, Vec<String>, f64)> = read_merge_log(&project.artifacts().merge_log())
            .unwrap()
            .into_iter()
            .map(|e| (e.cluster_id, e.primary_id, e.merged_ids, e.score))
            .collect();
        results.push((summary.candidate_pairs, summary.merges_applied, log, project.state()));
    }

    let (in_memory, on_disk) = (&results[0], &results[1]);
    assert_eq!(in_memory.1, 2);
    assert_eq!(in_memory.0, on_disk.0);
    assert_eq!(in_memory.1, on_disk.1);
    assert_eq!(in_memory.2, on_disk.2);
    assert_eq!(in_memory.3, on_disk.3);
}

#[tokio::test]
async fn test_simple_mode_asks_about_potential_duplicates() {
    // same paper, the second copy lost part of its title
    let project = Project::new([
        article("Smith2020", "crossref/0001", &[]),
        article(
            "Smith2020a",
            "dblp/0001",
            &[("title", "Trust violation and repair"), ("pages", "2--20")],
        ),
    ]);
    let mut labeler = ScriptedLabeler::new([LabelResponse::Match], LabelResponse::Distinct);

    let labeler_ref: &mut dyn Labeler = &mut labeler;
    let summary = project.pipeline().run(Some(labeler_ref)).await.unwrap();

    assert_eq!(labeler.presented.len(), 1);
    assert_eq!(summary.merges_applied, 1);
    assert_eq!(project.state().records.len(), 1);
}

#[tokio::test]
async fn test_labeler_cancel_leaves_store_untouched() {
    let project = Project::new([
        article("Smith2020", "crossref/0001", &[]),
        article(
            "Smith2020a",
            "dblp/0001",
            &[("title", "Trust violation and repair"), ("pages", "2--20")],
        ),
    ]);
    let before = project.state();
    let mut labeler = ScriptedLabeler::new([], LabelResponse::Cancel);

    let labeler_ref: &mut dyn Labeler = &mut labeler;
    let err = project.pipeline().run(Some(labeler_ref)).await.unwrap_err();

    assert!(matches!(err, DedupeError::LabelerCancelled));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(project.state(), before);
}

// ============================================================================
// Store conflicts
// ============================================================================

#[tokio::test]
async fn test_store_conflict_retried_once() {
    let project = Project::new(bansal_pair());
    project.store.inject_conflicts(1);
    let (pipeline, mut rx) = project.pipeline_with_events();

    let summary = pipeline.run(None).await.unwrap();

    assert_eq!(summary.merges_applied, 1);
    assert_eq!(project.state().records.len(), 1);
    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, DedupeEvent::StoreConflictRetry { .. })));
    assert_eq!(read_merge_log(&project.artifacts().merge_log()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_persistent_store_conflict_aborts() {
    let project = Project::new(bansal_pair());
    let before = project.state();
    project.store.inject_conflicts(2);

    let err = project.pipeline().run(None).await.unwrap_err();

    assert!(matches!(err, DedupeError::StoreConflict(_)));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(project.state(), before);
    assert!(read_merge_log(&project.artifacts().merge_log()).unwrap().is_empty());
}

#[tokio::test]
async fn test_foreign_write_between_runs_is_picked_up() {
    let project = Project::new(bansal_pair());
    let mut changed = project.state();
    changed
        .records
        .insert("Doe2021".to_string(), distinct_article(3, "Doe2021", "scopus/0007"));
    project.store.overwrite(changed);

    let summary = project.pipeline().run(None).await.unwrap();

    assert_eq!(summary.eligible, 3);
    assert_eq!(summary.merges_applied, 1);
    assert_eq!(project.record("Doe2021").status(), RecordStatus::MdProcessed);
}

// ============================================================================
// Store-wide properties
// ============================================================================

fn mixed_store() -> Vec<revdup_common::Record> {
    let mut records = bansal_pair();
    records.extend(distinct_articles(6, "scopus"));
    records.push(article("Smith2020", "crossref/0100", &[]));
    records.push(article("Smith2020a", "wos/0100", &[]));
    records.push(article("Smith2020b", "pubmed/0100", &[]));
    records.push(record_with(
        "Old2010",
        EntryType::Article,
        RecordStatus::RevIncluded,
        "crossref/0200",
        &[
            ("author", "Old, Alice"),
            ("title", "An included classic on information systems"),
            ("journal", "MIS Quarterly"),
            ("year", "2010"),
            ("volume", "34"),
            ("number", "1"),
            ("pages", "5--30"),
        ],
    ));
    records
}

#[tokio::test]
async fn test_run_preserves_origins_and_ids() {
    let project = Project::new(mixed_store());
    let before = project.state();

    let summary = project.pipeline().run(None).await.unwrap();
    let after = project.state();

    assert_eq!(summary.merges_applied, 3);
    assert_eq!(all_origins(&before), all_origins(&after));
    assert!(after.records.len() <= before.records.len());
    assert!(after.records.keys().all(|id| before.records.contains_key(id)));
    for (dupe, survivor) in &after.moved_dupe_ids {
        assert!(before.records.contains_key(dupe));
        assert!(after.records.contains_key(survivor), "{} -> {}", dupe, survivor);
    }
    for record in after.records.values() {
        check_registered_notes(record).unwrap();
    }
    after.check_invariants().unwrap();
}

#[tokio::test]
async fn test_background_record_survives_merge() {
    let mut records = bansal_pair();
    records[0].restore_status(RecordStatus::RevIncluded);
    let project = Project::new(records);

    let summary = project.pipeline().run(None).await.unwrap();

    assert_eq!(summary.background, 1);
    assert_eq!(summary.merges_applied, 1);
    let survivor = project.record("Bansal2015");
    assert_eq!(survivor.status(), RecordStatus::RevIncluded);
    assert!(survivor.has_origin("dblp/0001"));
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_events_follow_run_progress() {
    let project = Project::new(bansal_pair());
    let (pipeline, mut rx) = project.pipeline_with_events();

    pipeline.run(None).await.unwrap();
    let events = drain_events(&mut rx);

    assert!(matches!(
        events.first(),
        Some(DedupeEvent::RunStarted { records: 2, eligible: 2, background: 0, .. })
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        DedupeEvent::ScoringCompleted { method, .. } if method == "simple"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, DedupeEvent::ClustersFormed { to_merge: 1, .. })));
    match events.last() {
        Some(DedupeEvent::RunCompleted { summary }) => assert_eq!(summary.merges_applied, 1),
        other => panic!("expected RunCompleted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejections_reported_as_events() {
    let project = Project::new([
        bansal("Bansal2015", "crossref/0001", "Bansal, G. and Zahedi, F. M."),
        bansal("Bansal2015a", "crossref/0002", "Bansal, G. and Zahedi, F. M."),
    ]);
    let (pipeline, mut rx) = project.pipeline_with_events();

    pipeline.run(None).await.unwrap();
    let events = drain_events(&mut rx);

    let rejected = events
        .iter()
        .find_map(|e| match e {
            DedupeEvent::MergeRejected { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .unwrap();
    assert!(rejected.contains("same-source"));
}

#[tokio::test]
async fn test_failure_reported_as_error_event() {
    let project = Project::new(bansal_pair());
    project.store.inject_conflicts(2);
    let (pipeline, mut rx) = project.pipeline_with_events();

    assert!(pipeline.run(None).await.is_err());
    let events = drain_events(&mut rx);

    assert!(matches!(
        events.last(),
        Some(DedupeEvent::Error { kind, .. }) if kind == "StoreConflict"
    ));
}
