//! Quality model behaviour on whole records
//!
//! Covers status transitions, retraction handling, defect suppression,
//! idempotence and entrytype changes.

use revdup_common::quality::{check_registered_notes, DefectCode, QualityModel};
use revdup_common::record::{EntryType, Record, RecordStatus, IGNORE_MISSING};

fn complete_article(status: RecordStatus) -> Record {
    Record::from_fields(
        "Bansal2015",
        EntryType::Article,
        status,
        vec!["crossref/0001".to_string()],
        [
            ("author", "Bansal, Gaurav and Zahedi, F. Mariam"),
            ("title", "Trust violation and repair: The information privacy perspective"),
            ("journal", "Decision Support Systems"),
            ("year", "2015"),
            ("volume", "71"),
            ("number", "1"),
            ("pages", "62--77"),
            ("doi", "10.1016/j.dss.2015.01.009"),
        ],
        "crossref",
    )
    .unwrap()
}

#[test]
fn test_complete_record_is_prepared() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdImported);

    let report = model.run(&mut record, true);

    assert!(report.passed(), "unexpected defects: {:?}", report.defects);
    assert_eq!(record.status(), RecordStatus::MdPrepared);
}

#[test]
fn test_page_range_defect_blocks_promotion() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdImported);
    record.update_field("pages", "42--10", "manual", "", true);

    let report = model.run(&mut record, true);

    assert_eq!(report.defects, vec![("pages".to_string(), DefectCode::PageRange)]);
    assert!(record.md_prov()["pages"].has_note("page-range"));
    assert_eq!(record.status(), RecordStatus::MdNeedsManualPreparation);
}

#[test]
fn test_retraction_short_circuits() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdPrepared);
    record.update_field("retracted", "true", "crossref", "", false);
    // would otherwise raise page-range
    record.update_field("pages", "42--10", "manual", "", true);

    let report = model.run(&mut record, true);

    assert!(report.retracted);
    assert!(report.defects.is_empty());
    assert_eq!(record.status(), RecordStatus::RevPrescreenExcluded);
    assert_eq!(record.get("prescreen_exclusion"), Some("retracted"));
    assert!(!record.md_prov()["pages"].has_note("page-range"));
}

#[test]
fn test_dblp_withdrawal_counts_as_retraction() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdPrepared);
    record.update_field("warning", "Withdrawn (according to DBLP)", "dblp", "", false);

    assert!(model.run(&mut record, false).retracted);
}

#[test]
fn test_ignore_note_suppresses_defect() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdImported);
    record.update_field("title", "TRUST VIOLATION AND REPAIR", "manual", "IGNORE:mostly-all-caps", true);

    let report = model.run(&mut record, true);

    assert!(report.passed());
    assert_eq!(record.status(), RecordStatus::MdPrepared);
}

#[test]
fn test_removed_field_with_not_missing_note_is_not_missing() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdImported);
    record.remove_field("number", true, "manual");

    let report = model.run(&mut record, true);

    assert!(report.passed(), "unexpected defects: {:?}", report.defects);
    assert_eq!(record.md_prov()["number"].note, IGNORE_MISSING);
}

#[test]
fn test_quality_model_is_idempotent() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdImported);
    record.update_field("pages", "42--10", "manual", "", true);
    record.update_field("journal", "MISQ", "manual", "", true);
    record.remove_field("volume", false, "manual");

    model.run(&mut record, true);
    let first = record.clone();
    model.run(&mut record, true);

    assert_eq!(record.md_prov(), first.md_prov());
    assert_eq!(record.d_prov(), first.d_prov());
    assert_eq!(record.status(), first.status());
}

#[test]
fn test_only_registered_codes_are_written() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdImported);
    record.update_field("author", "Dr. SMITH and others", "manual", "", true);
    record.update_field("language", "english", "manual", "", false);
    model.run(&mut record, true);

    assert!(record.has_quality_defects());
    assert!(check_registered_notes(&record).is_ok());
    for (_, note) in record.defects() {
        assert!(DefectCode::is_registered(&note), "unregistered note {}", note);
    }
}

#[test]
fn test_fixed_defect_is_cleared_on_rerun() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdImported);
    record.update_field("pages", "42--10", "manual", "", true);
    model.run(&mut record, true);
    assert_eq!(record.status(), RecordStatus::MdNeedsManualPreparation);

    record.update_field("pages", "10--42", "manual", "", true);
    model.run(&mut record, true);
    assert!(!record.has_quality_defects());
    assert_eq!(record.status(), RecordStatus::MdPrepared);
}

#[test]
fn test_not_missing_note_dropped_once_year_is_known() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdImported);
    record.update_field("year", "forthcoming", "manual", "", true);
    record.remove_field("volume", false, "manual");
    record.remove_field("number", false, "manual");

    let report = model.run(&mut record, true);
    assert!(report.passed(), "unexpected defects: {:?}", report.defects);
    assert!(record.md_prov()["volume"].has_note("not-missing"));

    record.update_field("year", "2015", "manual", "", true);
    model.run(&mut record, true);

    let volume = &record.md_prov()["volume"];
    assert!(volume.has_note("missing"));
    assert!(!volume.has_note("not-missing"));
    assert_eq!(record.status(), RecordStatus::MdNeedsManualPreparation);
}

#[test]
fn test_change_entrytype_round_trip_keeps_identifying_fields() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdPrepared);
    let before: Vec<(String, String)> = record
        .fields()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    record.change_entrytype("inproceedings", &model).unwrap();
    assert_eq!(record.entrytype(), EntryType::Inproceedings);
    assert_eq!(record.get("booktitle"), Some("Decision Support Systems"));
    assert!(!record.contains("journal"));

    record.change_entrytype("article", &model).unwrap();
    let after: Vec<(String, String)> = record
        .fields()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    assert_eq!(before, after);
    assert!(record.md_prov()["journal"].source.contains("rename-from:booktitle"));
}

#[test]
fn test_change_entrytype_unknown_value_fails() {
    let model = QualityModel::new();
    let mut record = complete_article(RecordStatus::MdPrepared);
    assert!(record.change_entrytype("dataset", &model).is_err());
    assert_eq!(record.entrytype(), EntryType::Article);
}

#[test]
fn test_checker_registry_lists_builtins() {
    let model = QualityModel::new();
    let names = model.checker_names();
    assert!(names.contains(&"missing-field"));
    assert!(names.contains(&"page-range"));
    assert_eq!(names.len(), 21);
    assert!(QualityModel::empty().checker_names().is_empty());
}
