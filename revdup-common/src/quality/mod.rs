//! Quality model
//!
//! A closed registry of pure defect checkers. Each checker inspects a record
//! and returns annotations; the model applies them to the field provenance
//! and moves the record's status accordingly.
//!
//! # Status rule
//! - Retraction signals are checked first and short-circuit everything else
//! - Any remaining defect note → `md_needs_manual_preparation`
//! - Otherwise, when requested, → `md_prepared`

mod checkers;
pub mod language;

use crate::record::{Record, RecordStatus, IGNORE_PREFIX, NOT_MISSING};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Registered defect codes (downstream consumers match on the string form)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefectCode {
    Missing,
    MostlyAllCaps,
    ContainerTitleAbbreviated,
    ErroneousSymbolInField,
    ErroneousTermInField,
    HtmlTags,
    HtmlChars,
    NameFormatSeparators,
    NameFormatTitles,
    NameParticles,
    NameAbbreviated,
    IncompleteField,
    IdenticalValuesBetweenTitleAndContainer,
    InconsistentContent,
    InconsistentWithEntrytype,
    DoiNotMatchingPattern,
    IsbnNotMatchingPattern,
    PageRange,
    YearFormat,
    ThesisWithMultipleAuthors,
    LanguageFormatError,
}

impl DefectCode {
    pub const ALL: [DefectCode; 21] = [
        DefectCode::Missing,
        DefectCode::MostlyAllCaps,
        DefectCode::ContainerTitleAbbreviated,
        DefectCode::ErroneousSymbolInField,
        DefectCode::ErroneousTermInField,
        DefectCode::HtmlTags,
        DefectCode::HtmlChars,
        DefectCode::NameFormatSeparators,
        DefectCode::NameFormatTitles,
        DefectCode::NameParticles,
        DefectCode::NameAbbreviated,
        DefectCode::IncompleteField,
        DefectCode::IdenticalValuesBetweenTitleAndContainer,
        DefectCode::InconsistentContent,
        DefectCode::InconsistentWithEntrytype,
        DefectCode::DoiNotMatchingPattern,
        DefectCode::IsbnNotMatchingPattern,
        DefectCode::PageRange,
        DefectCode::YearFormat,
        DefectCode::ThesisWithMultipleAuthors,
        DefectCode::LanguageFormatError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DefectCode::Missing => "missing",
            DefectCode::MostlyAllCaps => "mostly-all-caps",
            DefectCode::ContainerTitleAbbreviated => "container-title-abbreviated",
            DefectCode::ErroneousSymbolInField => "erroneous-symbol-in-field",
            DefectCode::ErroneousTermInField => "erroneous-term-in-field",
            DefectCode::HtmlTags => "html-tags",
            DefectCode::HtmlChars => "html-chars",
            DefectCode::NameFormatSeparators => "name-format-separators",
            DefectCode::NameFormatTitles => "name-format-titles",
            DefectCode::NameParticles => "name-particles",
            DefectCode::NameAbbreviated => "name-abbreviated",
            DefectCode::IncompleteField => "incomplete-field",
            DefectCode::IdenticalValuesBetweenTitleAndContainer => {
                "identical-values-between-title-and-container"
            }
            DefectCode::InconsistentContent => "inconsistent-content",
            DefectCode::InconsistentWithEntrytype => "inconsistent-with-entrytype",
            DefectCode::DoiNotMatchingPattern => "doi-not-matching-pattern",
            DefectCode::IsbnNotMatchingPattern => "isbn-not-matching-pattern",
            DefectCode::PageRange => "page-range",
            DefectCode::YearFormat => "year-format",
            DefectCode::ThesisWithMultipleAuthors => "thesis-with-multiple-authors",
            DefectCode::LanguageFormatError => "language-format-error",
        }
    }

    /// Whether a note token is a registered defect code
    pub fn is_registered(note: &str) -> bool {
        note.parse::<DefectCode>().is_ok()
    }
}

impl fmt::Display for DefectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefectCode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DefectCode::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| Error::InvalidInput(format!("unregistered defect code: {}", s)))
    }
}

/// A note produced by a checker for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Defect { field: String, code: DefectCode },
    /// Required field legitimately absent
    NotMissing { field: String },
}

impl Annotation {
    pub fn defect(field: &str, code: DefectCode) -> Self {
        Annotation::Defect {
            field: field.to_string(),
            code,
        }
    }
}

/// A pure defect checker
pub type Checker = fn(&Record) -> Vec<Annotation>;

/// Result of running the model on one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityReport {
    /// Retraction signal found (all other checks skipped)
    pub retracted: bool,
    /// Defects applied to the record
    pub defects: Vec<(String, DefectCode)>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        !self.retracted && self.defects.is_empty()
    }
}

/// Defect checker registry
pub struct QualityModel {
    checkers: Vec<(&'static str, Checker)>,
}

impl Default for QualityModel {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityModel {
    /// Model with every built-in checker registered
    pub fn new() -> Self {
        let mut model = Self { checkers: Vec::new() };
        for (name, checker) in checkers::BUILT_IN {
            model.register(name, *checker);
        }
        model
    }

    /// Model without checkers (retraction detection still runs)
    pub fn empty() -> Self {
        Self { checkers: Vec::new() }
    }

    pub fn register(&mut self, name: &'static str, checker: Checker) {
        self.checkers.push((name, checker));
    }

    pub fn checker_names(&self) -> Vec<&'static str> {
        self.checkers.iter().map(|(name, _)| *name).collect()
    }

    /// Evaluate a record, update its defect notes and status
    pub fn run(&self, record: &mut Record, set_prepared: bool) -> QualityReport {
        if is_retracted(record) {
            record.update_field("prescreen_exclusion", "retracted", "quality_model", "", false);
            if record.status().can_transition_to(RecordStatus::RevPrescreenExcluded) {
                record.restore_status(RecordStatus::RevPrescreenExcluded);
            }
            debug!(record_id = %record.id(), "Retraction detected");
            return QualityReport {
                retracted: true,
                defects: Vec::new(),
            };
        }

        for code in DefectCode::ALL {
            record.clear_note_everywhere(code.as_str());
        }
        record.clear_note_everywhere(NOT_MISSING);

        let annotations: Vec<Annotation> = self
            .checkers
            .iter()
            .flat_map(|(_, checker)| checker(record))
            .collect();

        let mut report = QualityReport::default();
        for annotation in annotations {
            match annotation {
                Annotation::Defect { field, code } => {
                    if is_suppressed(record, &field, code) {
                        continue;
                    }
                    record.add_field_note(&field, code.as_str());
                    if record.has_defect(&field, code.as_str()) {
                        report.defects.push((field, code));
                    }
                }
                Annotation::NotMissing { field } => record.add_field_note(&field, NOT_MISSING),
            }
        }
        record.prune_provenance();
        report.defects.sort();
        report.defects.dedup();

        let status = record.status();
        let target = if record.has_quality_defects() {
            Some(RecordStatus::MdNeedsManualPreparation)
        } else if set_prepared {
            Some(RecordStatus::MdPrepared)
        } else {
            None
        };
        if let Some(target) = target {
            // Records past md_prepared keep their status; defects stay annotated
            if status <= RecordStatus::MdPrepared && status.can_transition_to(target) {
                record.restore_status(target);
            }
        }

        debug!(
            record_id = %record.id(),
            defects = report.defects.len(),
            status = %record.status(),
            "Quality model applied"
        );
        report
    }

    /// Run on a batch; records keep their order
    pub fn run_all<'a>(&self, records: impl IntoIterator<Item = &'a mut Record>, set_prepared: bool) -> usize {
        records
            .into_iter()
            .map(|r| self.run(r, set_prepared))
            .filter(|report| !report.passed())
            .count()
    }
}

fn is_suppressed(record: &Record, field: &str, code: DefectCode) -> bool {
    let ignore = format!("{}{}", IGNORE_PREFIX, code.as_str());
    record.has_defect(field, &ignore)
}

/// Retraction signals: explicit flag, crossmark, DBLP withdrawal warning
pub fn is_retracted(record: &Record) -> bool {
    record.get("retracted").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false)
        || record.get("crossmark") == Some("True")
        || record.get("warning") == Some("Withdrawn (according to DBLP)")
}

/// Validate that every note on a record is a registered code or a sentinel
pub fn check_registered_notes(record: &Record) -> Result<()> {
    for (field, note) in record.defects() {
        if !DefectCode::is_registered(&note) {
            return Err(Error::InvalidInput(format!(
                "record {} carries unregistered note {} on {}",
                record.id(),
                note,
                field
            )));
        }
    }
    Ok(())
}
