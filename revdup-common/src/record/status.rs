//! Record lifecycle states
//!
//! Variants are declared in lifecycle order; `Ord` follows that order.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A state in the review lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    MdRetrieved,
    MdImported,
    MdNeedsManualPreparation,
    MdPrepared,
    MdProcessed,
    RevPrescreenExcluded,
    RevPrescreenIncluded,
    PdfNeedsManualRetrieval,
    PdfImported,
    PdfNotAvailable,
    PdfNeedsManualPreparation,
    PdfPrepared,
    RevExcluded,
    RevIncluded,
    RevSynthesized,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 15] = [
        RecordStatus::MdRetrieved,
        RecordStatus::MdImported,
        RecordStatus::MdNeedsManualPreparation,
        RecordStatus::MdPrepared,
        RecordStatus::MdProcessed,
        RecordStatus::RevPrescreenExcluded,
        RecordStatus::RevPrescreenIncluded,
        RecordStatus::PdfNeedsManualRetrieval,
        RecordStatus::PdfImported,
        RecordStatus::PdfNotAvailable,
        RecordStatus::PdfNeedsManualPreparation,
        RecordStatus::PdfPrepared,
        RecordStatus::RevExcluded,
        RecordStatus::RevIncluded,
        RecordStatus::RevSynthesized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::MdRetrieved => "md_retrieved",
            RecordStatus::MdImported => "md_imported",
            RecordStatus::MdNeedsManualPreparation => "md_needs_manual_preparation",
            RecordStatus::MdPrepared => "md_prepared",
            RecordStatus::MdProcessed => "md_processed",
            RecordStatus::RevPrescreenExcluded => "rev_prescreen_excluded",
            RecordStatus::RevPrescreenIncluded => "rev_prescreen_included",
            RecordStatus::PdfNeedsManualRetrieval => "pdf_needs_manual_retrieval",
            RecordStatus::PdfImported => "pdf_imported",
            RecordStatus::PdfNotAvailable => "pdf_not_available",
            RecordStatus::PdfNeedsManualPreparation => "pdf_needs_manual_preparation",
            RecordStatus::PdfPrepared => "pdf_prepared",
            RecordStatus::RevExcluded => "rev_excluded",
            RecordStatus::RevIncluded => "rev_included",
            RecordStatus::RevSynthesized => "rev_synthesized",
        }
    }

    /// Metadata stages (before a record leaves the dedupe stage)
    pub fn is_metadata_stage(&self) -> bool {
        *self <= RecordStatus::MdProcessed
    }

    /// Whether `next` is reachable from `self` along the lifecycle graph
    ///
    /// Unmerge bypasses this check when restoring records.
    pub fn can_transition_to(&self, next: RecordStatus) -> bool {
        use RecordStatus::*;
        if *self == next {
            return true;
        }
        match (*self, next) {
            // Manual preparation rework after a defect is found
            (MdPrepared, MdNeedsManualPreparation) => true,
            (MdImported, MdNeedsManualPreparation) => true,
            // Retraction detection may exclude a record from any metadata stage
            (from, RevPrescreenExcluded) if from.is_metadata_stage() => true,
            (from, to) => to > from && !(from < MdPrepared && to > MdPrepared && to.is_metadata_stage()),
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| Error::InvalidInput(format!("unknown record status: {}", s)))
    }
}
