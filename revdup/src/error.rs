//! Error types for revdup
//!
//! Per-pair and per-cluster errors (`PairUnscored`, `MergeRejected`) are
//! caught at the cluster boundary and counted. Everything else aborts the run
//! and maps to a process exit code.

use crate::merge::RejectReason;
use thiserror::Error;

/// Result type for dedupe operations
pub type Result<T> = std::result::Result<T, DedupeError>;

/// Exit codes of the CLI surface
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const ABORTED_BY_USER: i32 = 1;
    pub const SAMPLE_TOO_SMALL: i32 = 2;
    pub const INCONSISTENT_STORE: i32 = 3;
    pub const MISSING_ARTIFACTS: i32 = 4;
}

/// Dedupe error taxonomy
#[derive(Debug, Error)]
pub enum DedupeError {
    /// Record set unusable for the requested operation
    #[error("Input ineligible: {0}")]
    InputIneligible(String),

    /// Active-learning sample below the minimum
    #[error("Sample too small: {size} records (minimum {minimum})")]
    SampleTooSmall { size: usize, minimum: usize },

    /// Store content breaks a record or store invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Classifier could not score a pair
    #[error("Pair ({id_a}, {id_b}) unscored: {reason}")]
    PairUnscored {
        id_a: String,
        id_b: String,
        reason: String,
    },

    /// Merge blocked by a legality gate
    #[error("Merge {primary_id} <- {dupe_id} rejected: {reason}")]
    MergeRejected {
        primary_id: String,
        dupe_id: String,
        reason: RejectReason,
    },

    /// Labeler returned a cancellation signal
    #[error("Labeling cancelled by user")]
    LabelerCancelled,

    /// Run cancelled at a suspension point
    #[error("Run cancelled")]
    Cancelled,

    /// Store rejected the save (external lock or stale revision)
    #[error("Store conflict: {0}")]
    StoreConflict(String),

    /// Application-only run without training artifacts
    #[error("Missing training artifacts: {0}")]
    MissingArtifacts(String),

    /// Artifact present but truncated or corrupt
    #[error("Artifact rejected: {0}")]
    CorruptArtifact(String),

    /// Another run holds the artifact lock
    #[error("Artifacts locked by another run: {0}")]
    Locked(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// revdup-common error
    #[error(transparent)]
    Common(#[from] revdup_common::Error),
}

impl DedupeError {
    /// Process exit code for a fatal error
    pub fn exit_code(&self) -> i32 {
        match self {
            DedupeError::LabelerCancelled | DedupeError::Cancelled => exit_code::ABORTED_BY_USER,
            DedupeError::InputIneligible(_) | DedupeError::SampleTooSmall { .. } => {
                exit_code::SAMPLE_TOO_SMALL
            }
            DedupeError::MissingArtifacts(_) | DedupeError::CorruptArtifact(_) => {
                exit_code::MISSING_ARTIFACTS
            }
            _ => exit_code::INCONSISTENT_STORE,
        }
    }

    /// Short name of the error kind for the summary line
    pub fn kind(&self) -> &'static str {
        match self {
            DedupeError::InputIneligible(_) => "InputIneligible",
            DedupeError::SampleTooSmall { .. } => "SampleTooSmall",
            DedupeError::InvariantViolation(_) => "InvariantViolation",
            DedupeError::PairUnscored { .. } => "PairUnscored",
            DedupeError::MergeRejected { .. } => "MergeRejected",
            DedupeError::LabelerCancelled => "LabelerCancelled",
            DedupeError::Cancelled => "Cancelled",
            DedupeError::StoreConflict(_) => "StoreConflict",
            DedupeError::MissingArtifacts(_) => "MissingArtifacts",
            DedupeError::CorruptArtifact(_) => "CorruptArtifact",
            DedupeError::Locked(_) => "Locked",
            DedupeError::Database(_) => "Database",
            DedupeError::Serialization(_) => "Serialization",
            DedupeError::Io(_) => "Io",
            DedupeError::Common(_) => "Common",
        }
    }
}
