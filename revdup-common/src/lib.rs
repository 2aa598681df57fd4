//! # revdup Common Library
//!
//! Shared code for the revdup deduplication core and any review stage that
//! reads the same record store:
//! - Bibliographic record model with field provenance
//! - Quality model (defect checkers and status transitions)
//! - Configuration loading
//! - Utility functions

pub mod config;
pub mod error;
pub mod quality;
pub mod record;
pub mod text;
pub mod time;

pub use error::{Error, Result};
pub use quality::{DefectCode, QualityModel};
pub use record::{EntryType, FieldProvenance, Record, RecordStatus};
