//! revdup library interface
//!
//! Record deduplication for literature reviews: blocking, similarity,
//! active-learning classification, clustering and reversible merges over a
//! canonical record store.

pub mod blocking;
pub mod cluster;
pub mod error;
pub mod learning;
pub mod merge;
pub mod orchestrator;
pub mod report;
pub mod similarity;
pub mod store;

pub use crate::error::{DedupeError, Result};
pub use crate::orchestrator::{DedupeConfig, DedupeEvent, DedupeMode, DedupePipeline, DedupeSummary};
pub use crate::store::{RecordStore, StoreState};

use std::path::{Path, PathBuf};

/// Record database inside a project root
pub const STORE_FILE: &str = "records.db";

pub fn store_path(root: &Path) -> PathBuf {
    root.join(STORE_FILE)
}
