//! Record store
//!
//! The canonical record collection the dedupe core reads from and writes to.
//! Every successful `save_all` first archives the previous state as a
//! snapshot, so unmerge can walk back through earlier shapes of the store.

mod memory;
pub mod retry;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{init_database_pool, SqliteRecordStore};

use crate::error::{DedupeError, Result};
use async_trait::async_trait;
use revdup_common::{Record, RecordStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Records keyed by id (ordered, so iteration is deterministic)
pub type RecordMap = BTreeMap<String, Record>;

/// `moved_dupe_id[dupe] = survivor`
pub type MovedDupes = BTreeMap<String, String>;

/// One consistent state of the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    pub records: RecordMap,
    #[serde(default)]
    pub moved_dupe_ids: MovedDupes,
}

impl StoreState {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id().to_string(), r)).collect(),
            moved_dupe_ids: MovedDupes::new(),
        }
    }

    /// Follow `moved_dupe_id` links to the surviving id
    pub fn resolve_survivor<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        let mut hops = 0;
        while let Some(next) = self.moved_dupe_ids.get(current) {
            current = next;
            hops += 1;
            if hops > self.moved_dupe_ids.len() {
                break;
            }
        }
        current
    }

    /// Check store-wide invariants: record-local invariants and unique origin tokens
    pub fn check_invariants(&self) -> Result<()> {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (id, record) in &self.records {
            if id != record.id() {
                return Err(DedupeError::InvariantViolation(format!(
                    "record stored under {} has id {}",
                    id,
                    record.id()
                )));
            }
            record
                .check_invariants()
                .map_err(|e| DedupeError::InvariantViolation(e.to_string()))?;
            for token in record.origin() {
                if let Some(other) = owners.insert(token.as_str(), id.as_str()) {
                    return Err(DedupeError::InvariantViolation(format!(
                        "origin token {} shared by {} and {}",
                        token, other, id
                    )));
                }
            }
        }
        for (dupe, survivor) in &self.moved_dupe_ids {
            if self.records.contains_key(dupe) {
                return Err(DedupeError::InvariantViolation(format!(
                    "merged-away record {} is still in the store",
                    dupe
                )));
            }
            let target = self.resolve_survivor(survivor);
            if !self.records.contains_key(target) {
                return Err(DedupeError::InvariantViolation(format!(
                    "moved_dupe_id {} -> {} points to no record",
                    dupe, survivor
                )));
            }
        }
        Ok(())
    }
}

/// Store state plus the revision it was read at
#[derive(Debug, Clone)]
pub struct LoadedStore {
    pub state: StoreState,
    pub revision: i64,
}

/// id, status and origin only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub id: String,
    pub status: RecordStatus,
    pub origin: Vec<String>,
}

/// Canonical record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Full records, moved-dupe map and current revision
    async fn load_all(&self) -> Result<LoadedStore>;

    /// Headers for eligibility scans
    async fn load_headers_only(&self) -> Result<BTreeMap<String, RecordHeader>>;

    /// Atomically replace the store content
    ///
    /// Fails with `StoreConflict` when the store moved past `base_revision`
    /// or is locked by another writer. Survivor origin tokens are written as
    /// part of the record data.
    async fn save_all(&self, state: &StoreState, base_revision: i64) -> Result<i64>;

    /// Earlier states, newest first (empty when history is unavailable)
    async fn snapshot_history(&self) -> Result<Vec<StoreState>>;
}
