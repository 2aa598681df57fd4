//! In-process record store
//!
//! Used by tests and by simple-mode runs on small record sets. Behaves like the
//! SQLite store: stale revisions are rejected and every save archives a snapshot.

use super::{LoadedStore, RecordHeader, RecordStore, StoreState};
use crate::error::{DedupeError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    state: StoreState,
    revision: i64,
    snapshots: Vec<StoreState>,
    pending_conflicts: usize,
}

/// Record store held in memory
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    keep_history: bool,
}

impl MemoryStore {
    pub fn new(state: StoreState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                ..Inner::default()
            }),
            keep_history: true,
        }
    }

    /// Store that never records snapshots
    pub fn without_history(state: StoreState) -> Self {
        Self {
            keep_history: false,
            ..Self::new(state)
        }
    }

    /// Make the next `count` saves fail with `StoreConflict`
    pub fn inject_conflicts(&self, count: usize) {
        self.lock().pending_conflicts = count;
    }

    /// Current content
    pub fn state(&self) -> StoreState {
        self.lock().state.clone()
    }

    pub fn revision(&self) -> i64 {
        self.lock().revision
    }

    /// Replace content outside of a run (bumps the revision like a foreign writer)
    pub fn overwrite(&self, state: StoreState) {
        let mut inner = self.lock();
        inner.state = state;
        inner.revision += 1;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load_all(&self) -> Result<LoadedStore> {
        let inner = self.lock();
        Ok(LoadedStore {
            state: inner.state.clone(),
            revision: inner.revision,
        })
    }

    async fn load_headers_only(&self) -> Result<BTreeMap<String, RecordHeader>> {
        let inner = self.lock();
        Ok(inner
            .state
            .records
            .iter()
            .map(|(id, record)| {
                (
                    id.clone(),
                    RecordHeader {
                        id: id.clone(),
                        status: record.status(),
                        origin: record.origin().to_vec(),
                    },
                )
            })
            .collect())
    }

    async fn save_all(&self, state: &StoreState, base_revision: i64) -> Result<i64> {
        let mut inner = self.lock();
        if inner.pending_conflicts > 0 {
            inner.pending_conflicts -= 1;
            return Err(DedupeError::StoreConflict("store locked by another writer".into()));
        }
        if inner.revision != base_revision {
            return Err(DedupeError::StoreConflict(format!(
                "store is at revision {}, save was based on {}",
                inner.revision, base_revision
            )));
        }
        if self.keep_history {
            let previous = std::mem::replace(&mut inner.state, state.clone());
            inner.snapshots.push(previous);
        } else {
            inner.state = state.clone();
        }
        inner.revision += 1;
        Ok(inner.revision)
    }

    async fn snapshot_history(&self) -> Result<Vec<StoreState>> {
        let inner = self.lock();
        Ok(inner.snapshots.iter().rev().cloned().collect())
    }
}
