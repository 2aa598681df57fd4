//! Out-of-core blocking
//!
//! When the working set does not fit in memory, blocking keys go to a per-run
//! SQLite file with a single `blocking_map(block_key, id)` table and candidate
//! pairs are streamed out of a self-join in batches, keyed on the last pair
//! of the previous batch. The file lives in a
//! temporary directory that is removed when the map is dropped.

use super::{blocking_keys, CandidatePair};
use crate::error::{DedupeError, Result};
use crate::similarity::ComparisonRecord;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use sysinfo::System;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Estimated memory per record for in-memory blocking and scoring
pub const BYTES_PER_RECORD: u64 = 5_000_000;

/// Whether a working set of `records` should be blocked on disk
pub fn needs_out_of_core(records: usize) -> bool {
    let mut sys = System::new();
    sys.refresh_memory();
    let available = sys.available_memory();
    let required = records as u64 * BYTES_PER_RECORD;
    debug!(records, required, available, "Out-of-core check");
    required > available
}

/// Blocking keys persisted to a per-run database
pub struct DiskBlockingMap {
    pool: SqlitePool,
    path: PathBuf,
    dir: TempDir,
}

impl DiskBlockingMap {
    /// Create an empty blocking database in a fresh temporary directory
    pub async fn create() -> Result<Self> {
        let dir = TempDir::new()?;
        Self::create_in(dir).await
    }

    /// Create the blocking database inside `parent`
    pub async fn create_under(parent: &Path) -> Result<Self> {
        let dir = TempDir::new_in(parent)?;
        Self::create_in(dir).await
    }

    async fn create_in(dir: TempDir) -> Result<Self> {
        let path = dir.path().join("blocking.db");
        let db_url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new().max_connections(1).connect(&db_url).await?;

        sqlx::query("CREATE TABLE blocking_map (block_key TEXT NOT NULL, id TEXT NOT NULL)")
            .execute(&pool)
            .await?;

        info!(path = %path.display(), "Created on-disk blocking map");
        Ok(Self { pool, path, dir })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the blocking keys of every record; returns the number of rows
    pub async fn insert_keys(&self, records: &[ComparisonRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut rows = 0;
        for record in records {
            for key in blocking_keys(record) {
                sqlx::query("INSERT INTO blocking_map (block_key, id) VALUES (?, ?)")
                    .bind(&key)
                    .bind(&record.id)
                    .execute(&mut *tx)
                    .await?;
                rows += 1;
            }
        }
        tx.commit().await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_blocking_key ON blocking_map(block_key)")
            .execute(&self.pool)
            .await?;
        debug!(rows, "Blocking keys written");
        Ok(rows)
    }

    /// One batch of distinct candidate pairs ordered after `after`
    pub async fn pair_batch(
        &self,
        max_block_size: usize,
        after: Option<&CandidatePair>,
        batch_size: usize,
    ) -> Result<Vec<CandidatePair>> {
        let (last_a, last_b) = after
            .map(|(a, b)| (a.as_str(), b.as_str()))
            .unwrap_or(("", ""));
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT l.id, r.id
            FROM blocking_map l
            JOIN blocking_map r USING (block_key)
            WHERE l.id < r.id
              AND (l.id > ? OR (l.id = ? AND r.id > ?))
              AND block_key IN (
                  SELECT block_key FROM blocking_map
                  GROUP BY block_key
                  HAVING COUNT(*) <= ?
              )
            ORDER BY l.id, r.id
            LIMIT ?
            "#,
        )
        .bind(last_a)
        .bind(last_a)
        .bind(last_b)
        .bind(max_block_size as i64)
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Cursor over the candidate pairs, one batch at a time
    pub fn batches(&self, max_block_size: usize, batch_size: usize) -> PairBatches<'_> {
        PairBatches {
            map: self,
            max_block_size,
            batch_size: batch_size.max(1),
            last: None,
            done: false,
        }
    }

    /// Collect every candidate pair
    pub async fn all_pairs(
        &self,
        max_block_size: usize,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidatePair>> {
        let mut pairs = Vec::new();
        let mut batches = self.batches(max_block_size, batch_size);
        while let Some(batch) = batches.next(cancel).await? {
            pairs.extend(batch);
        }
        debug!(pairs = pairs.len(), "On-disk blocking complete");
        Ok(pairs)
    }

    /// Close the database and remove its directory
    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        self.dir.close()?;
        Ok(())
    }
}

/// Batches of candidate pairs streamed out of a `DiskBlockingMap`
///
/// Only the current batch is held in memory; cancellation is checked before
/// each fetch.
pub struct PairBatches<'a> {
    map: &'a DiskBlockingMap,
    max_block_size: usize,
    batch_size: usize,
    last: Option<CandidatePair>,
    done: bool,
}

impl PairBatches<'_> {
    /// Next batch, `None` once the join is exhausted
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<Vec<CandidatePair>>> {
        if self.done {
            return Ok(None);
        }
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DedupeError::Cancelled),
            batch = self.map.pair_batch(self.max_block_size, self.last.as_ref(), self.batch_size) => batch?,
        };
        if batch.len() < self.batch_size {
            self.done = true;
        }
        match batch.last() {
            Some(last) => self.last = Some(last.clone()),
            None => return Ok(None),
        }
        Ok(Some(batch))
    }
}
