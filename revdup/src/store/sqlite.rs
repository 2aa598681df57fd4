//! SQLite record store
//!
//! Tables:
//! - `records(id, status, origin, data)`: one row per active record, full JSON in `data`
//! - `moved_dupe_ids(dupe_id, survivor_id)`
//! - `snapshots(seq, created_at, data)`: archived store states
//! - `store_meta(key, value)`: `revision` counter for stale-write detection

use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use super::{LoadedStore, RecordHeader, RecordStore, StoreState};
use crate::error::{DedupeError, Result};
use async_trait::async_trait;
use revdup_common::{Record, RecordStatus};
use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Open (creating if needed) the store database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new().max_connections(5).connect(&db_url).await?;

    if newly_created {
        info!("Initialized new record store: {}", db_path.display());
    } else {
        info!("Opened existing record store: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_tables(&pool).await?;
    Ok(pool)
}

async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            origin TEXT NOT NULL,
            data TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS moved_dupe_ids (
            dupe_id TEXT PRIMARY KEY,
            survivor_id TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            data TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn read_revision(conn: &mut SqliteConnection) -> Result<i64> {
    let revision: Option<i64> = sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'revision'")
        .fetch_optional(&mut *conn)
        .await?;
    Ok(revision.unwrap_or(0))
}

async fn read_state(conn: &mut SqliteConnection) -> Result<StoreState> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT data FROM records ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    let mut state = StoreState::default();
    for (data,) in rows {
        let record: Record = serde_json::from_str(&data)?;
        state.records.insert(record.id().to_string(), record);
    }

    let moved: Vec<(String, String)> =
        sqlx::query_as("SELECT dupe_id, survivor_id FROM moved_dupe_ids ORDER BY dupe_id")
            .fetch_all(&mut *conn)
            .await?;
    state.moved_dupe_ids = moved.into_iter().collect();
    Ok(state)
}

/// Record store backed by SQLite
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    /// Open the store file at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::new(init_database_pool(db_path).await?))
    }

    /// Private in-memory database (single connection)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        create_tables(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn save_all_once(&self, state: &StoreState, base_revision: i64) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let current = read_revision(&mut tx).await?;
        if current != base_revision {
            return Err(DedupeError::StoreConflict(format!(
                "store is at revision {}, save was based on {}",
                current, base_revision
            )));
        }

        let previous = read_state(&mut tx).await?;
        if !previous.records.is_empty() || !previous.moved_dupe_ids.is_empty() {
            sqlx::query("INSERT INTO snapshots (created_at, data) VALUES (?, ?)")
                .bind(revdup_common::time::now_iso8601())
                .bind(serde_json::to_string(&previous)?)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM records").execute(&mut *tx).await?;
        for record in state.records.values() {
            sqlx::query("INSERT INTO records (id, status, origin, data) VALUES (?, ?, ?, ?)")
                .bind(record.id())
                .bind(record.status().as_str())
                .bind(serde_json::to_string(record.origin())?)
                .bind(serde_json::to_string(record)?)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM moved_dupe_ids").execute(&mut *tx).await?;
        for (dupe, survivor) in &state.moved_dupe_ids {
            sqlx::query("INSERT INTO moved_dupe_ids (dupe_id, survivor_id) VALUES (?, ?)")
                .bind(dupe)
                .bind(survivor)
                .execute(&mut *tx)
                .await?;
        }

        let revision = current + 1;
        sqlx::query(
            "INSERT INTO store_meta (key, value) VALUES ('revision', ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(revision)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(records = state.records.len(), revision, "Record store saved");
        Ok(revision)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn load_all(&self) -> Result<LoadedStore> {
        let mut tx = self.pool.begin().await?;
        let revision = read_revision(&mut tx).await?;
        let state = read_state(&mut tx).await?;
        tx.commit().await?;
        Ok(LoadedStore { state, revision })
    }

    async fn load_headers_only(&self) -> Result<BTreeMap<String, RecordHeader>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT id, status, origin FROM records ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        let mut headers = BTreeMap::new();
        for (id, status, origin) in rows {
            let header = RecordHeader {
                status: status.parse::<RecordStatus>()?,
                origin: serde_json::from_str(&origin)?,
                id: id.clone(),
            };
            headers.insert(id, header);
        }
        Ok(headers)
    }

    async fn save_all(&self, state: &StoreState, base_revision: i64) -> Result<i64> {
        retry_on_lock("save_all", self.max_lock_wait_ms, || {
            self.save_all_once(state, base_revision)
        })
        .await
    }

    async fn snapshot_history(&self) -> Result<Vec<StoreState>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT data FROM snapshots ORDER BY seq DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(data,)| serde_json::from_str(&data).map_err(DedupeError::from))
            .collect()
    }
}
