//! SQLite repository
//!
//! Wraps a [`MemoryStore`] and mirrors it into a single `metrics` table.
//! Reads and merges never touch the database; it only ever receives whole
//! snapshots.
//!
//! ## Startup
//!
//! 1. Connect the pool using the DSN (a `sqlite://` URL) and run `SELECT 1`
//! 2. Drop the table unless restoring, then create the schema if absent
//! 3. Check the table is readable
//! 4. Restore rows into memory when configured
//!
//! Any failure in 1-3 fails `init`, and the caller falls back to the next
//! backend.
//!
//! ## Flushing
//!
//! One transaction per snapshot: `DELETE FROM metrics` followed by one
//! insert per metric. A transaction dropped before commit (error or
//! timeout) rolls back, leaving the previous snapshot in place.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::backend::{Lifecycle, Repository, RepositoryState};
use super::error::{StorageError, StorageResult, with_timeout};
use super::flush::{FlushScheduler, SnapshotSink, persist};
use super::memory::MemoryStore;
use crate::config::StorageSettings;
use crate::metric::{Metric, MetricPayload};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS metrics (
        "ID"    TEXT PRIMARY KEY,
        "MType" TEXT NOT NULL DEFAULT 'gauge',
        "Delta" INTEGER,
        "Value" REAL,
        "Hash"  TEXT NOT NULL DEFAULT ''
    )
"#;

const CREATE_INDEX: &str = r#"CREATE INDEX IF NOT EXISTS metrics_mtype_idx ON metrics ("MType")"#;

/// Repository persisted to a SQLite table
pub struct DatabaseStore {
    dsn: Option<String>,
    store_interval: Duration,
    restore: bool,
    operation_timeout: Duration,
    memory: Arc<MemoryStore>,
    sink: Option<Arc<DatabaseSink>>,
    scheduler: Mutex<Option<FlushScheduler>>,
    lifecycle: Lifecycle,
}

impl DatabaseStore {
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            dsn: settings.database_dsn.clone(),
            store_interval: settings.store_interval,
            restore: settings.restore,
            operation_timeout: settings.operation_timeout,
            memory: Arc::new(MemoryStore::new()),
            sink: None,
            scheduler: Mutex::new(None),
            lifecycle: Lifecycle::new(),
        }
    }

    async fn connect(&self, dsn: &str) -> StorageResult<Pool<Sqlite>> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| StorageError::InvalidConfig(format!("bad database DSN: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.operation_timeout);

        let pool = with_timeout(self.operation_timeout, "connecting to database", async {
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(self.operation_timeout)
                .connect_with(options)
                .await
                .map_err(|e| StorageError::ConnectionFailed(e.to_string()))
        })
        .await?;

        let ping = with_timeout(self.operation_timeout, "pinging database", async {
            sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .map_err(|e| StorageError::ConnectionFailed(e.to_string()))
        })
        .await;
        if let Err(e) = ping {
            pool.close().await;
            return Err(e);
        }

        Ok(pool)
    }

    async fn prepare_schema(&self, pool: &Pool<Sqlite>) -> StorageResult<()> {
        let schema_err = |e: sqlx::Error| StorageError::SchemaFailed(e.to_string());

        with_timeout(self.operation_timeout, "preparing schema", async {
            if !self.restore {
                debug!("dropping previous metrics table");
                sqlx::query("DROP TABLE IF EXISTS metrics")
                    .execute(pool)
                    .await
                    .map_err(schema_err)?;
            }
            sqlx::query(CREATE_TABLE)
                .execute(pool)
                .await
                .map_err(schema_err)?;
            sqlx::query(CREATE_INDEX)
                .execute(pool)
                .await
                .map_err(schema_err)?;
            sqlx::query("SELECT * FROM metrics LIMIT 1")
                .fetch_optional(pool)
                .await
                .map_err(schema_err)?;
            Ok(())
        })
        .await
    }

    async fn load(&self, pool: &Pool<Sqlite>) -> StorageResult<Vec<Metric>> {
        let rows = with_timeout(self.operation_timeout, "reading metrics table", async {
            Ok(
                sqlx::query(r#"SELECT "ID", "MType", "Delta", "Value" FROM metrics"#)
                    .fetch_all(pool)
                    .await?,
            )
        })
        .await?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in rows {
            let payload = MetricPayload {
                id: row.try_get("ID")?,
                kind: row.try_get("MType")?,
                delta: row.try_get("Delta")?,
                value: row.try_get("Value")?,
                hash: None,
            };
            let id = payload.id.clone();
            match Metric::try_from(payload) {
                Ok(metric) => metrics.push(metric),
                Err(e) => warn!("skipping unreadable row {id}: {e}"),
            }
        }
        Ok(metrics)
    }

    async fn try_init(&mut self, dsn: &str) -> StorageResult<()> {
        let pool = self.connect(dsn).await?;

        if let Err(e) = self.prepare_schema(&pool).await {
            pool.close().await;
            return Err(e);
        }

        if self.restore {
            match self.load(&pool).await {
                Ok(snapshot) => {
                    self.memory.restore(snapshot).await;
                }
                Err(e) => warn!("cannot read metrics table, nothing restored: {e}"),
            }
        }

        let sink = Arc::new(DatabaseSink {
            pool,
            flush_gate: Mutex::new(()),
            operation_timeout: self.operation_timeout,
        });
        if !self.store_interval.is_zero() {
            let scheduler =
                FlushScheduler::spawn(self.store_interval, self.memory.clone(), sink.clone());
            *self.scheduler.get_mut() = Some(scheduler);
        }
        self.sink = Some(sink);
        Ok(())
    }
}

#[async_trait]
impl Repository for DatabaseStore {
    #[instrument(skip(self))]
    async fn init(&mut self) -> bool {
        self.lifecycle.set(RepositoryState::Initializing);

        let Some(dsn) = self.dsn.clone().filter(|d| !d.is_empty()) else {
            debug!("no database DSN configured, falling back");
            return self.lifecycle.finish_init(false);
        };

        match self.try_init(&dsn).await {
            Ok(()) => {
                info!("database repository ready");
                self.lifecycle.finish_init(true)
            }
            Err(e) => {
                warn!("database unavailable, falling back: {e}");
                self.lifecycle.finish_init(false)
            }
        }
    }

    async fn get(&self, id: &str) -> StorageResult<Metric> {
        self.memory.get(id).await
    }

    async fn get_all(&self) -> Vec<Metric> {
        self.memory.get_all().await
    }

    async fn set(&self, metric: Metric) -> StorageResult<()> {
        self.memory.set(metric).await
    }

    async fn set_all(&self, metrics: Vec<Metric>) -> StorageResult<()> {
        self.memory.set_all(metrics).await
    }

    async fn flush_db(&self) {
        if !self.store_interval.is_zero() {
            return;
        }
        if let Some(sink) = &self.sink {
            persist(&self.memory, sink.as_ref()).await;
        }
    }

    #[instrument(skip(self))]
    async fn shutdown(&self) {
        if matches!(
            self.lifecycle.get(),
            RepositoryState::ShuttingDown | RepositoryState::Closed
        ) {
            return;
        }
        self.lifecycle.set(RepositoryState::ShuttingDown);

        let scheduler = self.scheduler.lock().await.take();
        match (scheduler, &self.sink) {
            (Some(scheduler), _) => scheduler.shutdown().await,
            (None, Some(sink)) => {
                persist(&self.memory, sink.as_ref()).await;
            }
            (None, None) => {}
        }

        if let Some(sink) = &self.sink {
            sink.pool.close().await;
        }

        info!("database repository closed");
        self.lifecycle.set(RepositoryState::Closed);
    }

    async fn ping(&self) -> StorageResult<()> {
        let sink = self
            .sink
            .as_ref()
            .ok_or(StorageError::Unsupported(self.name()))?;
        with_timeout(self.operation_timeout, "pinging database", async {
            sqlx::query("SELECT 1").execute(&sink.pool).await?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "database"
    }

    fn state(&self) -> RepositoryState {
        self.lifecycle.get()
    }
}

struct DatabaseSink {
    pool: Pool<Sqlite>,
    flush_gate: Mutex<()>,
    operation_timeout: Duration,
}

#[async_trait]
impl SnapshotSink for DatabaseSink {
    fn medium(&self) -> &'static str {
        "database"
    }

    fn flush_gate(&self) -> &Mutex<()> {
        &self.flush_gate
    }

    async fn write_snapshot(&self, snapshot: &[Metric]) -> StorageResult<()> {
        with_timeout(self.operation_timeout, "flushing snapshot to database", async {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM metrics").execute(&mut *tx).await?;
            for metric in snapshot {
                sqlx::query(
                    r#"INSERT INTO metrics ("ID", "MType", "Delta", "Value", "Hash")
                       VALUES (?, ?, ?, ?, '')"#,
                )
                .bind(&metric.id)
                .bind(metric.kind().as_str())
                .bind(metric.delta())
                .bind(metric.gauge_value())
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }
}
