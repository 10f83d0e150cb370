//! In-memory repository (no persistence)
//!
//! `MemoryStore` is the single source of truth for every backend: the file
//! and database repositories wrap one and only add a snapshot medium.
//!
//! The table is a plain `Vec` in insertion order behind one read/write
//! lock. Lookups are linear; the table holds one entry per process metric
//! name, so it stays small.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use super::backend::{Lifecycle, Repository, RepositoryState};
use super::error::{StorageError, StorageResult};
use crate::metric::Metric;

/// In-memory metric table
pub struct MemoryStore {
    metrics: RwLock<Vec<Metric>>,
    lifecycle: Lifecycle,
}

impl MemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(Vec::new()),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Number of stored metrics
    pub async fn len(&self) -> usize {
        self.metrics.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.metrics.read().await.is_empty()
    }

    /// Load a restored snapshot, returning how many entries were accepted
    pub(crate) async fn restore(&self, snapshot: Vec<Metric>) -> usize {
        let total = snapshot.len();
        let mut restored = 0;
        for metric in snapshot {
            let id = metric.id.clone();
            match self.set(metric).await {
                Ok(()) => restored += 1,
                Err(e) => warn!("skipping restored metric {id}: {e}"),
            }
        }
        debug!("restored {restored}/{total} metrics");
        restored
    }
}

/// Find-or-create `metric` in `table`, merging into an existing entry
fn upsert(table: &mut Vec<Metric>, mut metric: Metric) -> StorageResult<()> {
    // hashes are derived on the way out, never stored
    metric.hash = None;

    match table.iter_mut().find(|m| m.id == metric.id) {
        Some(existing) => {
            existing.merge(&metric)?;
            trace!("merged {} -> {}", existing.id, existing.render());
        }
        None => {
            trace!("created {} {}", metric.kind(), metric.id);
            table.push(metric);
        }
    }
    Ok(())
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn init(&mut self) -> bool {
        self.lifecycle.set(RepositoryState::Initializing);
        self.metrics.get_mut().clear();
        self.lifecycle.finish_init(true)
    }

    async fn get(&self, id: &str) -> StorageResult<Metric> {
        self.metrics
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn get_all(&self) -> Vec<Metric> {
        self.metrics.read().await.clone()
    }

    async fn set(&self, metric: Metric) -> StorageResult<()> {
        upsert(&mut *self.metrics.write().await, metric)
    }

    async fn set_all(&self, batch: Vec<Metric>) -> StorageResult<()> {
        let mut metrics = self.metrics.write().await;
        // merge into a copy so a rejected entry leaves nothing behind
        let mut staged = metrics.clone();
        for metric in batch {
            upsert(&mut staged, metric)?;
        }
        *metrics = staged;
        Ok(())
    }

    async fn flush_db(&self) {}

    async fn shutdown(&self) {
        debug!("closing in-memory repository (no-op)");
        self.lifecycle.set(RepositoryState::Closed);
    }

    async fn ping(&self) -> StorageResult<()> {
        Err(StorageError::Unsupported(self.name()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn state(&self) -> RepositoryState {
        self.lifecycle.get()
    }
}
