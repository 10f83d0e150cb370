//! Repository trait definition
//!
//! This module defines the core `Repository` trait that all metric
//! stores implement, plus the lifecycle state they share.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;

use super::error::StorageResult;
use crate::metric::Metric;

/// Lifecycle of a repository instance
///
/// ```text
/// Uninitialized -> Initializing -> Operational -> ShuttingDown -> Closed
///                               \-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RepositoryState {
    Uninitialized = 0,
    Initializing = 1,
    Operational = 2,
    Failed = 3,
    ShuttingDown = 4,
    Closed = 5,
}

impl RepositoryState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RepositoryState::Initializing,
            2 => RepositoryState::Operational,
            3 => RepositoryState::Failed,
            4 => RepositoryState::ShuttingDown,
            5 => RepositoryState::Closed,
            _ => RepositoryState::Uninitialized,
        }
    }
}

/// Shared, lock-free holder for a [`RepositoryState`]
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(RepositoryState::Uninitialized as u8))
    }

    pub(crate) fn get(&self) -> RepositoryState {
        RepositoryState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: RepositoryState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Record the outcome of `init` and pass it through
    pub(crate) fn finish_init(&self, ok: bool) -> bool {
        self.set(if ok {
            RepositoryState::Operational
        } else {
            RepositoryState::Failed
        });
        ok
    }
}

/// A metric register with upsert semantics
///
/// All repositories (memory, file, database) implement this trait. Reads
/// and merges always happen in memory; durable backends only add a
/// snapshot medium on top.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: one instance is shared by every
/// request handler for the lifetime of the process.
///
/// ## Error Handling
///
/// `set` and `get` surface caller errors. Failures of the durable medium
/// during `flush_db` and `shutdown` are logged by the implementation and
/// never returned, since the in-memory table stays authoritative.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Allocate resources, restore if configured, start the flush scheduler
    ///
    /// Returns `false` on any unrecoverable setup failure; the caller is
    /// expected to fall back to the next backend.
    async fn init(&mut self) -> bool;

    /// Copy of the metric stored under `id`
    async fn get(&self, id: &str) -> StorageResult<Metric>;

    /// Copy of every metric, in insertion order
    async fn get_all(&self) -> Vec<Metric>;

    /// Create the metric if its id is unknown, merge it otherwise
    async fn set(&self, metric: Metric) -> StorageResult<()>;

    /// Apply a batch with `set` semantics, all or nothing
    ///
    /// The first rejected metric aborts the batch and leaves the table as it
    /// was before the call.
    async fn set_all(&self, metrics: Vec<Metric>) -> StorageResult<()>;

    /// Caller-driven durability hook, called after every update request
    ///
    /// Writes the snapshot inline when the backend runs without a flush
    /// interval. No-op otherwise, and for memory-only repositories.
    async fn flush_db(&self);

    /// Final flush, then release durable-medium handles
    async fn shutdown(&self);

    /// Liveness probe against the durable medium
    async fn ping(&self) -> StorageResult<()>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Current lifecycle state
    fn state(&self) -> RepositoryState;
}
