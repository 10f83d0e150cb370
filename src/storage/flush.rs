//! Background snapshot flushing for durable repositories
//!
//! Durable repositories never write individual updates. Instead the whole
//! in-memory table is written to the medium, either by a `FlushScheduler`
//! running on a fixed interval or inline when the interval is zero.
//!
//! ## Message Flow
//!
//! ```text
//! interval tick ──► get_all() ──► SnapshotSink::write_snapshot()
//!                      ▲
//! Shutdown ────────────┘ (one last flush, then ack and exit)
//! ```
//!
//! The memory lock is released before the medium is touched: a flush only
//! ever sees a cloned snapshot. Each sink owns a flush gate held from the
//! snapshot until the write completes, so concurrent flushes reach the
//! medium in the order their snapshots were taken.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, instrument, trace, warn};

use super::backend::Repository;
use super::error::StorageResult;
use super::memory::MemoryStore;
use crate::metric::Metric;

/// A durable medium that can hold one full snapshot
#[async_trait]
pub(crate) trait SnapshotSink: Send + Sync + 'static {
    /// Medium name for logs
    fn medium(&self) -> &'static str;

    /// Held across snapshot and write by `persist`
    fn flush_gate(&self) -> &Mutex<()>;

    /// Replace the persisted snapshot with `snapshot`
    async fn write_snapshot(&self, snapshot: &[Metric]) -> StorageResult<()>;
}

/// Write the current table to `sink`, logging failures
///
/// Returns whether the snapshot reached the medium.
pub(crate) async fn persist(memory: &MemoryStore, sink: &dyn SnapshotSink) -> bool {
    let _gate = sink.flush_gate().lock().await;
    let snapshot = memory.get_all().await;
    match sink.write_snapshot(&snapshot).await {
        Ok(()) => {
            trace!("flushed {} metrics to {}", snapshot.len(), sink.medium());
            true
        }
        Err(e) => {
            error!("failed to flush snapshot to {}: {}", sink.medium(), e);
            false
        }
    }
}

enum FlushCommand {
    /// Flush one last time, acknowledge and stop
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Task that periodically flushes a memory store to a sink
pub(crate) struct FlushScheduler {
    sender: mpsc::Sender<FlushCommand>,
    task: JoinHandle<()>,
}

impl FlushScheduler {
    /// Spawn the scheduler; the first flush happens one `period` from now
    pub(crate) fn spawn(
        period: Duration,
        memory: Arc<MemoryStore>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        debug!("starting {} flush scheduler every {:?}", sink.medium(), period);
        let task = tokio::spawn(run(period, memory, sink, receiver));
        Self { sender, task }
    }

    /// Stop the scheduler after a final flush
    pub(crate) async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(FlushCommand::Shutdown { respond_to: tx })
            .await
            .is_err()
        {
            warn!("flush scheduler already stopped");
            return;
        }
        let _ = rx.await;
        if let Err(e) = self.task.await {
            error!("flush scheduler task failed: {e}");
        }
    }
}

#[instrument(skip_all, fields(medium = sink.medium()))]
async fn run(
    period: Duration,
    memory: Arc<MemoryStore>,
    sink: Arc<dyn SnapshotSink>,
    mut commands: mpsc::Receiver<FlushCommand>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut flush_count: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if persist(&memory, sink.as_ref()).await {
                    flush_count += 1;
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(FlushCommand::Shutdown { respond_to }) => {
                        debug!("final flush before shutdown ({flush_count} periodic flushes)");
                        persist(&memory, sink.as_ref()).await;
                        let _ = respond_to.send(());
                    }
                    None => {
                        warn!("flush command channel closed, flushing and stopping");
                        persist(&memory, sink.as_ref()).await;
                    }
                }
                break;
            }
        }
    }

    debug!("flush scheduler stopped");
}
