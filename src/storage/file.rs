//! JSON file repository
//!
//! Wraps a [`MemoryStore`] and mirrors it into a single JSON file holding
//! the full metric array. Every flush rewrites the whole file in place
//! (truncate, seek to the start, write); the data set is small enough that
//! incremental updates are not worth it.
//!
//! ## Startup
//!
//! - **restore = true**: the file is opened as-is and its content loaded.
//!   An empty or undecodable file means nothing to restore.
//! - **restore = false**: the file is truncated on open.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::backend::{Lifecycle, Repository, RepositoryState};
use super::error::{StorageError, StorageResult, with_timeout};
use super::flush::{FlushScheduler, SnapshotSink, persist};
use super::memory::MemoryStore;
use crate::config::StorageSettings;
use crate::metric::Metric;

/// Repository persisted to a JSON file
pub struct FileStore {
    path: Option<PathBuf>,
    store_interval: Duration,
    restore: bool,
    operation_timeout: Duration,
    memory: Arc<MemoryStore>,
    sink: Option<Arc<FileSink>>,
    scheduler: Mutex<Option<FlushScheduler>>,
    lifecycle: Lifecycle,
}

impl FileStore {
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            path: settings.store_file.clone(),
            store_interval: settings.store_interval,
            restore: settings.restore,
            operation_timeout: settings.operation_timeout,
            memory: Arc::new(MemoryStore::new()),
            sink: None,
            scheduler: Mutex::new(None),
            lifecycle: Lifecycle::new(),
        }
    }

    async fn open(&self, path: &PathBuf) -> StorageResult<File> {
        let restore = self.restore;
        let path = path.clone();
        with_timeout(self.operation_timeout, "opening store file", async move {
            Ok(OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(!restore)
                .open(&path)
                .await?)
        })
        .await
    }

    /// Read the snapshot from an open file; `None` if there is nothing usable
    async fn load(&self, file: &mut File) -> Option<Vec<Metric>> {
        let read = with_timeout(self.operation_timeout, "reading store file", async {
            let mut content = Vec::new();
            file.seek(SeekFrom::Start(0)).await?;
            file.read_to_end(&mut content).await?;
            Ok(content)
        })
        .await;

        let content = match read {
            Ok(content) => content,
            Err(e) => {
                warn!("cannot read store file, nothing restored: {e}");
                return None;
            }
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            debug!("store file is empty, nothing to restore");
            return None;
        }

        match serde_json::from_slice::<Vec<Metric>>(&content) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!("cannot decode store file, nothing restored: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl Repository for FileStore {
    #[instrument(skip(self), fields(path = ?self.path))]
    async fn init(&mut self) -> bool {
        self.lifecycle.set(RepositoryState::Initializing);

        let Some(path) = self.path.clone().filter(|p| !p.as_os_str().is_empty()) else {
            warn!("no store file configured, falling back");
            return self.lifecycle.finish_init(false);
        };

        let mut file = match self.open(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!("cannot open store file {}, falling back: {e}", path.display());
                return self.lifecycle.finish_init(false);
            }
        };

        if self.restore
            && let Some(snapshot) = self.load(&mut file).await
        {
            self.memory.restore(snapshot).await;
        }

        let sink = Arc::new(FileSink {
            file: Mutex::new(Some(file)),
            flush_gate: Mutex::new(()),
            operation_timeout: self.operation_timeout,
        });

        if !self.store_interval.is_zero() {
            let scheduler =
                FlushScheduler::spawn(self.store_interval, self.memory.clone(), sink.clone());
            *self.scheduler.get_mut() = Some(scheduler);
        }
        self.sink = Some(sink);

        info!("file repository ready at {}", path.display());
        self.lifecycle.finish_init(true)
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
            sink.close().await;
        }

        info!("file repository closed");
        self.lifecycle.set(RepositoryState::Closed);
    }

    async fn ping(&self) -> StorageResult<()> {
        match &self.sink {
            Some(sink) => sink.ping().await,
            None => Err(StorageError::Unsupported(self.name())),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }

    fn state(&self) -> RepositoryState {
        self.lifecycle.get()
    }
}

/// Open store file, shared by the repository and its scheduler
struct FileSink {
    file: Mutex<Option<File>>,
    flush_gate: Mutex<()>,
    operation_timeout: Duration,
}

impl FileSink {
    async fn close(&self) {
        if let Some(mut file) = self.file.lock().await.take()
            && let Err(e) = file.flush().await
        {
            warn!("error closing store file: {e}");
        }
    }

    async fn ping(&self) -> StorageResult<()> {
        let guard = self.file.lock().await;
        let file = guard
            .as_ref()
            .ok_or(StorageError::Unsupported("closed file"))?;
        with_timeout(self.operation_timeout, "probing store file", async {
            file.metadata().await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SnapshotSink for FileSink {
    fn medium(&self) -> &'static str {
        "file"
    }

    fn flush_gate(&self) -> &Mutex<()> {
        &self.flush_gate
    }

    async fn write_snapshot(&self, snapshot: &[Metric]) -> StorageResult<()> {
        let content = serde_json::to_vec(snapshot)?;

        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or(StorageError::Unsupported("closed file"))?;

        with_timeout(self.operation_timeout, "writing store file", async {
            file.set_len(0).await?;
            file.seek(SeekFrom::Start(0)).await?;
            file.write_all(&content).await?;
            file.flush().await?;
            file.sync_data().await?;
            Ok(())
        })
        .await
    }
}
