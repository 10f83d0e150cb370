//! Shared helpers for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tallyhub::{
    IntegrityHasher, Metric,
    api::{ApiState, spawn_server},
    config::StorageSettings,
    storage::{MemoryStore, Repository, select_repository},
};

pub const TEST_KEY: &str = "k1";

/// Fresh, initialized in-memory repository
pub async fn memory_repository() -> Arc<dyn Repository> {
    let mut store = MemoryStore::new();
    assert!(store.init().await);
    Arc::new(store)
}

/// Settings for a file repository that flushes after every update
pub fn file_settings(path: &Path, restore: bool) -> StorageSettings {
    StorageSettings {
        store_file: Some(path.to_path_buf()),
        store_interval: Duration::ZERO,
        restore,
        ..StorageSettings::default()
    }
}

/// Settings for a SQLite repository that flushes after every update
pub fn database_settings(path: &Path, restore: bool) -> StorageSettings {
    StorageSettings {
        database_dsn: Some(format!("sqlite://{}", path.display())),
        store_interval: Duration::ZERO,
        restore,
        ..StorageSettings::default()
    }
}

pub async fn repository_from(settings: &StorageSettings) -> Arc<dyn Repository> {
    select_repository(settings).await
}

/// Serve `repository` on a random port, returning the base URL
pub async fn spawn_test_server(repository: Arc<dyn Repository>, key: Option<&str>) -> String {
    let hasher = key.map_or_else(IntegrityHasher::disabled, IntegrityHasher::new);
    let addr = spawn_server("127.0.0.1:0", ApiState::new(repository, hasher))
        .await
        .unwrap();
    format!("http://{addr}")
}

/// Metric as the server would return it under `key`
pub fn signed(mut metric: Metric, key: &str) -> Metric {
    IntegrityHasher::new(key).sign(&mut metric);
    metric
}
