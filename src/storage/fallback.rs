//! Backend selection
//!
//! Tries each tier in order of durability and keeps the first one whose
//! `init` succeeds. The memory tier cannot fail, so selection always
//! yields a repository. The choice is final for the process lifetime.

use std::sync::Arc;

use tracing::{info, warn};

use super::backend::Repository;
use super::file::FileStore;
use super::memory::MemoryStore;
#[cfg(feature = "storage-sqlite")]
use super::sqlite::DatabaseStore;
use crate::config::StorageSettings;

/// Pick the most durable repository that initializes
pub async fn select_repository(settings: &StorageSettings) -> Arc<dyn Repository> {
    #[cfg(feature = "storage-sqlite")]
    if settings.database_dsn.is_some() {
        let mut database = DatabaseStore::new(settings);
        if database.init().await {
            info!("using database repository");
            return Arc::new(database);
        }
        warn!("database repository failed to initialize, trying file");
    }

    if settings.store_file.is_some() {
        let mut file = FileStore::new(settings);
        if file.init().await {
            info!("using file repository");
            return Arc::new(file);
        }
        warn!("file repository failed to initialize, using memory");
    }

    let mut memory = MemoryStore::new();
    memory.init().await;
    info!("using in-memory repository, metrics will not survive a restart");
    Arc::new(memory)
}
