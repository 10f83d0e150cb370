//! Metric repositories
//!
//! Every repository keeps the authoritative table in memory and shares the
//! same merge rules. Durable tiers add a snapshot medium on top.
//!
//! ## Backends
//!
//! - **SQLite** (`storage-sqlite` feature): snapshot table, transactional flush
//! - **File**: snapshot as one JSON array
//! - **In-Memory** (fallback): no persistence, always available
//!
//! [`select_repository`] picks the first tier that initializes.
//!
//! ## Usage
//!
//! ```no_run
//! use tallyhub::config::StorageSettings;
//! use tallyhub::storage::select_repository;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let repository = select_repository(&StorageSettings::default()).await;
//!     repository.flush_db().await;
//!     repository.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod fallback;
pub mod file;
mod flush;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{Repository, RepositoryState};
pub use error::{StorageError, StorageResult};
pub use fallback::select_repository;
pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "storage-sqlite")]
pub use sqlite::DatabaseStore;
