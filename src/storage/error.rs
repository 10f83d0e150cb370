//! Error types for repository operations

use std::fmt;
use std::time::Duration;

use crate::metric::MetricError;

/// Result type alias for repository operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during repository operations
#[derive(Debug)]
pub enum StorageError {
    /// No metric is stored under this id
    NotFound(String),

    /// The update was rejected by the metric model
    Metric(MetricError),

    /// Database connection failed
    ConnectionFailed(String),

    /// Database query failed
    QueryFailed(String),

    /// Schema creation failed
    SchemaFailed(String),

    /// Invalid configuration
    InvalidConfig(String),

    /// Snapshot serialization/deserialization error
    SerializationError(String),

    /// A durable-medium operation exceeded the operation timeout
    Timeout(&'static str),

    /// I/O error (file access, etc.)
    IoError(std::io::Error),

    /// The backend has no durable medium for this operation
    Unsupported(&'static str),
}

impl StorageError {
    /// Whether the error was caused by the caller's input
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Metric(_))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(id) => write!(f, "metric {id} not found"),
            StorageError::Metric(err) => write!(f, "{err}"),
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to database: {}", msg)
            }
            StorageError::QueryFailed(msg) => write!(f, "database query failed: {}", msg),
            StorageError::SchemaFailed(msg) => write!(f, "database schema setup failed: {}", msg),
            StorageError::InvalidConfig(msg) => write!(f, "invalid storage configuration: {}", msg),
            StorageError::SerializationError(msg) => {
                write!(f, "snapshot serialization error: {}", msg)
            }
            StorageError::Timeout(op) => write!(f, "{op} timed out"),
            StorageError::IoError(err) => write!(f, "I/O error: {}", err),
            StorageError::Unsupported(backend) => {
                write!(f, "{backend} repository has no durable medium")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            StorageError::Metric(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<MetricError> for StorageError {
    fn from(err: MetricError) -> Self {
        StorageError::Metric(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::IoError(io_err),
            sqlx::Error::RowNotFound => StorageError::QueryFailed("no rows found".to_string()),
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Bound a durable-medium operation by `limit`
pub(crate) async fn with_timeout<T, F>(
    limit: Duration,
    operation: &'static str,
    fut: F,
) -> StorageResult<T>
where
    F: std::future::Future<Output = StorageResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StorageError::Timeout(operation))?
}
