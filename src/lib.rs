pub mod agent;
pub mod api;
pub mod config;
pub mod hash;
pub mod metric;
pub mod storage;

pub use hash::{IntegrityError, IntegrityHasher};
pub use metric::{Metric, MetricError, MetricKind, MetricPayload, MetricValue};
