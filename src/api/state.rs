//! API shared state

use std::sync::Arc;

use crate::hash::IntegrityHasher;
use crate::storage::Repository;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Repository picked at startup; owned by `main`, which shuts it down
    pub repository: Arc<dyn Repository>,

    /// Verifies inbound hashes and signs outbound metrics
    pub hasher: IntegrityHasher,
}

impl ApiState {
    pub fn new(repository: Arc<dyn Repository>, hasher: IntegrityHasher) -> Self {
        Self { repository, hasher }
    }
}
