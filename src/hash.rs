//! Keyed integrity hashing for metric updates
//!
//! Agents attach `HMAC-SHA256(key, "{id}:{kind}:{value}")` to every metric
//! they send, and the server attaches the same hash to metrics it returns.
//! Verification is opt-in: without a configured key every update is
//! accepted, and updates without a hash are accepted as well.

use std::fmt;

use hmac::Mac;
use tracing::trace;

use crate::metric::{HmacSha256, Metric};

/// Signs and verifies metrics with a shared secret
#[derive(Clone, Default)]
pub struct IntegrityHasher {
    key: Vec<u8>,
}

impl IntegrityHasher {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Hasher that never signs and accepts everything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty()
    }

    /// Attach (or clear, without a key) the hash of `metric`
    pub fn sign(&self, metric: &mut Metric) {
        metric.hash = metric.compute_hash(&self.key);
    }

    /// Sign every metric of a snapshot
    pub fn sign_all(&self, metrics: &mut [Metric]) {
        metrics.iter_mut().for_each(|m| self.sign(m));
    }

    /// Check the hash carried by an inbound metric
    pub fn verify(&self, metric: &Metric) -> Result<(), IntegrityError> {
        let Some(hash) = metric.hash.as_deref().filter(|h| !h.is_empty()) else {
            return Ok(());
        };
        if !self.is_enabled() {
            return Ok(());
        }

        let mismatch = || IntegrityError {
            id: metric.id.clone(),
        };

        let received = hex::decode(hash).map_err(|_| mismatch())?;
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| mismatch())?;
        mac.update(metric.canonical().as_bytes());
        mac.verify_slice(&received).map_err(|_| mismatch())?;

        trace!("hash verified for {}", metric.id);
        Ok(())
    }
}

impl fmt::Debug for IntegrityHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityHasher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// An inbound hash did not match the recomputed one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityError {
    pub id: String,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hash mismatch for metric {}", self.id)
    }
}

impl std::error::Error for IntegrityError {}
