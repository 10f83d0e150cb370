//! Metric data model
//!
//! A [`Metric`] is the only entity the server stores. It has an identity,
//! a kind and a payload whose type is fixed by the kind:
//!
//! - **Gauge**: a floating point snapshot, the last write wins
//! - **Counter**: a signed accumulation, every update adds its delta
//!
//! The payload is a tagged [`MetricValue`], so a gauge can never carry a
//! delta (and vice versa). The optional-field shape only exists on the wire,
//! in [`MetricPayload`], and is validated when converted into a [`Metric`].
//!
//! ## Wire format
//!
//! ```json
//! {"id": "PollCount", "type": "counter", "delta": 5, "hash": "..."}
//! {"id": "Alloc", "type": "gauge", "value": 1024.5}
//! ```
//!
//! Absent payload fields are omitted, never serialized as `null` or `0`.

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// Result type alias for metric operations
pub type MetricResult<T> = Result<T, MetricError>;

/// Kind of a metric, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetricError::InvalidKind(other.to_string())),
        }
    }
}

/// Payload of a metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parse the textual value of a raw `/update/{kind}/{id}/{value}` request
    pub fn parse(kind: MetricKind, raw: &str) -> MetricResult<Self> {
        match kind {
            MetricKind::Gauge => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Gauge),
            MetricKind::Counter => raw.parse::<i64>().ok().map(MetricValue::Counter),
        }
        .ok_or_else(|| MetricError::InvalidValue(format!("{raw:?} is not a valid {kind} value")))
    }

    fn zero(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Gauge => MetricValue::Gauge(0.0),
            MetricKind::Counter => MetricValue::Counter(0),
        }
    }
}

/// A single named metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricPayload", into = "MetricPayload")]
pub struct Metric {
    /// Unique name, immutable after creation
    pub id: String,

    /// Typed payload (the kind is derived from it)
    pub value: MetricValue,

    /// Integrity hash, derived from the other fields; not authoritative
    pub hash: Option<String>,
}

impl Metric {
    /// Create a zeroed metric from a textual kind
    pub fn new(id: impl Into<String>, kind: &str) -> MetricResult<Self> {
        Ok(Self::with_kind(id, kind.parse()?))
    }

    /// Create a zeroed metric of the given kind
    pub fn with_kind(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::zero(kind),
            hash: None,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
            hash: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
            hash: None,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Delta of a counter, `None` for gauges
    pub fn delta(&self) -> Option<i64> {
        match self.value {
            MetricValue::Counter(delta) => Some(delta),
            MetricValue::Gauge(_) => None,
        }
    }

    /// Value of a gauge, `None` for counters
    pub fn gauge_value(&self) -> Option<f64> {
        match self.value {
            MetricValue::Gauge(value) => Some(value),
            MetricValue::Counter(_) => None,
        }
    }

    /// Replace the payload, keeping the kind
    pub fn set(&mut self, payload: MetricValue) -> MetricResult<()> {
        if payload.kind() != self.kind() {
            return Err(MetricError::TypeMismatch {
                expected: self.kind(),
                found: payload.kind(),
            });
        }
        self.value = payload;
        Ok(())
    }

    /// Fold an incoming update into this metric
    ///
    /// Counters add the incoming delta, gauges take the incoming value.
    pub fn merge(&mut self, incoming: &Metric) -> MetricResult<()> {
        let id = &self.id;
        match (&mut self.value, incoming.value) {
            (MetricValue::Counter(total), MetricValue::Counter(delta)) => {
                *total = total
                    .checked_add(delta)
                    .ok_or_else(|| MetricError::CounterOverflow(id.clone()))?;
            }
            (MetricValue::Gauge(current), MetricValue::Gauge(value)) => {
                *current = value;
            }
            (stored, _) => {
                return Err(MetricError::KindMismatch {
                    id: id.clone(),
                    stored: stored.kind(),
                    incoming: incoming.kind(),
                });
            }
        }
        Ok(())
    }

    /// Canonical string covered by the integrity hash
    pub fn canonical(&self) -> String {
        match self.value {
            MetricValue::Counter(delta) => format!("{}:counter:{}", self.id, delta),
            MetricValue::Gauge(value) => format!("{}:gauge:{:.6}", self.id, value),
        }
    }

    /// Hex HMAC-SHA256 of [`Metric::canonical`], `None` if `key` is empty
    pub fn compute_hash(&self, key: &[u8]) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(self.canonical().as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Text form used by the raw protocol and the HTML index
    pub fn render(&self) -> String {
        match self.value {
            MetricValue::Counter(delta) => delta.to_string(),
            MetricValue::Gauge(value) => format!("{value:.3}"),
        }
    }
}

/// Wire representation of a metric, as sent by agents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl TryFrom<MetricPayload> for Metric {
    type Error = MetricError;

    fn try_from(payload: MetricPayload) -> Result<Self, Self::Error> {
        if payload.id.is_empty() {
            return Err(MetricError::InvalidValue("metric id is empty".to_string()));
        }

        let kind: MetricKind = payload.kind.parse()?;
        let value = match (kind, payload.delta, payload.value) {
            (MetricKind::Counter, Some(delta), _) => MetricValue::Counter(delta),
            (MetricKind::Gauge, _, Some(value)) if value.is_finite() => MetricValue::Gauge(value),
            (MetricKind::Gauge, _, Some(value)) => {
                return Err(MetricError::InvalidValue(format!(
                    "{value} is not a finite gauge value"
                )));
            }
            (MetricKind::Counter, None, Some(_)) => {
                return Err(MetricError::TypeMismatch {
                    expected: MetricKind::Counter,
                    found: MetricKind::Gauge,
                });
            }
            (MetricKind::Gauge, Some(_), None) => {
                return Err(MetricError::TypeMismatch {
                    expected: MetricKind::Gauge,
                    found: MetricKind::Counter,
                });
            }
            (_, None, None) => return Err(MetricError::EmptyPayload(payload.id)),
        };

        Ok(Metric {
            id: payload.id,
            value,
            hash: payload.hash.filter(|h| !h.is_empty()),
        })
    }
}

impl From<Metric> for MetricPayload {
    fn from(metric: Metric) -> Self {
        let kind = metric.kind().to_string();
        MetricPayload {
            id: metric.id,
            kind,
            delta: match metric.value {
                MetricValue::Counter(delta) => Some(delta),
                MetricValue::Gauge(_) => None,
            },
            value: match metric.value {
                MetricValue::Gauge(value) => Some(value),
                MetricValue::Counter(_) => None,
            },
            hash: metric.hash,
        }
    }
}

/// Errors raised while building or merging metrics
#[derive(Debug, Clone, PartialEq)]
pub enum MetricError {
    /// Kind is neither `gauge` nor `counter`
    InvalidKind(String),

    /// Value could not be parsed or is out of range
    InvalidValue(String),

    /// Payload type disagrees with the metric kind
    TypeMismatch {
        expected: MetricKind,
        found: MetricKind,
    },

    /// Update kind disagrees with the stored kind for this id
    KindMismatch {
        id: String,
        stored: MetricKind,
        incoming: MetricKind,
    },

    /// Update carries neither a value nor a delta
    EmptyPayload(String),

    /// Counter accumulation left the i64 range
    CounterOverflow(String),
}

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricError::InvalidKind(kind) => write!(f, "invalid metric kind: {kind:?}"),
            MetricError::InvalidValue(msg) => write!(f, "invalid metric value: {msg}"),
            MetricError::TypeMismatch { expected, found } => {
                write!(f, "payload type mismatch: expected {expected}, found {found}")
            }
            MetricError::KindMismatch {
                id,
                stored,
                incoming,
            } => write!(
                f,
                "metric {id} is a {stored}, refusing {incoming} update"
            ),
            MetricError::EmptyPayload(id) => {
                write!(f, "metric {id} carries neither value nor delta")
            }
            MetricError::CounterOverflow(id) => write!(f, "counter {id} overflowed"),
        }
    }
}

impl std::error::Error for MetricError {}
