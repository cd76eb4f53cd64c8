//! Metric Model
//!
//! Two metric kinds exist. A **gauge** holds the latest `f64` sample and is
//! replaced on every write. A **counter** holds an `i64` total and every
//! write adds a delta to it. Gauges and counters live in separate
//! namespaces, so the same name may exist in both.
//!
//! [`MetricRecord`] is the wire form shared by every transport. It is only
//! trusted after [`MetricRecord::validate`] turns it into a typed
//! [`Metric`], which enforces "exactly one of `value`/`delta`, matching the
//! kind".

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{MetrixError, Result};

/// Metric kind tag, lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
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
    type Err = MetrixError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetrixError::Validation(format!("unknown metric type {other:?}"))),
        }
    }
}

/// A typed metric payload.
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

    /// Parses a textual value (the last segment of `/update/{kind}/{name}/{value}`).
    ///
    /// Counters take a signed 64-bit integer, gauges a finite float.
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self> {
        match kind {
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|e| MetrixError::Validation(format!("invalid counter delta {raw:?}: {e}"))),
            MetricKind::Gauge => {
                let value = raw
                    .parse::<f64>()
                    .map_err(|e| MetrixError::Validation(format!("invalid gauge value {raw:?}: {e}")))?;
                if !value.is_finite() {
                    return Err(MetrixError::Validation(format!("gauge value {raw:?} is not finite")));
                }
                Ok(MetricValue::Gauge(value))
            }
        }
    }
}

/// Plain-text rendering used by `GET /value/{kind}/{name}`: counters as
/// integers, gauges as the shortest decimal that round-trips.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(d) => write!(f, "{d}"),
        }
    }
}

/// A validated metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// Wire record `{id, type, delta?, value?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRecord {
    /// A payload-less record, as sent to `POST /value/` and `GetValue`.
    pub fn query(kind: MetricKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            delta: None,
            value: None,
        }
    }

    /// Checks the record invariant and produces a typed [`Metric`].
    pub fn validate(&self) -> Result<Metric> {
        if self.id.is_empty() {
            return Err(MetrixError::Validation("metric id is empty".into()));
        }
        let value = match (self.kind, self.delta, self.value) {
            (MetricKind::Counter, Some(delta), None) => MetricValue::Counter(delta),
            (MetricKind::Gauge, None, Some(value)) if value.is_finite() => MetricValue::Gauge(value),
            (MetricKind::Gauge, None, Some(_)) => {
                return Err(MetrixError::Validation(format!("gauge {:?} is not finite", self.id)))
            }
            (MetricKind::Counter, _, _) => {
                return Err(MetrixError::Validation(format!(
                    "counter {:?} must carry a delta and no value",
                    self.id
                )))
            }
            (MetricKind::Gauge, _, _) => {
                return Err(MetrixError::Validation(format!(
                    "gauge {:?} must carry a value and no delta",
                    self.id
                )))
            }
        };
        Ok(Metric {
            id: self.id.clone(),
            value,
        })
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Counter(d) => (Some(d), None),
            MetricValue::Gauge(v) => (None, Some(v)),
        };
        Self {
            id: metric.id,
            kind: metric.value.kind(),
            delta,
            value,
        }
    }
}

/// Batch acknowledgement; an empty `error` means success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub error: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

/// Encrypted batch carried by the `CryptUpdates` RPC method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptPayload {
    /// Base64 of the concatenated RSA blocks
    pub cryptbuff: String,
}

impl CryptPayload {
    pub fn seal(ciphertext: &[u8]) -> Self {
        Self {
            cryptbuff: STANDARD.encode(ciphertext),
        }
    }

    pub fn ciphertext(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.cryptbuff)
            .map_err(|e| MetrixError::Validation(format!("cryptbuff is not base64: {e}")))
    }
}
