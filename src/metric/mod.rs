/*!
 * Metric Data Model
 * The unit exchanged between samplers, the reporter, sinks and storage
 */

mod record;

pub use record::MetricRecord;

use crate::core::errors::MetricError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric kind; each kind owns a separate namespace of names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Last write wins
    Gauge,
    /// Writes accumulate
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

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetricError::UnknownKind(other.to_string())),
        }
    }
}

/// Typed metric value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    /// Delta to add to the stored total
    Counter(i64),
}

impl MetricValue {
    #[inline]
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

/// A named measurement
///
/// Metrics travel by value: samplers create them, the merger and reporter
/// move or copy them into batches, storage merges them into its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricRecord", into = "MetricRecord")]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(delta),
        }
    }

    #[inline]
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Reject metrics no backend may accept
    pub fn validate(&self) -> Result<(), MetricError> {
        if self.name.is_empty() {
            return Err(MetricError::EmptyName);
        }
        if let MetricValue::Gauge(v) = self.value {
            if !v.is_finite() {
                return Err(MetricError::NonFinite {
                    name: self.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Value rendered without the name, shortest float form for gauges
    pub fn value_string(&self) -> String {
        match self.value {
            MetricValue::Gauge(v) => v.to_string(),
            MetricValue::Counter(d) => d.to_string(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type: {}, name: {}, value: {}",
            self.kind(),
            self.name,
            self.value_string()
        )
    }
}
