/*!
 * Metric Record
 * Flat JSON shape used for snapshot lines and the delivery wire body
 */

use super::{Metric, MetricKind, MetricValue};
use crate::core::errors::MetricError;
use serde::{Deserialize, Serialize};

/// Serialized metric: `{"id": .., "type": "gauge"|"counter", "delta"?: .., "value"?: ..}`
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

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        let (kind, delta, value) = match metric.value {
            MetricValue::Gauge(v) => (MetricKind::Gauge, None, Some(v)),
            MetricValue::Counter(d) => (MetricKind::Counter, Some(d), None),
        };
        Self {
            id: metric.name,
            kind,
            delta,
            value,
        }
    }
}

impl TryFrom<MetricRecord> for Metric {
    type Error = MetricError;

    fn try_from(record: MetricRecord) -> Result<Self, Self::Error> {
        let value = match record.kind {
            MetricKind::Gauge => record.value.map(MetricValue::Gauge).ok_or_else(|| {
                MetricError::MissingValue {
                    kind: MetricKind::Gauge,
                    name: record.id.clone(),
                    field: "value",
                }
            })?,
            MetricKind::Counter => record.delta.map(MetricValue::Counter).ok_or_else(|| {
                MetricError::MissingValue {
                    kind: MetricKind::Counter,
                    name: record.id.clone(),
                    field: "delta",
                }
            })?,
        };
        let metric = Metric {
            name: record.id,
            value,
        };
        metric.validate()?;
        Ok(metric)
    }
}
