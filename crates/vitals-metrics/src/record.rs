//! Wire format for a metrics batch.

use serde::{Deserialize, Serialize};

use crate::scope::MetricSnapshot;

/// One metric as it crosses the wire.
///
/// Counters ship their accumulated total as `delta` (the server folds it
/// in additively), gauges ship their current `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricRecord {
    Counter { id: String, delta: i64 },
    Gauge { id: String, value: f64 },
}

impl MetricRecord {
    pub fn id(&self) -> &str {
        match self {
            MetricRecord::Counter { id, .. } | MetricRecord::Gauge { id, .. } => id,
        }
    }
}

impl MetricSnapshot {
    /// Materialize one record per captured cell.
    ///
    /// Values are read now, not at capture time; the batch is not a
    /// consistent cut across cells. Record order follows map iteration
    /// and is unspecified.
    pub fn to_records(&self) -> Vec<MetricRecord> {
        let mut records = Vec::with_capacity(self.len());
        for (name, cell) in &self.counters {
            records.push(MetricRecord::Counter {
                id: name.clone(),
                delta: cell.value(),
            });
        }
        for (name, cell) in &self.gauges {
            records.push(MetricRecord::Gauge {
                id: name.clone(),
                value: cell.value(),
            });
        }
        records
    }
}
