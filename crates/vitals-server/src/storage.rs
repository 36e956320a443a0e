//! In-memory metric store.

use std::collections::HashMap;

use tokio::sync::RwLock;

use vitals_metrics::MetricRecord;

/// Current value of one stored metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(i64),
    Gauge(f64),
}

/// Accumulates ingested records: counter deltas add up, gauge values
/// replace whatever was there.
#[derive(Debug, Default)]
pub struct MetricStore {
    counters: RwLock<HashMap<String, i64>>,
    gauges: RwLock<HashMap<String, f64>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the store.
    pub async fn apply(&self, record: &MetricRecord) {
        match record {
            MetricRecord::Counter { id, delta } => {
                let mut counters = self.counters.write().await;
                *counters.entry(id.clone()).or_insert(0) += delta;
            }
            MetricRecord::Gauge { id, value } => {
                self.gauges.write().await.insert(id.clone(), *value);
            }
        }
    }

    pub async fn counter(&self, name: &str) -> Option<i64> {
        self.counters.read().await.get(name).copied()
    }

    pub async fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.read().await.get(name).copied()
    }

    /// Every stored metric, counters first, sorted by name within each
    /// kind.
    pub async fn list(&self) -> Vec<(String, MetricValue)> {
        let mut out = Vec::new();

        let counters = self.counters.read().await;
        let mut names: Vec<_> = counters.keys().cloned().collect();
        names.sort();
        for name in names {
            out.push((name.clone(), MetricValue::Counter(counters[&name])));
        }
        drop(counters);

        let gauges = self.gauges.read().await;
        let mut names: Vec<_> = gauges.keys().cloned().collect();
        names.sort();
        for name in names {
            out.push((name.clone(), MetricValue::Gauge(gauges[&name])));
        }
        out
    }
}
