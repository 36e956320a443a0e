//! Concurrent registry of named metric cells.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cell::{Counter, Gauge};

/// Registry of named [`Counter`] and [`Gauge`] cells.
///
/// Cells are created lazily on first access and live for the process
/// lifetime; nothing is ever removed. The two namespaces are
/// independent: a counter and a gauge may share a name.
///
/// Each map sits behind its own mutex, held only for the duration of a
/// lookup, insert, or copy. Cell updates themselves are lock-free.
#[derive(Debug, Default)]
pub struct MetricScope {
    counters: Mutex<HashMap<String, Arc<Counter>>>,
    gauges: Mutex<HashMap<String, Arc<Gauge>>>,
}

impl MetricScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter registered under `name`, created on first use.
    ///
    /// Concurrent callers racing on a never-seen name converge on the
    /// same cell.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        let mut counters = self.counters.lock().expect("counter registry poisoned");
        counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::new()))
            .clone()
    }

    /// The gauge registered under `name`, created on first use.
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        let mut gauges = self.gauges.lock().expect("gauge registry poisoned");
        gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Gauge::new()))
            .clone()
    }

    /// Shallow-copy both maps for one flush cycle.
    ///
    /// The copies are taken under two separate critical sections; there
    /// is no atomicity across the counter and gauge namespaces.
    pub fn snapshot(&self) -> MetricSnapshot {
        let counters = self
            .counters
            .lock()
            .expect("counter registry poisoned")
            .clone();
        let gauges = self.gauges.lock().expect("gauge registry poisoned").clone();
        MetricSnapshot { counters, gauges }
    }
}

/// View of a scope captured for one flush cycle.
///
/// The *set* of names is frozen at capture time. The snapshot holds the
/// shared cells, not value copies, so values read through it reflect
/// writes that may have landed after capture. Consumers must tolerate
/// that skew.
#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub(crate) counters: HashMap<String, Arc<Counter>>,
    pub(crate) gauges: HashMap<String, Arc<Gauge>>,
}

impl MetricSnapshot {
    /// Number of cells captured across both kinds.
    pub fn len(&self) -> usize {
        self.counters.len() + self.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_handles_share_one_cell() {
        let scope = MetricScope::new();
        scope.counter("requests").inc(1);
        scope.counter("requests").inc(2);
        assert_eq!(scope.counter("requests").value(), 3);
    }

    #[test]
    fn counter_and_gauge_namespaces_are_independent() {
        let scope = MetricScope::new();
        scope.counter("load").inc(7);
        scope.gauge("load").update(0.5);

        assert_eq!(scope.counter("load").value(), 7);
        assert_eq!(scope.gauge("load").value(), 0.5);
    }

    #[test]
    fn concurrent_get_or_create_converges_on_one_cell() {
        let scope = Arc::new(MetricScope::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scope = scope.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        scope.counter("shared").inc(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(scope.counter("shared").value(), 8000);
    }

    #[test]
    fn snapshot_freezes_the_name_set() {
        let scope = MetricScope::new();
        scope.counter("before").inc(1);

        let snapshot = scope.snapshot();
        scope.counter("after").inc(1);

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.counters.contains_key("before"));
        assert!(!snapshot.counters.contains_key("after"));
    }

    #[test]
    fn snapshot_values_stay_live() {
        let scope = MetricScope::new();
        let counter = scope.counter("polls");
        counter.inc(1);

        let snapshot = scope.snapshot();
        counter.inc(4);

        // The snapshot shares the cell, so the later write is visible.
        assert_eq!(snapshot.counters["polls"].value(), 5);
    }

    #[test]
    fn empty_scope_snapshot_is_empty() {
        assert!(MetricScope::new().snapshot().is_empty());
    }
}
