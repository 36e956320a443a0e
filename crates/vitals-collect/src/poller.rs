//! The periodic poll loop shared by all samplers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use vitals_metrics::MetricScope;

use crate::{SampleError, Sampler};

/// Drives one [`Sampler`] on a fixed tick until shutdown.
///
/// Every tick bumps the shared `PollCount` counter and writes a fresh
/// pseudo-random `RandomValue` gauge before sampling, so a stuck source
/// is still distinguishable from a stuck loop on the collector side.
pub struct Poller<S> {
    sampler: S,
    scope: Arc<MetricScope>,
    interval: Duration,
}

impl<S: Sampler> Poller<S> {
    pub fn new(sampler: S, scope: Arc<MetricScope>, interval: Duration) -> Self {
        Self {
            sampler,
            scope,
            interval,
        }
    }

    /// Run until the sampler fails or the shutdown signal fires.
    ///
    /// A sampler error is fatal to this poller and propagates to the
    /// supervisor; an observed shutdown is a clean `Ok` exit. The
    /// signal is checked at the top of every iteration and raced
    /// against the tick sleep.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SampleError> {
        let poll_count = self.scope.counter("PollCount");
        let random_value = self.scope.gauge("RandomValue");

        info!(
            sampler = self.sampler.name(),
            interval = ?self.interval,
            "poller started"
        );

        loop {
            if *shutdown.borrow() {
                info!(sampler = self.sampler.name(), "poller shutting down");
                return Ok(());
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    info!(sampler = self.sampler.name(), "poller shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            poll_count.inc(1);
            random_value.update(fastrand::f64() * 100.0);

            if let Err(e) = self.sampler.sample(&self.scope) {
                error!(sampler = self.sampler.name(), error = %e, "sampling failed");
                return Err(e);
            }
            debug!(sampler = self.sampler.name(), "sampled");
        }
    }
}
