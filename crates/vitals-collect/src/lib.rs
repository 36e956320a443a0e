//! Samplers that feed the metric scope.
//!
//! A [`Sampler`] is one fallible read of an external statistics source
//! that writes its results into the shared [`MetricScope`]. A [`Poller`]
//! owns the timing: it drives one sampler on a fixed tick, stamps the
//! shared liveness heartbeat, and unwinds on the shutdown signal.

pub mod poller;
pub mod process;
pub mod system;

pub use poller::Poller;
pub use process::ProcessStatsSampler;
pub use system::SystemStatsSampler;

use vitals_metrics::MetricScope;

/// Why a sampler could not read its source.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("cannot resolve the current process id: {0}")]
    Pid(&'static str),

    #[error("current process is missing from the process table")]
    ProcessNotFound,
}

/// A fallible read of an external statistics source.
///
/// Implementations write straight into the scope through counter and
/// gauge handles; they never sleep or block on I/O.
pub trait Sampler: Send {
    fn name(&self) -> &'static str;

    fn sample(&mut self, scope: &MetricScope) -> Result<(), SampleError>;
}
