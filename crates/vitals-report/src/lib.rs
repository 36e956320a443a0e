//! Reporting pipeline: flush metric snapshots to the collector.
//!
//! The [`Reporter`] ticks on the report interval and schedules one flush
//! per tick onto a bounded [`WorkerPool`], so outbound sends never exceed
//! the configured rate limit no matter how many ticks have elapsed. Each
//! flush serializes a snapshot, gzips it, optionally signs it, and
//! delivers it through a [`Sink`] under the retry engine.
//!
//! # Architecture
//!
//! ```text
//! Reporter::run (tick loop)
//!   └── WorkerPool::submit(flush job)     ← blocks on a full queue
//!         └── worker: snapshot → records → json → gzip → sign
//!               └── Sink::send, wrapped in vitals_retry::retry_with
//! ```

pub mod pool;
pub mod reporter;
pub mod sink;

pub use pool::WorkerPool;
pub use reporter::{FlushError, Reporter};
pub use sink::{HttpSink, Sink, SinkError};
