//! In-memory metric primitives for the vitals agent.
//!
//! A [`MetricScope`] is a concurrent registry of named [`Counter`] and
//! [`Gauge`] cells. Samplers write into the scope through shared cell
//! handles; the reporter reads it through a [`MetricSnapshot`] and ships
//! the result as [`MetricRecord`]s.
//!
//! # Architecture
//!
//! ```text
//! MetricScope
//!   ├── counter(name) / gauge(name) → get-or-create a shared cell
//!   └── snapshot() → MetricSnapshot (name set frozen, values live)
//!         └── to_records() → Vec<MetricRecord> for the wire
//! ```

pub mod cell;
pub mod record;
pub mod scope;

pub use cell::{Counter, Gauge};
pub use record::MetricRecord;
pub use scope::{MetricScope, MetricSnapshot};
