//! Atomic metric cells.
//!
//! Both cell kinds are written through shared references from any number
//! of tasks without taking a lock. Cells carry no name of their own; the
//! owning scope maps names to cells.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonically accumulating signed 64-bit counter.
///
/// `inc` is never called with a negative delta by the agent; the cell
/// itself only guarantees that no concurrent update is lost.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically add `delta` to the running total.
    pub fn inc(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current accumulated total.
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Last-write-wins 64-bit floating-point gauge.
///
/// The IEEE-754 bit pattern is stored in an `AtomicU64`, so an update is
/// a single atomic store. Concurrent writers race freely; readers observe
/// whichever store physically landed last, bit-for-bit.
#[derive(Debug, Default)]
pub struct Gauge {
    bits: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored value.
    pub fn update(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Read the stored value back.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}
