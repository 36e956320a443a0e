//! Retry with backoff for fallible async operations.
//!
//! A [`Backoff`] decides how long to wait between attempts and when to
//! give up. [`retry_with`] drives an operation under a backoff while
//! racing every wait against a shutdown signal, so a retrying task never
//! outlives its supervisor.
//!
//! Whether a failure is worth retrying is decided by the caller per
//! attempt through [`Outcome`], not inferred from the error type: the
//! same transport error can be retryable for one endpoint and fatal for
//! another.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

/// Stateful retry-delay policy.
pub trait Backoff {
    /// Delay before the next attempt, or `None` to stop retrying.
    ///
    /// Once `None` is returned, every later call must return `None` too.
    fn next(&mut self) -> Option<Duration>;
}

impl<B: Backoff + ?Sized> Backoff for Box<B> {
    fn next(&mut self) -> Option<Duration> {
        (**self).next()
    }
}

/// Linearly growing delay: base, base+step, base+2*step, ...
///
/// Never stops on its own; wrap it in [`MaxRetries`] to bound it.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    next: Duration,
    step: Duration,
}

impl LinearBackoff {
    pub fn new(base: Duration, step: Duration) -> Self {
        Self { next: base, step }
    }
}

impl Backoff for LinearBackoff {
    fn next(&mut self) -> Option<Duration> {
        let delay = self.next;
        self.next += self.step;
        Some(delay)
    }
}

/// Caps an inner backoff at a fixed number of granted delays.
#[derive(Debug, Clone)]
pub struct MaxRetries<B> {
    inner: B,
    left: u32,
}

impl<B> MaxRetries<B> {
    pub fn new(max: u32, inner: B) -> Self {
        Self { inner, left: max }
    }
}

impl<B: Backoff> Backoff for MaxRetries<B> {
    fn next(&mut self) -> Option<Duration> {
        if self.left == 0 {
            return None;
        }
        self.left -= 1;
        self.inner.next()
    }
}

/// The policy used for flush sends: three retries over a linear ramp,
/// waiting 1s, 3s, 5s.
pub fn default_backoff() -> MaxRetries<LinearBackoff> {
    MaxRetries::new(
        3,
        LinearBackoff::new(Duration::from_secs(1), Duration::from_secs(2)),
    )
}

/// A policy that never grants a retry: the first failure is final.
pub fn no_retries() -> MaxRetries<LinearBackoff> {
    MaxRetries::new(0, LinearBackoff::new(Duration::ZERO, Duration::ZERO))
}

/// Classification of one attempt, decided at the call site.
#[derive(Debug)]
pub enum Outcome<T, E> {
    Success(T),
    /// Worth another attempt if the backoff still grants one.
    Retryable(E),
    /// Not worth retrying; returned to the caller immediately.
    Fatal(E),
}

/// Terminal result of a retried operation that did not succeed.
#[derive(Debug, Error, PartialEq)]
pub enum RetryError<E> {
    /// The last underlying error, after a fatal attempt or once the
    /// backoff stopped granting delays.
    #[error("{0}")]
    Exhausted(E),
    /// The shutdown signal fired before the operation could succeed.
    #[error("cancelled while retrying")]
    Cancelled,
}

/// Drive `op` until it succeeds, fails fatally, exhausts `backoff`, or
/// the shutdown signal fires.
///
/// The signal is checked before the first attempt and raced against
/// every backoff wait; a shutdown observed mid-wait aborts immediately
/// instead of sleeping out the delay.
pub async fn retry_with<T, E, B, F, Fut>(
    shutdown: &mut watch::Receiver<bool>,
    mut backoff: B,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    B: Backoff,
    F: FnMut() -> Fut,
    Fut: Future<Output = Outcome<T, E>>,
{
    if *shutdown.borrow() {
        return Err(RetryError::Cancelled);
    }

    loop {
        match op().await {
            Outcome::Success(value) => return Ok(value),
            Outcome::Fatal(err) => return Err(RetryError::Exhausted(err)),
            Outcome::Retryable(err) => {
                let Some(delay) = backoff.next() else {
                    return Err(RetryError::Exhausted(err));
                };
                if *shutdown.borrow() {
                    return Err(RetryError::Cancelled);
                }
                tokio::select! {
                    _ = shutdown.changed() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
