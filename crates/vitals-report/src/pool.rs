//! Bounded worker pool for outbound flushes.
//!
//! Admission control for the reporter: a fixed-capacity job queue with
//! exactly one worker per slot, so at most N flushes run concurrently.
//! A full queue blocks `submit`, trading scheduling latency for bounded
//! network fan-out.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// A queued flush, ready to run on any worker.
pub type Job = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Fixed-capacity job queue plus one worker task per slot.
pub struct WorkerPool {
    tx: Option<flume::Sender<Job>>,
    rx: flume::Receiver<Job>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let (tx, rx) = flume::bounded(size);
        Self {
            tx: Some(tx),
            rx,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Enqueue a job, waiting for queue space.
    ///
    /// If the shutdown signal fires first, or the pool has been closed,
    /// the job is dropped silently.
    pub async fn submit(&self, shutdown: &mut watch::Receiver<bool>, job: Job) {
        let Some(tx) = &self.tx else {
            warn!("job submitted to a closed pool; dropping it");
            return;
        };
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("shutdown while waiting for queue space; job dropped");
            }
            res = tx.send_async(job) => {
                if res.is_err() {
                    warn!("job queue disconnected; job dropped");
                }
            }
        }
    }

    /// Spawn the pool's workers into the supervisor's task set.
    ///
    /// Each worker exits cleanly once the queue is closed and drained,
    /// or as soon as the shutdown signal fires (abandoning whatever is
    /// still queued). A job error terminates its worker and surfaces
    /// through the task set.
    pub fn start(&self, shutdown: &watch::Receiver<bool>, tasks: &mut JoinSet<anyhow::Result<()>>) {
        for id in 0..self.size {
            let rx = self.rx.clone();
            let mut shutdown = shutdown.clone();
            tasks.spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        debug!(worker = id, "worker shutting down");
                        return Ok(());
                    }
                    tokio::select! {
                        _ = shutdown.changed() => {
                            debug!(worker = id, "worker shutting down");
                            return Ok(());
                        }
                        job = rx.recv_async() => {
                            let Ok(job) = job else {
                                debug!(worker = id, "job queue closed and drained");
                                return Ok(());
                            };
                            job.await?;
                        }
                    }
                }
            });
        }
    }

    /// Half-close the queue: no new jobs, queued ones still delivered.
    pub fn close(&mut self) {
        self.tx = None;
    }
}
