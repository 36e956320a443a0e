//! Periodic flush of the metric scope to the collector.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::{HeaderMap, HeaderValue, StatusCode};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use vitals_metrics::{MetricRecord, MetricScope};
use vitals_retry::{Backoff, Outcome, RetryError, retry_with};
use vitals_signer::{SIGNATURE_HEADER, Signer};

use crate::pool::WorkerPool;
use crate::sink::{Sink, SinkError};

/// A flush that failed before reaching the wire.
///
/// Unlike a send failure, this is a bug in the agent itself and is
/// allowed to take the process down.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("cannot encode metrics batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cannot compress metrics batch: {0}")]
    Compress(#[from] std::io::Error),
}

/// Why one send attempt did not produce an acceptable response.
#[derive(Debug, Error)]
enum SendFailure {
    #[error(transparent)]
    Transport(SinkError),

    #[error("collector responded {0}")]
    Status(StatusCode),
}

/// Builds a fresh backoff for each flush.
type BackoffFactory = Arc<dyn Fn() -> Box<dyn Backoff + Send> + Send + Sync>;

/// Flushes scope snapshots to the sink on a fixed cadence.
pub struct Reporter<S: Sink> {
    scope: Arc<MetricScope>,
    interval: Duration,
    pool: WorkerPool,
    sink: Arc<S>,
    signer: Option<Arc<dyn Signer>>,
    backoff: BackoffFactory,
}

impl<S: Sink> Reporter<S> {
    pub fn new(
        scope: Arc<MetricScope>,
        interval: Duration,
        pool: WorkerPool,
        sink: S,
        signer: Option<Arc<dyn Signer>>,
    ) -> Self {
        Self {
            scope,
            interval,
            pool,
            sink: Arc::new(sink),
            signer,
            backoff: Arc::new(|| Box::new(vitals_retry::default_backoff())),
        }
    }

    /// Replace the per-flush backoff policy.
    pub fn with_backoff<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Backoff + Send> + Send + Sync + 'static,
    {
        self.backoff = Arc::new(factory);
        self
    }

    /// Spawn the pool's workers into the supervisor's task set.
    pub fn start_workers(
        &self,
        shutdown: &watch::Receiver<bool>,
        tasks: &mut JoinSet<anyhow::Result<()>>,
    ) {
        self.pool.start(shutdown, tasks);
    }

    /// Tick until shutdown, scheduling one flush per tick.
    ///
    /// Scheduling never waits for the flush itself to complete; a full
    /// pool queue delays the enqueue, which is the intended
    /// backpressure. On shutdown the pool is half-closed so queued
    /// flushes can drain (or be abandoned by the workers, which race
    /// the same signal).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            interval = ?self.interval,
            workers = self.pool.size(),
            signing = self.signer.is_some(),
            "reporter started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let job = flush_job(
                self.scope.clone(),
                self.sink.clone(),
                self.signer.clone(),
                (self.backoff)(),
                shutdown.clone(),
            );
            self.pool.submit(&mut shutdown, Box::pin(job)).await;
        }

        info!("reporter shutting down");
        self.pool.close();
        Ok(())
    }
}

/// One flush: snapshot, serialize, compress, sign, send under retry.
///
/// Send failures are contained here. After retry exhaustion or a 4xx
/// the batch is dropped and the job still succeeds: the counters keep
/// their cumulative state in the scope, so only this cycle's
/// notification is lost. Only an encoding failure propagates.
async fn flush_job<S: Sink>(
    scope: Arc<MetricScope>,
    sink: Arc<S>,
    signer: Option<Arc<dyn Signer>>,
    backoff: Box<dyn Backoff + Send>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let records = scope.snapshot().to_records();
    if records.is_empty() {
        debug!("empty snapshot; nothing to flush");
        return Ok(());
    }

    let payload = Bytes::from(encode_batch(&records)?);

    let mut headers = HeaderMap::new();
    if let Some(signer) = &signer {
        let signature = signer.sign(&payload);
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature)?);
    }

    let sent = retry_with(&mut shutdown, backoff, || {
        let sink = sink.clone();
        let payload = payload.clone();
        let headers = headers.clone();
        async move {
            debug!(bytes = payload.len(), "sending metrics batch");
            match sink.send(payload, headers).await {
                Ok(status) if status.is_server_error() => {
                    Outcome::Retryable(SendFailure::Status(status))
                }
                Ok(status) => Outcome::Success(status),
                Err(e) => Outcome::Retryable(SendFailure::Transport(e)),
            }
        }
    })
    .await;

    match sent {
        Ok(status) if status.is_client_error() => {
            warn!(%status, "collector rejected batch; dropping it");
        }
        Ok(status) => {
            debug!(%status, records = records.len(), "metrics batch delivered");
        }
        Err(RetryError::Cancelled) => {
            debug!("flush cancelled during shutdown");
        }
        Err(RetryError::Exhausted(e)) => {
            warn!(error = %e, "metrics batch dropped after retries");
        }
    }
    Ok(())
}

/// Serialize and gzip a batch of records.
fn encode_batch(records: &[MetricRecord]) -> Result<Vec<u8>, FlushError> {
    let json = serde_json::to_vec(records)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Read;
    use std::sync::Mutex;
    use std::time::Duration;

    use vitals_retry::{LinearBackoff, MaxRetries, no_retries};
    use vitals_signer::HmacSha256Signer;

    /// Replays a scripted sequence of responses, recording every request.
    struct ScriptedSink {
        script: Mutex<VecDeque<Result<u16, ()>>>,
        requests: Mutex<Vec<(Bytes, HeaderMap)>>,
    }

    impl ScriptedSink {
        fn new(script: impl IntoIterator<Item = Result<u16, ()>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> (Bytes, HeaderMap) {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Sink for Arc<ScriptedSink> {
        async fn send(&self, body: Bytes, headers: HeaderMap) -> Result<StatusCode, SinkError> {
            self.requests.lock().unwrap().push((body, headers));
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(code)) => Ok(StatusCode::from_u16(code).unwrap()),
                Some(Err(())) | None => Err(SinkError::Connect(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "scripted transport failure",
                ))),
            }
        }
    }

    fn quick_backoff() -> Box<dyn Backoff + Send> {
        Box::new(MaxRetries::new(
            3,
            LinearBackoff::new(Duration::from_millis(1), Duration::ZERO),
        ))
    }

    fn test_scope() -> Arc<MetricScope> {
        let scope = Arc::new(MetricScope::new());
        for _ in 0..5 {
            scope.counter("PollCount").inc(1);
        }
        scope.gauge("Temp").update(42.5);
        scope
    }

    fn decode_payload(body: &[u8]) -> Vec<serde_json::Value> {
        let mut json = Vec::new();
        flate2::read::GzDecoder::new(body)
            .read_to_end(&mut json)
            .unwrap();
        serde_json::from_slice(&json).unwrap()
    }

    #[tokio::test]
    async fn flush_delivers_gzipped_batch() {
        let sink = ScriptedSink::new([Ok(200)]);
        let (_tx, rx) = watch::channel(false);

        flush_job(test_scope(), Arc::new(sink.clone()), None, quick_backoff(), rx)
            .await
            .unwrap();

        assert_eq!(sink.request_count(), 1);
        let (body, _headers) = sink.last_request();
        let mut batch = decode_payload(&body);
        batch.sort_by_key(|r| r["id"].as_str().unwrap().to_string());
        assert_eq!(
            batch,
            vec![
                serde_json::json!({"id": "PollCount", "type": "counter", "delta": 5}),
                serde_json::json!({"id": "Temp", "type": "gauge", "value": 42.5}),
            ]
        );
    }

    #[tokio::test]
    async fn flush_retries_server_errors_until_success() {
        let sink = ScriptedSink::new([Ok(500), Ok(500), Ok(200)]);
        let (_tx, rx) = watch::channel(false);

        flush_job(test_scope(), Arc::new(sink.clone()), None, quick_backoff(), rx)
            .await
            .unwrap();

        assert_eq!(sink.request_count(), 3);
    }

    #[tokio::test]
    async fn flush_retries_transport_errors() {
        let sink = ScriptedSink::new([Err(()), Ok(200)]);
        let (_tx, rx) = watch::channel(false);

        flush_job(test_scope(), Arc::new(sink.clone()), None, quick_backoff(), rx)
            .await
            .unwrap();

        assert_eq!(sink.request_count(), 2);
    }

    #[tokio::test]
    async fn flush_does_not_retry_client_errors() {
        let sink = ScriptedSink::new([Ok(400)]);
        let (_tx, rx) = watch::channel(false);

        // The batch is dropped but the job itself stays healthy.
        flush_job(test_scope(), Arc::new(sink.clone()), None, quick_backoff(), rx)
            .await
            .unwrap();

        assert_eq!(sink.request_count(), 1);
    }

    #[tokio::test]
    async fn flush_swallows_retry_exhaustion() {
        let sink = ScriptedSink::new([Ok(500), Ok(500), Ok(500), Ok(500)]);
        let (_tx, rx) = watch::channel(false);

        flush_job(test_scope(), Arc::new(sink.clone()), None, quick_backoff(), rx)
            .await
            .unwrap();

        // Initial attempt plus three retries, then the batch is dropped.
        assert_eq!(sink.request_count(), 4);
    }

    #[tokio::test]
    async fn flush_skips_empty_snapshot() {
        let sink = ScriptedSink::new([Ok(200)]);
        let (_tx, rx) = watch::channel(false);

        flush_job(
            Arc::new(MetricScope::new()),
            Arc::new(sink.clone()),
            None,
            quick_backoff(),
            rx,
        )
        .await
        .unwrap();

        assert_eq!(sink.request_count(), 0);
    }

    #[tokio::test]
    async fn flush_signs_the_compressed_payload() {
        let sink = ScriptedSink::new([Ok(200)]);
        let (_tx, rx) = watch::channel(false);
        let signer = HmacSha256Signer::new("secret");

        flush_job(
            test_scope(),
            Arc::new(sink.clone()),
            Some(Arc::new(HmacSha256Signer::new("secret"))),
            quick_backoff(),
            rx,
        )
        .await
        .unwrap();

        let (body, headers) = sink.last_request();
        let signature = headers
            .get(SIGNATURE_HEADER)
            .expect("signature header present")
            .to_str()
            .unwrap();
        assert!(signer.verify(&body, signature));
    }

    #[tokio::test]
    async fn unsigned_flush_carries_no_signature_header() {
        let sink = ScriptedSink::new([Ok(200)]);
        let (_tx, rx) = watch::channel(false);

        flush_job(test_scope(), Arc::new(sink.clone()), None, no_boxed(), rx)
            .await
            .unwrap();

        let (_body, headers) = sink.last_request();
        assert!(!headers.contains_key(SIGNATURE_HEADER));
    }

    fn no_boxed() -> Box<dyn Backoff + Send> {
        Box::new(no_retries())
    }

    #[tokio::test]
    async fn reporter_loop_flushes_and_drains_on_shutdown() {
        let sink = ScriptedSink::new(std::iter::repeat_n(Ok(200), 64));
        let scope = test_scope();
        let reporter = Reporter::new(
            scope,
            Duration::from_millis(10),
            WorkerPool::new(2),
            sink.clone(),
            None,
        )
        .with_backoff(|| Box::new(no_retries()));

        let (tx, rx) = watch::channel(false);
        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();
        reporter.start_workers(&rx, &mut tasks);
        tasks.spawn(reporter.run(rx));

        tokio::time::sleep(Duration::from_millis(80)).await;
        tx.send(true).unwrap();

        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }

        assert!(sink.request_count() >= 1);
    }
}
