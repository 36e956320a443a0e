//! Agent supervisor.
//!
//! Wires the samplers, the reporter, and the pool workers together as
//! sibling tasks on one shutdown channel. The first task to fail
//! cancels all the others; its error is returned once every sibling has
//! unwound. A plain shutdown (Ctrl-C forwarded by the binary) unwinds
//! everything and returns `Ok`.

pub mod config;

pub use config::AgentConfig;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use vitals_collect::{Poller, ProcessStatsSampler, SystemStatsSampler};
use vitals_metrics::MetricScope;
use vitals_report::{HttpSink, Reporter, WorkerPool};
use vitals_signer::{HmacSha256Signer, Signer};

/// Run the agent until shutdown or the first fatal subsystem error.
pub async fn run(config: AgentConfig, external: watch::Receiver<bool>) -> anyhow::Result<()> {
    info!(
        server = %config.server_addr,
        poll_interval = ?config.poll_interval,
        report_interval = ?config.report_interval,
        rate_limit = config.rate_limit,
        signing = config.signing_key.is_some(),
        "agent starting"
    );

    let scope = Arc::new(MetricScope::new());

    let signer = config
        .signing_key
        .as_deref()
        .map(|key| Arc::new(HmacSha256Signer::new(key)) as Arc<dyn Signer>);

    let reporter = Reporter::new(
        scope.clone(),
        config.report_interval,
        WorkerPool::new(config.rate_limit),
        HttpSink::new(config.server_addr.clone()),
        signer,
    );

    let process_poller = Poller::new(
        ProcessStatsSampler::new().context("resolving the current process")?,
        scope.clone(),
        config.poll_interval,
    );
    let system_poller = Poller::new(
        SystemStatsSampler::new(),
        scope.clone(),
        config.poll_interval,
    );

    // Internal channel so a failing sibling can cancel the rest; the
    // external signal is forwarded into it.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    forward_shutdown(external, shutdown_tx.clone());

    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    tasks.spawn({
        let rx = shutdown_rx.clone();
        async move { process_poller.run(rx).await.map_err(Into::into) }
    });
    tasks.spawn({
        let rx = shutdown_rx.clone();
        async move { system_poller.run(rx).await.map_err(Into::into) }
    });
    reporter.start_workers(&shutdown_rx, &mut tasks);
    tasks.spawn(reporter.run(shutdown_rx));

    let result = join_all(&mut tasks, &shutdown_tx).await;
    if result.is_ok() {
        info!("agent stopped");
    }
    result
}

/// Propagate the external shutdown signal into the internal channel.
fn forward_shutdown(mut external: watch::Receiver<bool>, internal: watch::Sender<bool>) {
    tokio::spawn(async move {
        if !*external.borrow() {
            // A dropped sender also ends the agent.
            let _ = external.changed().await;
        }
        let _ = internal.send(true);
    });
}

/// Await every task; the first error cancels the siblings and is
/// returned once all of them have finished.
async fn join_all(
    tasks: &mut JoinSet<anyhow::Result<()>>,
    shutdown_tx: &watch::Sender<bool>,
) -> anyhow::Result<()> {
    let mut first_error: Option<anyhow::Error> = None;

    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(res) => res,
            Err(join_err) => Err(anyhow::anyhow!("subsystem task panicked: {join_err}")),
        };
        if let Err(e) = outcome {
            if first_error.is_none() {
                error!(error = %e, "subsystem failed; shutting the agent down");
                let _ = shutdown_tx.send(true);
                first_error = Some(e);
            } else {
                error!(error = %e, "additional subsystem failure during shutdown");
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_error_cancels_the_siblings() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

        tasks.spawn(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(anyhow::anyhow!("sampler broke"))
        });
        tasks.spawn({
            let mut rx = shutdown_rx.clone();
            async move {
                // Would hang forever without the fail-fast cancellation.
                let _ = rx.changed().await;
                Ok(())
            }
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            join_all(&mut tasks, &shutdown_tx),
        )
        .await
        .unwrap();

        assert_eq!(result.unwrap_err().to_string(), "sampler broke");
    }

    #[tokio::test]
    async fn clean_tasks_produce_ok() {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();
        tasks.spawn(async { Ok(()) });
        tasks.spawn(async { Ok(()) });

        join_all(&mut tasks, &shutdown_tx).await.unwrap();
    }

    #[tokio::test]
    async fn panic_is_reported_as_an_error() {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();
        tasks.spawn(async { panic!("boom") });

        let result = join_all(&mut tasks, &shutdown_tx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn agent_shuts_down_cleanly_without_a_reachable_server() {
        // Nothing listens on the configured address: every flush fails
        // in transport and is retried, which must stay contained.
        let config = AgentConfig {
            server_addr: "127.0.0.1:9".to_string(),
            poll_interval: Duration::from_millis(10),
            report_interval: Duration::from_millis(20),
            rate_limit: 2,
            signing_key: None,
        };

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(config, rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("agent must unwind promptly after shutdown")
            .unwrap()
            .unwrap();
    }
}
