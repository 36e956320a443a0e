//! vitalsd: the vitals telemetry daemon.
//!
//! `vitalsd agent` samples process/OS statistics and pushes them to a
//! collector; `vitalsd server` is that collector. Both run until Ctrl-C
//! and exit non-zero on the first fatal subsystem error.
//!
//! # Usage
//!
//! ```text
//! vitalsd server --listen 127.0.0.1:8080
//! vitalsd agent --address 127.0.0.1:8080 --report-interval 10
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use vitals_agent::AgentConfig;

#[derive(Parser)]
#[command(name = "vitalsd", about = "vitals telemetry daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample process/OS metrics and push them to a collector.
    Agent {
        /// Collector address (host:port).
        #[arg(short = 'a', long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
        address: String,

        /// Seconds between flushes to the collector.
        #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value_t = 10)]
        report_interval: u64,

        /// Seconds between stat samples.
        #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value_t = 2)]
        poll_interval: u64,

        /// Maximum concurrent flushes to the collector.
        #[arg(long, env = "RATE_LIMIT", default_value_t = 5)]
        rate_limit: usize,

        /// Payload signing key (signing disabled when unset).
        #[arg(short = 'k', long, env = "KEY")]
        key: Option<String>,
    },
    /// Ingest and store metric batches pushed by agents.
    Server {
        /// Listen address (host:port).
        #[arg(short = 'l', long, env = "LISTEN", default_value = "127.0.0.1:8080")]
        listen: String,

        /// Expected payload signing key (verification disabled when unset).
        #[arg(short = 'k', long, env = "KEY")]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vitals=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    match cli.command {
        Command::Agent {
            address,
            report_interval,
            poll_interval,
            rate_limit,
            key,
        } => {
            let config = AgentConfig {
                server_addr: address,
                poll_interval: Duration::from_secs(poll_interval),
                report_interval: Duration::from_secs(report_interval),
                rate_limit,
                signing_key: key,
            };
            vitals_agent::run(config, shutdown_rx).await
        }
        Command::Server { listen, key } => {
            let state = vitals_server::ServerState::new(key.as_deref());
            let listener = tokio::net::TcpListener::bind(&listen).await?;
            info!(addr = %listen, "ingest server listening");
            vitals_server::serve(listener, state, shutdown_rx).await?;
            info!("ingest server stopped");
            Ok(())
        }
    }
}
