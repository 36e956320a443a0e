//! Ingest server for vitals metric batches.
//!
//! Accepts the agent's gzipped, optionally signed JSON batches, folds
//! them into an in-memory [`storage::MetricStore`], and answers simple
//! plain-text queries about what it has stored.

pub mod handlers;
pub mod storage;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::watch;

use vitals_signer::HmacSha256Signer;

use storage::MetricStore;

/// Shared state for all routes.
#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<MetricStore>,
    /// Verifies incoming payloads; `None` disables verification.
    pub signer: Option<Arc<HmacSha256Signer>>,
}

impl ServerState {
    pub fn new(signing_key: Option<&str>) -> Self {
        Self {
            store: Arc::new(MetricStore::new()),
            signer: signing_key.map(|key| Arc::new(HmacSha256Signer::new(key))),
        }
    }
}

/// Build the ingest router.
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/updates/", post(handlers::ingest_batch))
        .route("/update/", post(handlers::ingest_single))
        .route("/value/{kind}/{name}", get(handlers::get_value))
        .with_state(state)
}

/// Serve until the shutdown signal fires.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}
