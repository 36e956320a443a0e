//! Ingest and query handlers.

use std::fmt::Write as _;
use std::io::Read;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use flate2::read::GzDecoder;
use tracing::{debug, warn};

use vitals_metrics::MetricRecord;
use vitals_signer::SIGNATURE_HEADER;

use crate::ServerState;
use crate::storage::MetricValue;

type Rejection = (StatusCode, String);

/// POST /updates/ with a (possibly gzipped) JSON array of records.
pub async fn ingest_batch(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, Rejection> {
    let json = decode_body(&state, &headers, &body)?;
    let records: Vec<MetricRecord> = serde_json::from_slice(&json)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid batch: {e}")))?;

    for record in &records {
        state.store.apply(record).await;
    }
    debug!(records = records.len(), "batch ingested");
    Ok(StatusCode::OK)
}

/// POST /update/ with one record.
pub async fn ingest_single(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, Rejection> {
    let json = decode_body(&state, &headers, &body)?;
    let record: MetricRecord = serde_json::from_slice(&json)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid record: {e}")))?;

    state.store.apply(&record).await;
    debug!(id = record.id(), "record ingested");
    Ok(StatusCode::OK)
}

/// GET /value/{kind}/{name}: the current value as plain text.
pub async fn get_value(
    State(state): State<ServerState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<String, StatusCode> {
    match kind.as_str() {
        "counter" => state
            .store
            .counter(&name)
            .await
            .map(|v| v.to_string())
            .ok_or(StatusCode::NOT_FOUND),
        "gauge" => state
            .store
            .gauge(&name)
            .await
            .map(|v| v.to_string())
            .ok_or(StatusCode::NOT_FOUND),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

/// GET /: plain-text dump of everything stored.
pub async fn index(State(state): State<ServerState>) -> String {
    let mut out = String::new();
    for (name, value) in state.store.list().await {
        match value {
            MetricValue::Counter(v) => {
                let _ = writeln!(out, "counter {name} {v}");
            }
            MetricValue::Gauge(v) => {
                let _ = writeln!(out, "gauge {name} {v}");
            }
        }
    }
    out
}

/// Verify the signature (when a key is configured) and gunzip the body
/// (when the request says it is compressed).
///
/// The signature covers the raw bytes as they arrived, i.e. the
/// compressed payload, matching what the agent signs.
fn decode_body(
    state: &ServerState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Vec<u8>, Rejection> {
    if let Some(signer) = &state.signer {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing signature".to_string()))?;
        if !signer.verify(body, signature) {
            warn!("rejected payload with a bad signature");
            return Err((StatusCode::BAD_REQUEST, "bad signature".to_string()));
        }
    }

    let gzipped = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    if gzipped {
        let mut json = Vec::new();
        GzDecoder::new(body.as_ref())
            .read_to_end(&mut json)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid gzip body: {e}")))?;
        Ok(json)
    } else {
        Ok(body.to_vec())
    }
}
