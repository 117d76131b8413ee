use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;

const LATENCY_BUCKETS_MS: [u64; 10] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("metrics server failed: {0}")]
    Server(std::io::Error),
}

#[derive(Debug, Default)]
struct TelemetryState {
    decisions_total: HashMap<(String, String), u64>,
    failures_total: HashMap<String, u64>,
    backend_latency_ms_bucket: BTreeMap<u64, u64>,
    backend_calls_total: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    state: Arc<Mutex<TelemetryState>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, protocol: &str, outcome: &str) {
        let mut guard = self.state.lock();
        let entry = guard
            .decisions_total
            .entry((protocol.to_string(), outcome.to_string()))
            .or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn record_failure(&self, kind: &str) {
        let mut guard = self.state.lock();
        let entry = guard.failures_total.entry(kind.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn record_backend_call(&self, protocol: &str, latency_ms: u64) {
        let mut guard = self.state.lock();
        let calls = guard
            .backend_calls_total
            .entry(protocol.to_string())
            .or_insert(0);
        *calls = calls.saturating_add(1);
        let bucket = LATENCY_BUCKETS_MS
            .into_iter()
            .find(|bound| latency_ms <= *bound)
            .unwrap_or(u64::MAX);
        let entry = guard.backend_latency_ms_bucket.entry(bucket).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn decision_count(&self, protocol: &str, outcome: &str) -> u64 {
        self.state
            .lock()
            .decisions_total
            .get(&(protocol.to_string(), outcome.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn failure_count(&self, kind: &str) -> u64 {
        self.state
            .lock()
            .failures_total
            .get(kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn render(&self) -> String {
        let guard = self.state.lock();
        let mut out = String::new();
        out.push_str("# TYPE formgate_decisions_total counter\n");
        for ((protocol, outcome), value) in &guard.decisions_total {
            let _ = writeln!(
                out,
                "formgate_decisions_total{{protocol=\"{}\",outcome=\"{}\"}} {}",
                protocol, outcome, value
            );
        }
        out.push_str("# TYPE formgate_failures_total counter\n");
        for (kind, value) in &guard.failures_total {
            let _ = writeln!(out, "formgate_failures_total{{kind=\"{}\"}} {}", kind, value);
        }
        out.push_str("# TYPE formgate_backend_calls_total counter\n");
        for (protocol, value) in &guard.backend_calls_total {
            let _ = writeln!(
                out,
                "formgate_backend_calls_total{{protocol=\"{}\"}} {}",
                protocol, value
            );
        }
        out.push_str("# TYPE formgate_backend_latency_ms_bucket counter\n");
        for (bucket, value) in &guard.backend_latency_ms_bucket {
            let bucket_label = if *bucket == u64::MAX {
                "+Inf".to_string()
            } else {
                bucket.to_string()
            };
            let _ = writeln!(
                out,
                "formgate_backend_latency_ms_bucket{{le=\"{}\"}} {}",
                bucket_label, value
            );
        }
        out
    }

    /// Binds `addr` and serves `GET /metrics` until the task is aborted.
    pub async fn spawn_metrics_server(
        self: Arc<Self>,
        addr: SocketAddr,
    ) -> Result<tokio::task::JoinHandle<()>, TelemetryError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(TelemetryError::Server)?;
        let app = Router::new()
            .route("/metrics", get(render_metrics))
            .with_state(self);
        Ok(tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error=%err, "metrics listener stopped");
            }
        }))
    }
}

async fn render_metrics(State(telemetry): State<Arc<Telemetry>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        telemetry.render(),
    )
}

/// Short, non-reversible token identifier for log correlation.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}
