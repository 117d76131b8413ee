use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use formgate_core::{
    decide, format_decision, format_error, Decision, GateError, SubmissionContext,
    VerificationError, VerifyResponse,
};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::GateConfig;
use crate::submission::{decode_fields, transport_meta};
use crate::telemetry::{token_fingerprint, Telemetry};
use crate::verifier::TokenVerifier;

pub const VERIFY_PATH: &str = "/verify-recaptcha";
pub const HEALTH_BODY: &str = "Backend is running";

#[derive(Clone)]
pub struct HttpVerifyState {
    pub cfg: Arc<GateConfig>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub telemetry: Arc<Telemetry>,
}

pub fn build_state(
    cfg: GateConfig,
    verifier: Arc<dyn TokenVerifier>,
    telemetry: Arc<Telemetry>,
) -> HttpVerifyState {
    HttpVerifyState {
        cfg: Arc::new(cfg),
        verifier,
        telemetry,
    }
}

pub fn router(state: HttpVerifyState) -> Router {
    Router::new()
        .route("/", get(health))
        .route(VERIFY_PATH, post(verify_recaptcha))
        .layer(RequestBodyLimitLayer::new(state.cfg.max_body_bytes))
        .layer(cors_layer(&state.cfg.allowed_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Only the configured origin may call from a browser. An origin that is not
/// a valid header value leaves CORS closed.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::POST])
        .allow_headers([CONTENT_TYPE]);
    match HeaderValue::from_str(origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(err) => {
            tracing::warn!(error=%err, "allowed origin is not a valid header value; CORS disabled");
            layer
        }
    }
}

pub async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener, std::io::Error> {
    tokio::net::TcpListener::bind(addr).await
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: HttpVerifyState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn health() -> &'static str {
    HEALTH_BODY
}

async fn verify_recaptcha(
    State(state): State<HttpVerifyState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let peer = connect.map(|ConnectInfo(addr)| addr.ip());
    let response = verify_submission(&state, &headers, peer, body).await;
    (StatusCode::OK, Json(response))
}

/// Runs one submission through extraction, a single backend assessment and
/// the decision policy. Every outcome, including internal faults, becomes a
/// `VerifyResponse`.
pub async fn verify_submission(
    state: &HttpVerifyState,
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    body: Bytes,
) -> VerifyResponse {
    let protocol = state.verifier.protocol().as_str();
    match verify_submission_impl(state, headers, peer, body).await {
        Ok(decision) => {
            state
                .telemetry
                .record_decision(protocol, decision.outcome_label());
            format_decision(&decision)
        }
        Err(err) => {
            match &err {
                GateError::Verification(VerificationError::Misconfigured(missing)) => {
                    tracing::error!(protocol, missing, "verifier is not configured");
                }
                GateError::Verification(VerificationError::BackendUnavailable(detail)) => {
                    tracing::error!(protocol, detail = %detail, "reCAPTCHA verification failed");
                }
                GateError::Extract(_) => {
                    tracing::info!(protocol, "submission rejected: no token");
                }
            }
            state.telemetry.record_failure(err.kind());
            format_error(&err)
        }
    }
}

pub(crate) async fn verify_submission_impl(
    state: &HttpVerifyState,
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    body: Bytes,
) -> Result<Decision, GateError> {
    let fields = decode_fields(headers, body).await;
    let meta = transport_meta(headers, peer, state.cfg.trust_forwarded_for);
    let ctx = SubmissionContext::extract(&fields, meta)?;

    let protocol = state.verifier.protocol().as_str();
    tracing::info!(
        protocol,
        token_len = ctx.token.len(),
        token_fp = %token_fingerprint(&ctx.token),
        action = %ctx.declared_action,
        client_ip = %ctx.client_ip,
        "verifying submission"
    );

    // Detached so a dropped client connection does not cancel the call.
    let verifier = Arc::clone(&state.verifier);
    let call_ctx = ctx.clone();
    let call = tokio::spawn(async move { verifier.assess(&call_ctx).await });

    let deadline = Duration::from_millis(state.cfg.backend_timeout_ms);
    let started = Instant::now();
    let assessed = tokio::time::timeout(deadline, call).await;
    state.telemetry.record_backend_call(
        protocol,
        u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    );
    let result = match assessed {
        Ok(Ok(result)) => result?,
        Ok(Err(join_err)) => {
            return Err(VerificationError::BackendUnavailable(format!(
                "verification task failed: {join_err}"
            ))
            .into())
        }
        Err(_) => {
            return Err(VerificationError::BackendUnavailable(format!(
                "no reply within {}ms",
                state.cfg.backend_timeout_ms
            ))
            .into())
        }
    };

    let decision = decide(&result, &state.cfg.policy, &ctx.declared_action);
    tracing::info!(
        protocol,
        token_fp = %token_fingerprint(&ctx.token),
        token_valid = result.token_valid,
        returned_action = ?result.returned_action,
        score = ?result.score,
        reasons = ?result.reasons,
        outcome = decision.outcome_label(),
        "submission decided"
    );
    Ok(decision)
}
