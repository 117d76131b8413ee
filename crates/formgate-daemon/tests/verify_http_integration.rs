use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::post;
use axum::{Form, Json, Router};
use formgate_daemon::config::{AssessmentCredential, GateConfig, VerifierConfig};
use formgate_daemon::http_verify;
use formgate_daemon::telemetry::Telemetry;
use formgate_daemon::verifier::{Protocol, TokenVerifier, VerifierClient};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{json, Value};

/// Stand-in for both reCAPTCHA backends. Replies are keyed on the token so
/// one backend serves every scenario.
#[derive(Clone, Default)]
struct FakeBackend {
    assessment_calls: Arc<AtomicUsize>,
    siteverify_calls: Arc<AtomicUsize>,
    last_assessment: Arc<Mutex<Option<(String, Option<String>, Value)>>>,
    last_siteverify: Arc<Mutex<Option<Vec<(String, String)>>>>,
}

fn assessment_reply(token: &str) -> Value {
    match token {
        "good" => json!({
            "tokenProperties": {"valid": true, "action": "submit"},
            "riskAnalysis": {"score": 0.9, "reasons": []}
        }),
        "login" => json!({
            "tokenProperties": {"valid": true, "action": "login"},
            "riskAnalysis": {"score": 0.9}
        }),
        "bot" => json!({
            "tokenProperties": {"valid": true, "action": "submit"},
            "riskAnalysis": {"score": 0.1, "reasons": ["AUTOMATION"]}
        }),
        _ => json!({
            "tokenProperties": {"valid": false, "invalidReason": "MALFORMED"},
            "riskAnalysis": {"score": 0.0}
        }),
    }
}

async fn create_assessment(
    State(backend): State<FakeBackend>,
    Path(project): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    backend.assessment_calls.fetch_add(1, Ordering::SeqCst);
    let key = query
        .into_iter()
        .find(|(name, _)| name == "key")
        .map(|(_, value)| value);
    let token = body["event"]["token"].as_str().unwrap_or_default().to_string();
    *backend.last_assessment.lock() = Some((project, key, body));
    Json(assessment_reply(&token))
}

async fn siteverify(
    State(backend): State<FakeBackend>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Json<Value> {
    backend.siteverify_calls.fetch_add(1, Ordering::SeqCst);
    let ok = fields
        .iter()
        .any(|(name, value)| name == "response" && value == "good");
    *backend.last_siteverify.lock() = Some(fields);
    if ok {
        Json(json!({"success": true, "hostname": "example.com"}))
    } else {
        Json(json!({"success": false, "error-codes": ["invalid-input-response"]}))
    }
}

async fn server_error() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn garbled() -> &'static str {
    "<html>definitely not json</html>"
}

async fn spawn_backend() -> (SocketAddr, FakeBackend) {
    let backend = FakeBackend::default();
    let app = Router::new()
        .route("/v1/projects/:project/assessments", post(create_assessment))
        .route("/siteverify", post(siteverify))
        .route("/broken/v1/projects/:project/assessments", post(server_error))
        .route("/garbled/v1/projects/:project/assessments", post(garbled))
        .route("/broken/siteverify", post(server_error))
        .route("/garbled/siteverify", post(garbled))
        .with_state(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind backend");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, backend)
}

fn enterprise_config(backend: SocketAddr) -> GateConfig {
    GateConfig {
        verifier: VerifierConfig {
            protocol: Protocol::RiskAssessment,
            project_id: Some("demo-project".to_string()),
            site_key: Some("site-key".to_string()),
            credential: Some(AssessmentCredential::ApiKey("api-key".to_string())),
            assessment_endpoint: format!("http://{backend}"),
            ..VerifierConfig::default()
        },
        ..GateConfig::default()
    }
}

fn simple_config(backend: SocketAddr) -> GateConfig {
    GateConfig {
        verifier: VerifierConfig {
            protocol: Protocol::Simple,
            secret_key: Some("shh".to_string()),
            siteverify_url: format!("http://{backend}/siteverify"),
            ..VerifierConfig::default()
        },
        ..GateConfig::default()
    }
}

struct Gate {
    addr: SocketAddr,
    shutdown: tokio::sync::oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
}

impl Gate {
    fn url(&self) -> String {
        format!("http://{}{}", self.addr, http_verify::VERIFY_PATH)
    }

    fn stop(self) {
        let _ = self.shutdown.send(());
        self.server.abort();
    }
}

async fn spawn_gate(cfg: GateConfig) -> Gate {
    let listener = http_verify::bind_listener("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let verifier: Arc<dyn TokenVerifier> = Arc::new(
        VerifierClient::from_config(&cfg.verifier, Duration::from_millis(cfg.backend_timeout_ms))
            .expect("verifier"),
    );
    let state = http_verify::build_state(cfg, verifier, Arc::new(Telemetry::new()));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let _ = http_verify::serve(listener, state, async move {
            let _ = rx.await;
        })
        .await;
    });
    Gate {
        addr,
        shutdown: tx,
        server,
    }
}

async fn post_form(url: &str, fields: &[(&str, &str)]) -> Value {
    let resp = reqwest::Client::new()
        .post(url)
        .header("user-agent", "integration-test/1.0")
        .form(fields)
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), StatusCode::OK);
    resp.json().await.expect("json")
}

#[tokio::test]
async fn enterprise_outcomes_over_http() {
    let (backend_addr, backend) = spawn_backend().await;
    let gate = spawn_gate(enterprise_config(backend_addr)).await;
    let url = gate.url();

    let ok = post_form(&url, &[("g-recaptcha-response", "good"), ("name", "Ada")]).await;
    assert_eq!(ok, json!({"success": true, "score": 0.9, "reasons": []}));

    let low = post_form(&url, &[("g-recaptcha-response", "bot")]).await;
    assert_eq!(
        low,
        json!({"success": false, "score": 0.1, "error": "Low reCAPTCHA score", "reasons": ["AUTOMATION"]})
    );

    let mismatch = post_form(&url, &[("g-recaptcha-response", "login"), ("action", "submit")]).await;
    assert_eq!(mismatch, json!({"success": false, "error": "Action mismatch"}));

    let invalid = post_form(&url, &[("g-recaptcha-response", "forged")]).await;
    assert_eq!(invalid, json!({"success": false, "error": "Invalid token: MALFORMED"}));

    assert_eq!(backend.assessment_calls.load(Ordering::SeqCst), 4);
    gate.stop();
}

#[tokio::test]
async fn assessment_request_carries_event_fields() {
    let (backend_addr, backend) = spawn_backend().await;
    let gate = spawn_gate(enterprise_config(backend_addr)).await;

    let _ = post_form(&gate.url(), &[("g-recaptcha-response", "login"), ("action", "login")]).await;

    let (project, key, body) = backend
        .last_assessment
        .lock()
        .clone()
        .expect("assessment recorded");
    assert_eq!(project, "demo-project");
    assert_eq!(key.as_deref(), Some("api-key"));
    assert_eq!(body["event"]["token"], "login");
    assert_eq!(body["event"]["siteKey"], "site-key");
    assert_eq!(body["event"]["expectedAction"], "login");
    assert_eq!(body["event"]["userAgent"], "integration-test/1.0");
    assert_eq!(body["event"]["userIpAddress"], "127.0.0.1");
    gate.stop();
}

#[tokio::test]
async fn missing_token_is_answered_without_backend_call() {
    let (backend_addr, backend) = spawn_backend().await;
    let gate = spawn_gate(enterprise_config(backend_addr)).await;

    let resp = post_form(&gate.url(), &[("name", "Ada")]).await;
    assert_eq!(resp, json!({"success": false, "error": "Missing reCAPTCHA token"}));
    assert_eq!(backend.assessment_calls.load(Ordering::SeqCst), 0);
    gate.stop();
}

#[tokio::test]
async fn simple_protocol_over_http() {
    let (backend_addr, backend) = spawn_backend().await;
    let gate = spawn_gate(simple_config(backend_addr)).await;
    let url = gate.url();

    let ok = post_form(&url, &[("g-recaptcha-response", "good")]).await;
    assert_eq!(ok, json!({"success": true}));

    let bad = post_form(&url, &[("g-recaptcha-response", "nope"), ("action", "login")]).await;
    assert_eq!(
        bad,
        json!({"success": false, "error": "Invalid token: verification failed"})
    );

    let fields = backend.last_siteverify.lock().clone().expect("siteverify recorded");
    assert!(fields.contains(&("secret".to_string(), "shh".to_string())));
    assert!(fields.contains(&("response".to_string(), "nope".to_string())));
    assert!(fields.contains(&("remoteip".to_string(), "127.0.0.1".to_string())));
    assert_eq!(backend.siteverify_calls.load(Ordering::SeqCst), 2);
    gate.stop();
}

#[tokio::test]
async fn same_token_is_verified_on_every_submission() {
    let (backend_addr, backend) = spawn_backend().await;
    let gate = spawn_gate(enterprise_config(backend_addr)).await;

    let first = post_form(&gate.url(), &[("g-recaptcha-response", "good")]).await;
    let second = post_form(&gate.url(), &[("g-recaptcha-response", "good")]).await;
    assert_eq!(first, second);
    assert_eq!(backend.assessment_calls.load(Ordering::SeqCst), 2);
    gate.stop();
}

#[tokio::test]
async fn unreachable_backend_yields_generic_error() {
    // Bind then drop so nothing listens on the port.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind")
        .local_addr()
        .expect("addr");
    let gate = spawn_gate(enterprise_config(dead)).await;

    let resp = post_form(&gate.url(), &[("g-recaptcha-response", "good")]).await;
    assert_eq!(resp, json!({"success": false, "error": "Error verifying reCAPTCHA"}));
    gate.stop();
}

#[tokio::test]
async fn missing_credentials_yield_configuration_error() {
    let (backend_addr, backend) = spawn_backend().await;
    let mut cfg = enterprise_config(backend_addr);
    cfg.verifier.project_id = None;
    let gate = spawn_gate(cfg).await;

    let resp = post_form(&gate.url(), &[("g-recaptcha-response", "good")]).await;
    assert_eq!(resp, json!({"success": false, "error": "Server configuration error"}));
    assert_eq!(backend.assessment_calls.load(Ordering::SeqCst), 0);
    gate.stop();
}

#[tokio::test]
async fn json_and_multipart_bodies_are_accepted() {
    let (backend_addr, _backend) = spawn_backend().await;
    let gate = spawn_gate(enterprise_config(backend_addr)).await;
    let client = reqwest::Client::new();

    let resp: Value = client
        .post(gate.url())
        .json(&json!({"g-recaptcha-response": "good", "email": "ada@example.com"}))
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("json");
    assert_eq!(resp["success"], true);

    let boundary = "formgate-boundary";
    let multipart = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"g-recaptcha-response\"\r\n\r\nbot\r\n--{boundary}--\r\n"
    );
    let resp: Value = client
        .post(gate.url())
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(multipart)
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("json");
    assert_eq!(resp["success"], false);
    assert_eq!(resp["error"], "Low reCAPTCHA score");
    gate.stop();
}

#[tokio::test]
async fn health_check_and_cors_preflight() {
    let gate = spawn_gate(GateConfig::default()).await;
    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://{}/", gate.addr))
        .send()
        .await
        .expect("send");
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await.expect("text"), http_verify::HEALTH_BODY);

    let preflight = client
        .request(reqwest::Method::OPTIONS, gate.url())
        .header("origin", "https://www.yucelacin.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .expect("send");
    assert_eq!(
        preflight
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://www.yucelacin.com")
    );
    gate.stop();
}

#[tokio::test]
async fn failing_or_garbled_backend_replies_yield_generic_error() {
    let (backend_addr, _backend) = spawn_backend().await;
    for prefix in ["broken", "garbled"] {
        let mut enterprise = enterprise_config(backend_addr);
        enterprise.verifier.assessment_endpoint = format!("http://{backend_addr}/{prefix}");
        let mut simple = simple_config(backend_addr);
        simple.verifier.siteverify_url = format!("http://{backend_addr}/{prefix}/siteverify");

        for cfg in [enterprise, simple] {
            let gate = spawn_gate(cfg).await;
            let resp = post_form(&gate.url(), &[("g-recaptcha-response", "good")]).await;
            assert_eq!(
                resp,
                json!({"success": false, "error": "Error verifying reCAPTCHA"}),
                "backend variant {prefix}"
            );
            gate.stop();
        }
    }
}
