pub mod assessment;
pub mod simple;

use std::time::Duration;

use async_trait::async_trait;
use formgate_core::{SubmissionContext, VerificationError, VerificationResult};
use serde::de::DeserializeOwned;

use crate::config::VerifierConfig;

use self::assessment::AssessmentVerifier;
use self::simple::SimpleVerifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Simple,
    RiskAssessment,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::RiskAssessment => "risk_assessment",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simple" | "siteverify" => Some(Self::Simple),
            "risk_assessment" | "risk-assessment" | "enterprise" => Some(Self::RiskAssessment),
            _ => None,
        }
    }
}

/// One outbound assessment per call; implementations never retry.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    fn protocol(&self) -> Protocol;

    async fn assess(
        &self,
        ctx: &SubmissionContext,
    ) -> Result<VerificationResult, VerificationError>;
}

/// Backend selected once at configuration time.
#[derive(Debug, Clone)]
pub enum VerifierClient {
    Simple(SimpleVerifier),
    RiskAssessment(AssessmentVerifier),
}

impl VerifierClient {
    pub fn from_config(cfg: &VerifierConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = build_http_client(timeout)?;
        Ok(match cfg.protocol {
            Protocol::Simple => Self::Simple(SimpleVerifier::new(
                http,
                cfg.siteverify_url.clone(),
                cfg.secret_key.clone(),
            )),
            Protocol::RiskAssessment => Self::RiskAssessment(AssessmentVerifier::new(
                http,
                cfg.assessment_endpoint.clone(),
                cfg.project_id.clone(),
                cfg.site_key.clone(),
                cfg.credential.clone(),
                cfg.missing_score,
            )),
        })
    }
}

#[async_trait]
impl TokenVerifier for VerifierClient {
    fn protocol(&self) -> Protocol {
        match self {
            Self::Simple(_) => Protocol::Simple,
            Self::RiskAssessment(_) => Protocol::RiskAssessment,
        }
    }

    async fn assess(
        &self,
        ctx: &SubmissionContext,
    ) -> Result<VerificationResult, VerificationError> {
        match self {
            Self::Simple(verifier) => verifier.assess(ctx).await,
            Self::RiskAssessment(verifier) => verifier.assess(ctx).await,
        }
    }
}

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("formgate/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub(crate) fn backend_unavailable(err: reqwest::Error) -> VerificationError {
    let detail = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.without_url().to_string()
    };
    VerificationError::BackendUnavailable(detail)
}

/// Rejects non-2xx replies and bodies that do not match the expected shape.
pub(crate) async fn decode_reply<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, VerificationError> {
    let status = response.status();
    if !status.is_success() {
        return Err(VerificationError::BackendUnavailable(format!(
            "backend returned status {status}"
        )));
    }
    let body = response.bytes().await.map_err(backend_unavailable)?;
    serde_json::from_slice(&body).map_err(|err| {
        VerificationError::BackendUnavailable(format!("malformed backend reply: {err}"))
    })
}
