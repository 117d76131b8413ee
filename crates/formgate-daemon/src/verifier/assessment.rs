use formgate_core::{SubmissionContext, VerificationError, VerificationResult};
use serde::{Deserialize, Serialize};

use super::{backend_unavailable, decode_reply};
use crate::config::{require, AssessmentCredential};

pub const DEFAULT_ASSESSMENT_ENDPOINT: &str = "https://recaptchaenterprise.googleapis.com";

/// What to do when a valid token comes back without a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingScorePolicy {
    /// Score 0.0, which rejects under any positive threshold.
    #[default]
    TreatAsZero,
    /// Report the reply as unusable.
    Unavailable,
}

impl MissingScorePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zero" | "treat_as_zero" => Some(Self::TreatAsZero),
            "unavailable" | "error" => Some(Self::Unavailable),
            _ => None,
        }
    }
}

/// Enterprise-style create-assessment call returning validity, the action the
/// backend observed, a continuous score and reason codes.
#[derive(Debug, Clone)]
pub struct AssessmentVerifier {
    http: reqwest::Client,
    endpoint: String,
    project_id: Option<String>,
    site_key: Option<String>,
    credential: Option<AssessmentCredential>,
    missing_score: MissingScorePolicy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAssessmentRequest<'a> {
    event: AssessmentEvent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentEvent<'a> {
    token: &'a str,
    site_key: &'a str,
    expected_action: &'a str,
    user_agent: &'a str,
    user_ip_address: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct AssessmentReply {
    token_properties: Option<TokenProperties>,
    risk_analysis: Option<RiskAnalysis>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TokenProperties {
    valid: bool,
    action: Option<String>,
    invalid_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RiskAnalysis {
    score: Option<f64>,
    reasons: Vec<String>,
}

impl AssessmentVerifier {
    pub fn new(
        http: reqwest::Client,
        endpoint: String,
        project_id: Option<String>,
        site_key: Option<String>,
        credential: Option<AssessmentCredential>,
        missing_score: MissingScorePolicy,
    ) -> Self {
        Self {
            http,
            endpoint,
            project_id,
            site_key,
            credential,
            missing_score,
        }
    }

    pub async fn assess(
        &self,
        ctx: &SubmissionContext,
    ) -> Result<VerificationResult, VerificationError> {
        let project_id = require(self.project_id.as_deref(), "project id")?;
        let site_key = require(self.site_key.as_deref(), "site key")?;
        let credential = self
            .credential
            .as_ref()
            .ok_or(VerificationError::Misconfigured("assessment credential"))?;

        let url = assessments_url(&self.endpoint, project_id);
        let body = CreateAssessmentRequest {
            event: AssessmentEvent {
                token: &ctx.token,
                site_key,
                expected_action: &ctx.declared_action,
                user_agent: &ctx.user_agent,
                user_ip_address: &ctx.client_ip,
            },
        };
        let request = match credential {
            AssessmentCredential::ApiKey(key) => self.http.post(&url).query(&[("key", key)]),
            AssessmentCredential::BearerToken(token) => self.http.post(&url).bearer_auth(token),
        };
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(backend_unavailable)?;
        let reply: AssessmentReply = decode_reply(response).await?;
        map_assessment_reply(reply, self.missing_score, &ctx.declared_action)
    }
}

pub(crate) fn parent_resource(project_id: &str) -> String {
    format!("projects/{project_id}")
}

fn assessments_url(endpoint: &str, project_id: &str) -> String {
    format!(
        "{}/v1/{}/assessments",
        endpoint.trim_end_matches('/'),
        parent_resource(project_id)
    )
}

/// Scores outside `[0, 1]` mean the reply cannot be trusted. A valid token
/// whose action already mismatches is reported without a score so the
/// action check decides, whatever the missing-score policy says.
pub(crate) fn map_assessment_reply(
    reply: AssessmentReply,
    missing_score: MissingScorePolicy,
    declared_action: &str,
) -> Result<VerificationResult, VerificationError> {
    let token = reply.token_properties.unwrap_or_default();
    let risk = reply.risk_analysis.unwrap_or_default();
    let returned_action = token.action.unwrap_or_default();

    let score = match (risk.score, token.valid) {
        (Some(score), _) if score.is_finite() && (0.0..=1.0).contains(&score) => Some(score),
        (Some(score), _) => {
            tracing::warn!(score, "assessment reply score outside [0, 1]");
            return Err(VerificationError::BackendUnavailable(
                "score out of range".to_string(),
            ));
        }
        (None, false) => Some(0.0),
        (None, true) if returned_action != declared_action => None,
        (None, true) => match missing_score {
            MissingScorePolicy::TreatAsZero => {
                tracing::warn!("assessment reply for a valid token carried no score; using 0.0");
                Some(0.0)
            }
            MissingScorePolicy::Unavailable => {
                return Err(VerificationError::BackendUnavailable(
                    "assessment reply carried no score".to_string(),
                ));
            }
        },
    };

    Ok(VerificationResult {
        token_valid: token.valid,
        invalid_reason: token.invalid_reason,
        returned_action: Some(returned_action),
        score,
        reasons: risk.reasons,
    })
}
