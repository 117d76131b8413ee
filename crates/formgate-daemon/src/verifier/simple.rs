use formgate_core::{SubmissionContext, VerificationError, VerificationResult};
use serde::{Deserialize, Serialize};

use super::{backend_unavailable, decode_reply};
use crate::config::require;

pub const DEFAULT_SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

const VERIFICATION_FAILED: &str = "verification failed";

/// Secret + token + IP check against the siteverify endpoint.
#[derive(Clone)]
pub struct SimpleVerifier {
    http: reqwest::Client,
    endpoint: String,
    secret_key: Option<String>,
}

impl std::fmt::Debug for SimpleVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleVerifier")
            .field("endpoint", &self.endpoint)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SiteVerifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
    remoteip: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SiteVerifyReply {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
    #[serde(default)]
    hostname: Option<String>,
}

impl SimpleVerifier {
    pub fn new(http: reqwest::Client, endpoint: String, secret_key: Option<String>) -> Self {
        Self {
            http,
            endpoint,
            secret_key,
        }
    }

    pub async fn assess(
        &self,
        ctx: &SubmissionContext,
    ) -> Result<VerificationResult, VerificationError> {
        let secret = require(self.secret_key.as_deref(), "secret key")?;
        let response = self
            .http
            .post(&self.endpoint)
            .form(&SiteVerifyRequest {
                secret,
                response: &ctx.token,
                remoteip: &ctx.client_ip,
            })
            .send()
            .await
            .map_err(backend_unavailable)?;
        let reply: SiteVerifyReply = decode_reply(response).await?;
        Ok(map_site_verify_reply(reply))
    }
}

pub(crate) fn map_site_verify_reply(reply: SiteVerifyReply) -> VerificationResult {
    tracing::debug!(
        success = reply.success,
        error_codes = ?reply.error_codes,
        hostname = ?reply.hostname,
        "siteverify reply"
    );
    if reply.success {
        VerificationResult::valid()
    } else {
        VerificationResult::invalid(VERIFICATION_FAILED)
    }
}
