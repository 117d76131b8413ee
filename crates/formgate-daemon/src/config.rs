use std::fmt;

use formgate_core::{PolicyConfig, PolicyError, VerificationError};
use thiserror::Error;

use crate::verifier::assessment::{MissingScorePolicy, DEFAULT_ASSESSMENT_ENDPOINT};
use crate::verifier::simple::DEFAULT_SITEVERIFY_URL;
use crate::verifier::Protocol;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "https://www.yucelacin.com";

pub const PORT_ENV: &str = "PORT";
pub const ALLOWED_ORIGIN_ENV: &str = "FORMGATE_ALLOWED_ORIGIN";
pub const MAX_BODY_BYTES_ENV: &str = "FORMGATE_MAX_BODY_BYTES";
pub const BACKEND_TIMEOUT_MS_ENV: &str = "FORMGATE_BACKEND_TIMEOUT_MS";
pub const TRUST_FORWARDED_FOR_ENV: &str = "FORMGATE_TRUST_FORWARDED_FOR";
pub const PROTOCOL_ENV: &str = "RECAPTCHA_PROTOCOL";
pub const SECRET_KEY_ENV: &str = "RECAPTCHA_SECRET_KEY";
pub const SITE_KEY_ENV: &str = "RECAPTCHA_SITE_KEY";
pub const PROJECT_ID_ENV: &str = "RECAPTCHA_PROJECT_ID";
pub const API_KEY_ENV: &str = "RECAPTCHA_API_KEY";
pub const ACCESS_TOKEN_ENV: &str = "RECAPTCHA_ACCESS_TOKEN";
pub const SCORE_THRESHOLD_ENV: &str = "RECAPTCHA_SCORE_THRESHOLD";
pub const MISSING_SCORE_ENV: &str = "RECAPTCHA_MISSING_SCORE";
pub const SITEVERIFY_URL_ENV: &str = "RECAPTCHA_SITEVERIFY_URL";
pub const ASSESSMENT_ENDPOINT_ENV: &str = "RECAPTCHA_ASSESSMENT_ENDPOINT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Credential presented to the assessment API.
#[derive(Clone, PartialEq, Eq)]
pub enum AssessmentCredential {
    ApiKey(String),
    BearerToken(String),
}

impl fmt::Debug for AssessmentCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
        }
    }
}

#[derive(Clone)]
pub struct VerifierConfig {
    pub protocol: Protocol,
    pub secret_key: Option<String>,
    pub site_key: Option<String>,
    pub project_id: Option<String>,
    pub credential: Option<AssessmentCredential>,
    pub siteverify_url: String,
    pub assessment_endpoint: String,
    pub missing_score: MissingScorePolicy,
}

impl fmt::Debug for VerifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("protocol", &self.protocol)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("site_key", &self.site_key)
            .field("project_id", &self.project_id)
            .field("credential", &self.credential)
            .field("siteverify_url", &self.siteverify_url)
            .field("assessment_endpoint", &self.assessment_endpoint)
            .field("missing_score", &self.missing_score)
            .finish()
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::RiskAssessment,
            secret_key: None,
            site_key: None,
            project_id: None,
            credential: None,
            siteverify_url: DEFAULT_SITEVERIFY_URL.to_string(),
            assessment_endpoint: DEFAULT_ASSESSMENT_ENDPOINT.to_string(),
            missing_score: MissingScorePolicy::default(),
        }
    }
}

impl VerifierConfig {
    /// Reports the first identifier the selected protocol needs but lacks.
    pub fn validate(&self) -> Result<(), VerificationError> {
        match self.protocol {
            Protocol::Simple => {
                require(self.secret_key.as_deref(), "secret key")?;
            }
            Protocol::RiskAssessment => {
                require(self.project_id.as_deref(), "project id")?;
                require(self.site_key.as_deref(), "site key")?;
                if self.credential.is_none() {
                    return Err(VerificationError::Misconfigured("assessment credential"));
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn require<'a>(
    value: Option<&'a str>,
    name: &'static str,
) -> Result<&'a str, VerificationError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(VerificationError::Misconfigured(name))
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub listen: String,
    pub allowed_origin: String,
    pub max_body_bytes: usize,
    pub backend_timeout_ms: u64,
    pub trust_forwarded_for: bool,
    pub policy: PolicyConfig,
    pub verifier: VerifierConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            listen: format!("0.0.0.0:{DEFAULT_PORT}"),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            max_body_bytes: 65_536,
            backend_timeout_ms: 3_000,
            trust_forwarded_for: false,
            policy: PolicyConfig::default(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl GateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Missing
    /// credentials are not an error here; `VerifierConfig::validate` reports
    /// them so the endpoint can answer with a configuration fault.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = read(PORT_ENV) {
            let port: u16 = parse_value(PORT_ENV, &port)?;
            cfg.listen = format!("0.0.0.0:{port}");
        }
        if let Some(origin) = read(ALLOWED_ORIGIN_ENV) {
            cfg.allowed_origin = origin;
        }
        if let Some(raw) = read(MAX_BODY_BYTES_ENV) {
            cfg.max_body_bytes = parse_positive(MAX_BODY_BYTES_ENV, &raw)?;
        }
        if let Some(raw) = read(BACKEND_TIMEOUT_MS_ENV) {
            cfg.backend_timeout_ms = parse_positive(BACKEND_TIMEOUT_MS_ENV, &raw)?;
        }
        if let Some(raw) = read(TRUST_FORWARDED_FOR_ENV) {
            cfg.trust_forwarded_for = parse_flag(TRUST_FORWARDED_FOR_ENV, &raw)?;
        }
        if let Some(raw) = read(SCORE_THRESHOLD_ENV) {
            cfg.policy = PolicyConfig::new(parse_value(SCORE_THRESHOLD_ENV, &raw)?)?;
        }

        let verifier = &mut cfg.verifier;
        if let Some(raw) = read(PROTOCOL_ENV) {
            verifier.protocol = Protocol::parse(&raw).ok_or(ConfigError::InvalidValue {
                name: PROTOCOL_ENV,
                value: raw,
            })?;
        }
        if let Some(raw) = read(MISSING_SCORE_ENV) {
            verifier.missing_score =
                MissingScorePolicy::parse(&raw).ok_or(ConfigError::InvalidValue {
                    name: MISSING_SCORE_ENV,
                    value: raw,
                })?;
        }
        verifier.secret_key = read(SECRET_KEY_ENV);
        verifier.site_key = read(SITE_KEY_ENV);
        verifier.project_id = read(PROJECT_ID_ENV);
        verifier.credential = read(API_KEY_ENV)
            .map(AssessmentCredential::ApiKey)
            .or_else(|| read(ACCESS_TOKEN_ENV).map(AssessmentCredential::BearerToken));
        if let Some(url) = read(SITEVERIFY_URL_ENV) {
            verifier.siteverify_url = url;
        }
        if let Some(endpoint) = read(ASSESSMENT_ENDPOINT_ENV) {
            verifier.assessment_endpoint = endpoint;
        }
        Ok(cfg)
    }
}

fn parse_value<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name,
        value: raw.to_string(),
    })
}

fn parse_positive<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let value: T = parse_value(name, raw)?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        });
    }
    Ok(value)
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}
