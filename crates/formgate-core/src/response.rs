use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::policy::Decision;
use crate::public_error::PublicErrorCode;

/// Caller-facing result. Absent fields are omitted from the JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
}

pub fn format_decision(decision: &Decision) -> VerifyResponse {
    VerifyResponse {
        success: decision.accepted,
        score: decision.score,
        error: decision.error_message.clone(),
        reasons: decision.reasons.clone(),
    }
}

pub fn format_error(err: &GateError) -> VerifyResponse {
    VerifyResponse {
        success: false,
        score: None,
        error: Some(PublicErrorCode::from(err).message().to_string()),
        reasons: None,
    }
}
