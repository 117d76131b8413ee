use std::collections::BTreeMap;

use crate::error::ExtractError;

pub const TOKEN_FIELD: &str = "g-recaptcha-response";
pub const ACTION_FIELD: &str = "action";
pub const DEFAULT_ACTION: &str = "submit";

/// Decoded submission fields. Only scalar values survive decoding.
pub type SubmissionFields = BTreeMap<String, String>;

/// Best-effort signals supplied by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMeta {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionContext {
    pub token: String,
    pub declared_action: String,
    pub client_ip: String,
    pub user_agent: String,
}

impl SubmissionContext {
    /// Builds the per-request context. Fails only when the token is absent or
    /// empty; missing transport signals become empty strings.
    pub fn extract(fields: &SubmissionFields, meta: TransportMeta) -> Result<Self, ExtractError> {
        let token = fields
            .get(TOKEN_FIELD)
            .filter(|token| !token.is_empty())
            .ok_or(ExtractError::MissingToken)?;
        let declared_action = fields
            .get(ACTION_FIELD)
            .filter(|action| !action.is_empty())
            .map(String::as_str)
            .unwrap_or(DEFAULT_ACTION);

        Ok(Self {
            token: token.clone(),
            declared_action: declared_action.to_string(),
            client_ip: meta.client_ip.unwrap_or_default(),
            user_agent: meta.user_agent.unwrap_or_default(),
        })
    }
}
