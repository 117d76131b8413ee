/// Normalized outcome of one backend call.
///
/// `score` and `returned_action` are `None` when the protocol has no such
/// concept. When `token_valid` is false neither carries decision weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationResult {
    pub token_valid: bool,
    pub invalid_reason: Option<String>,
    pub returned_action: Option<String>,
    pub score: Option<f64>,
    pub reasons: Vec<String>,
}

impl VerificationResult {
    pub fn valid() -> Self {
        Self {
            token_valid: true,
            ..Self::default()
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            token_valid: false,
            invalid_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}
