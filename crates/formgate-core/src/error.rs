use thiserror::Error;

pub type GateResult<T> = Result<T, GateError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("submission carries no reCAPTCHA token")]
    MissingToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// A required identifier for the selected protocol is absent. The name is
    /// for operator logs only.
    #[error("verifier misconfigured: missing {0}")]
    Misconfigured(&'static str),

    #[error("verification backend unavailable: {0}")]
    BackendUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("score threshold must be a finite value in [0, 1], got {0}")]
    InvalidThreshold(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl GateError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Extract(ExtractError::MissingToken) => "missing_token",
            Self::Verification(VerificationError::Misconfigured(_)) => "misconfigured",
            Self::Verification(VerificationError::BackendUnavailable(_)) => "backend_unavailable",
        }
    }
}
