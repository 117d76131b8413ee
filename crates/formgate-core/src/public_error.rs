use crate::error::{ExtractError, GateError, VerificationError};

/// Stable public codes for failures that happen before a decision exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicErrorCode {
    MissingToken,
    Misconfigured,
    Unavailable,
}

impl PublicErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::Misconfigured => "MISCONFIGURED",
            Self::Unavailable => "UNAVAILABLE",
        }
    }

    /// Caller-facing text. Never names the missing key or the backend fault.
    pub const fn message(self) -> &'static str {
        match self {
            Self::MissingToken => "Missing reCAPTCHA token",
            Self::Misconfigured => "Server configuration error",
            Self::Unavailable => "Error verifying reCAPTCHA",
        }
    }
}

impl From<&GateError> for PublicErrorCode {
    fn from(err: &GateError) -> Self {
        match err {
            GateError::Extract(ExtractError::MissingToken) => Self::MissingToken,
            GateError::Verification(VerificationError::Misconfigured(_)) => Self::Misconfigured,
            GateError::Verification(VerificationError::BackendUnavailable(_)) => Self::Unavailable,
        }
    }
}
