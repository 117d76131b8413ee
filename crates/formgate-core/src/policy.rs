use std::cmp::Ordering;

use crate::error::PolicyError;
use crate::verification::VerificationResult;

pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.4;

const INVALID_TOKEN_FALLBACK: &str = "Invalid token";
const ACTION_MISMATCH_MESSAGE: &str = "Action mismatch";
const LOW_SCORE_MESSAGE: &str = "Low reCAPTCHA score";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyConfig {
    score_threshold: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

impl PolicyConfig {
    pub fn new(score_threshold: f64) -> Result<Self, PolicyError> {
        if !score_threshold.is_finite() || !(0.0..=1.0).contains(&score_threshold) {
            return Err(PolicyError::InvalidThreshold(score_threshold));
        }
        Ok(Self { score_threshold })
    }

    pub const fn score_threshold(&self) -> f64 {
        self.score_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidToken,
    ActionMismatch,
    LowScore,
}

impl RejectReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::ActionMismatch => "action_mismatch",
            Self::LowScore => "low_score",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub accepted: bool,
    pub score: Option<f64>,
    pub error_message: Option<String>,
    pub reasons: Option<Vec<String>>,
    pub reject_reason: Option<RejectReason>,
}

impl Decision {
    fn accept(score: Option<f64>, reasons: Option<Vec<String>>) -> Self {
        Self {
            accepted: true,
            score,
            error_message: None,
            reasons,
            reject_reason: None,
        }
    }

    fn reject(reason: RejectReason, message: String) -> Self {
        Self {
            accepted: false,
            score: None,
            error_message: Some(message),
            reasons: None,
            reject_reason: Some(reason),
        }
    }

    pub fn outcome_label(&self) -> &'static str {
        match self.reject_reason {
            None => "accepted",
            Some(reason) => reason.as_str(),
        }
    }
}

/// Applies validity, action match and score threshold in that order; the
/// first failing check determines the reported reason.
///
/// Action and score checks only run when the backend reported those fields,
/// so the simple protocol skips both. Score and reasons ride along whenever a
/// score exists and the earlier checks passed.
pub fn decide(
    result: &VerificationResult,
    policy: &PolicyConfig,
    declared_action: &str,
) -> Decision {
    if !result.token_valid {
        let reason = result
            .invalid_reason
            .as_deref()
            .filter(|reason| !reason.is_empty())
            .unwrap_or(INVALID_TOKEN_FALLBACK);
        return Decision::reject(
            RejectReason::InvalidToken,
            format!("Invalid token: {reason}"),
        );
    }

    if let Some(action) = result.returned_action.as_deref() {
        if action != declared_action {
            return Decision::reject(RejectReason::ActionMismatch, ACTION_MISMATCH_MESSAGE.to_string());
        }
    }

    let Some(score) = result.score else {
        return Decision::accept(None, None);
    };

    // NaN never clears the threshold.
    if matches!(
        score.partial_cmp(&policy.score_threshold),
        None | Some(Ordering::Less)
    ) {
        let mut decision = Decision::reject(RejectReason::LowScore, LOW_SCORE_MESSAGE.to_string());
        decision.score = Some(score);
        decision.reasons = Some(result.reasons.clone());
        return decision;
    }

    Decision::accept(Some(score), Some(result.reasons.clone()))
}
