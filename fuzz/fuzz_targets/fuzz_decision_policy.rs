#![no_main]

use arbitrary::Arbitrary;
use formgate_core::{decide, format_decision, PolicyConfig, RejectReason, VerificationResult};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    token_valid: bool,
    invalid_reason: Option<String>,
    returned_action: Option<String>,
    declared_action: String,
    score: Option<f64>,
    reasons: Vec<String>,
    threshold: u8,
}

fuzz_target!(|input: Input| {
    let threshold = f64::from(input.threshold) / f64::from(u8::MAX);
    let Ok(policy) = PolicyConfig::new(threshold) else {
        return;
    };
    let result = VerificationResult {
        token_valid: input.token_valid,
        invalid_reason: input.invalid_reason,
        returned_action: input.returned_action,
        score: input.score,
        reasons: input.reasons,
    };
    let decision = decide(&result, &policy, &input.declared_action);
    let response = format_decision(&decision);

    assert_eq!(response.success, decision.accepted);
    assert_eq!(response.error.is_some(), !decision.accepted);
    if !result.token_valid {
        assert_eq!(decision.reject_reason, Some(RejectReason::InvalidToken));
    }
    if decision.accepted {
        if let Some(score) = result.score {
            assert!(score >= threshold);
        }
    }
});
