// Copyright (c) 2026 The formgate Authors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Decision core for formgate: submission context extraction, the normalized
//! verification result, the admit/deny policy and the caller-facing response.

pub mod context;
pub mod error;
pub mod policy;
pub mod public_error;
pub mod response;
pub mod verification;

pub use context::{SubmissionContext, SubmissionFields, TransportMeta};
pub use error::{ExtractError, GateError, GateResult, PolicyError, VerificationError};
pub use policy::{decide, Decision, PolicyConfig, RejectReason};
pub use response::{format_decision, format_error, VerifyResponse};
pub use verification::VerificationResult;
