#![no_main]

use formgate_core::{SubmissionContext, TransportMeta};
use formgate_daemon::submission::{decode_json_fields, decode_urlencoded_fields};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for decoded in [decode_json_fields(data), decode_urlencoded_fields(data)] {
        let Ok(fields) = decoded else {
            continue;
        };
        match SubmissionContext::extract(&fields, TransportMeta::default()) {
            Ok(ctx) => {
                assert!(!ctx.token.is_empty());
                assert!(!ctx.declared_action.is_empty());
            }
            Err(_) => {
                assert!(fields
                    .get("g-recaptcha-response")
                    .map_or(true, |token| token.is_empty()));
            }
        }
    }
});
