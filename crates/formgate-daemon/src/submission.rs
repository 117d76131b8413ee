use std::net::IpAddr;

use axum::body::Body;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{FromRequest, Request};
use axum::http::header::{CONTENT_TYPE, USER_AGENT};
use axum::http::HeaderMap;
use bytes::Bytes;
use formgate_core::{SubmissionFields, TransportMeta};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON body is not an object")]
    NotAnObject,

    #[error("invalid urlencoded body: {0}")]
    UrlEncoded(#[from] serde_urlencoded::de::Error),

    #[error("invalid multipart request: {0}")]
    MultipartRequest(#[from] MultipartRejection),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Multipart,
    UrlEncoded,
}

fn body_kind(content_type: &str) -> BodyKind {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if mime == "application/json" || mime.ends_with("+json") {
        BodyKind::Json
    } else if mime == "multipart/form-data" {
        BodyKind::Multipart
    } else {
        BodyKind::UrlEncoded
    }
}

/// Decodes a submission body according to its content type. Bodies that
/// cannot be decoded yield no fields, which downstream reads as a missing
/// token rather than a transport failure.
pub async fn decode_fields(headers: &HeaderMap, body: Bytes) -> SubmissionFields {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let decoded = match body_kind(content_type) {
        BodyKind::Json => decode_json_fields(&body),
        BodyKind::UrlEncoded => decode_urlencoded_fields(&body),
        BodyKind::Multipart => decode_multipart_fields(headers, body).await,
    };
    decoded.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "submission body not decodable");
        SubmissionFields::new()
    })
}

/// Scalar members only; strings are taken verbatim, `true` and non-zero
/// numbers in their JSON spelling. Falsy scalars (`false`, `0`, `""`) count
/// as absent, as do null, arrays and objects.
pub fn decode_json_fields(body: &[u8]) -> Result<SubmissionFields, BodyError> {
    if body.is_empty() {
        return Ok(SubmissionFields::new());
    }
    let Value::Object(map) = serde_json::from_slice::<Value>(body)? else {
        return Err(BodyError::NotAnObject);
    };
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) if !s.is_empty() => s,
                Value::Bool(true) => true.to_string(),
                Value::Number(n) if n.as_f64() != Some(0.0) => n.to_string(),
                _ => return None,
            };
            Some((key, value))
        })
        .collect())
}

/// Repeated keys keep their first value.
pub fn decode_urlencoded_fields(body: &[u8]) -> Result<SubmissionFields, BodyError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)?;
    let mut fields = SubmissionFields::new();
    for (key, value) in pairs {
        fields.entry(key).or_insert(value);
    }
    Ok(fields)
}

/// Text parts only; file parts are skipped.
async fn decode_multipart_fields(
    headers: &HeaderMap,
    body: Bytes,
) -> Result<SubmissionFields, BodyError> {
    let mut request = Request::new(Body::from(body));
    *request.headers_mut() = headers.clone();
    let mut multipart = Multipart::from_request(request, &()).await?;
    let mut fields = SubmissionFields::new();
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await?;
        fields.entry(name).or_insert(value);
    }
    Ok(fields)
}

/// Client IP and user agent, best effort. Forwarding headers are honoured
/// only when the deployment sits behind a trusted proxy.
pub fn transport_meta(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_forwarded_for: bool,
) -> TransportMeta {
    let forwarded = if trust_forwarded_for {
        forwarded_client_ip(headers)
    } else {
        None
    };
    let client_ip = forwarded.or_else(|| peer.map(|ip| ip.to_canonical().to_string()));
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    TransportMeta {
        client_ip,
        user_agent,
    }
}

fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    let usable = |value: &str| {
        let value = value.trim();
        (!value.is_empty() && !value.eq_ignore_ascii_case("unknown")).then(|| value.to_string())
    };
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(usable)
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(usable)
        })
}
