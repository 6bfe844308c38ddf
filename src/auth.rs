//! Shared-secret request signing.
//!
//! Every protected request carries an `authorization` header holding the
//! hex-encoded HMAC-SHA256 of the exact request body. Bodyless requests sign
//! the literal `{}` so GET and DELETE stay verifiable. A missing header is
//! 401, a mismatched one is 403.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use sha2::Sha256;

use crate::response::AppError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Payload signed when the body is empty.
const EMPTY_BODY_PAYLOAD: &[u8] = b"{}";

pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal(&format!("hmac key rejected: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify_payload(secret: &str, payload: &[u8], provided_hex: &str) -> Result<(), AppError> {
    let provided = hex::decode(provided_hex)
        .map_err(|_| AppError::forbidden("SIGNATURE_MISMATCH", "Invalid request signature"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal(&format!("hmac key rejected: {e}")))?;
    mac.update(payload);
    // Mac::verify_slice 为常数时间比较
    mac.verify_slice(&provided)
        .map_err(|_| AppError::forbidden("SIGNATURE_MISMATCH", "Invalid request signature"))
}

pub async fn signature_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    match check_signature(&state, req).await {
        Ok(req) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// Buffers the body to verify it, then rebuilds the request with the same
/// bytes so downstream extractors see an untouched body.
async fn check_signature(state: &AppState, req: Request) -> Result<Request, AppError> {
    let (parts, body) = req.into_parts();

    let provided = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .ok_or_else(|| AppError::unauthorized("Missing request signature"))?;

    let bytes = body
        .collect()
        .await
        .map_err(|_| AppError::bad_request("INVALID_REQUEST_BODY", "Invalid request body"))?
        .to_bytes();

    let payload: &[u8] = if bytes.is_empty() {
        EMPTY_BODY_PAYLOAD
    } else {
        &bytes
    };
    verify_payload(&state.config().api_secret, payload, &provided)?;

    Ok(Request::from_parts(parts, Body::from(bytes)))
}
