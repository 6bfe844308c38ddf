use serde_json::Value;

use activity_backend::auth::sign_payload;

use super::app::TEST_SECRET;

/// Signature for the exact bytes the request helper will send. A missing body
/// signs the literal `{}`.
pub fn signature_for(body: Option<&Value>) -> String {
    let payload = body
        .map(|b| b.to_string())
        .unwrap_or_else(|| "{}".to_string());
    sign_payload(TEST_SECRET, payload.as_bytes()).expect("sign payload")
}

pub fn signed_headers(body: Option<&Value>) -> Vec<(&'static str, String)> {
    vec![("authorization", signature_for(body))]
}
