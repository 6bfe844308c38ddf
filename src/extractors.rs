use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::response::AppError;

/// `axum::Json` with the error envelope as its rejection. The concrete reason
/// (syntax, data shape, content-type, body read) is logged server-side only;
/// clients always get the same generic 400.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(reject)?;
        Ok(JsonBody(value))
    }
}

fn reject(rejection: JsonRejection) -> AppError {
    tracing::warn!(
        status = %rejection.status(),
        detail = %rejection.body_text(),
        "Request body rejected"
    );
    AppError::bad_request("INVALID_REQUEST_BODY", "Invalid request body")
}
