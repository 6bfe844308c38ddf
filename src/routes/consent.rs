use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::extractors::JsonBody;
use crate::ingest::backfill::{BackfillCrawler, BackfillMode};
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(set_consent))
        .route("/:user_id", get(get_consent))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetConsentRequest {
    user_id: String,
    consent: bool,
}

/// Stores the consent flag. A false-to-true transition kicks off a background
/// backfill of the user's history when a platform credential is configured.
async fn set_consent(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SetConsentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let previous = state.store().get_consent(&req.user_id)?;
    let record = state.store().set_consent(&req.user_id, req.consent)?;

    if req.consent && !previous {
        match state.source() {
            Some(source) => {
                let crawler = BackfillCrawler::new(
                    state.store_arc(),
                    source.clone(),
                    &state.config().backfill,
                    state.config().utc_offset_minutes,
                );
                let user_id = req.user_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = crawler.run(&BackfillMode::User(user_id.clone())).await {
                        tracing::warn!(user_id = %user_id, error = %e, "Consent backfill failed");
                    }
                });
            }
            None => {
                tracing::info!(
                    user_id = %req.user_id,
                    "Consent granted with no source configured; skipping backfill"
                );
            }
        }
    }

    Ok(ok(record))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsentResponse {
    consent: bool,
}

/// Unknown users read as consent=false.
async fn get_consent(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let consent = state.store().get_consent(&user_id)?;
    Ok(ok(ConsentResponse { consent }))
}
