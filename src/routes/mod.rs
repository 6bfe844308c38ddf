pub mod consent;
pub mod general_stats;
pub mod health;
pub mod user_stats;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::auth;
use crate::middleware::request_id;
use crate::state::AppState;

/// Maximum request body size: 2 MiB.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let signed = Router::new()
        .nest("/user-stats", user_stats::router())
        .nest("/general-stats", general_stats::router())
        .nest("/user-consent", consent::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::signature_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .merge(signed)
        .nest("/health", health::router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
