use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::datebucket::{DateBucket, DateRange};
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::counters::GeneralCounterKey;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add", post(add_message))
        .route("/stats", get(get_stats))
        .route("/active-users", get(get_active_users).post(save_active_users))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMessageRequest {
    guild_id: String,
    channel_id: String,
    channel_name: String,
}

/// Guild-scoped increment: consent-independent by design, no user dimension.
async fn add_message(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AddMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let key = GeneralCounterKey {
        guild_id: req.guild_id,
        channel_id: req.channel_id,
        date: DateBucket::today(state.config().utc_offset_minutes),
    };
    let row = state
        .store()
        .upsert_increment_general(&key, 1, &req.channel_name)?;
    Ok(ok(row))
}

#[derive(Debug, Deserialize)]
struct GeneralStatsQuery {
    /// YYYYMMDD；缺省为今天
    date: Option<String>,
}

async fn get_stats(
    State(state): State<AppState>,
    Query(q): Query<GeneralStatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let date = match q.date.as_deref() {
        Some(raw) => DateBucket::parse_compact(raw)
            .map_err(|msg| AppError::bad_request("INVALID_DATE", msg))?,
        None => DateBucket::today(state.config().utc_offset_minutes),
    };

    let rows = state.store().query_general_counters(date)?;
    if rows.is_empty() {
        return Err(AppError::not_found("No activity found for the given day"));
    }
    Ok(ok(rows))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveActiveUsersRequest {
    /// ISO date, YYYY-MM-DD.
    date: String,
    active_users: u64,
}

async fn save_active_users(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SaveActiveUsersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let date = DateBucket::parse_iso(&req.date)
        .map_err(|msg| AppError::bad_request("INVALID_DATE", msg))?;
    let row = state
        .store()
        .save_daily_active_users(date, req.active_users)?;
    Ok(ok(row))
}

#[derive(Debug, Deserialize)]
struct ActiveUsersQuery {
    date: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActiveUsersRangeResponse {
    start: DateBucket,
    end: DateBucket,
    active_users: u64,
}

/// Exact date returns the stored row; a range returns the per-day maximum
/// (a peak, never a sum).
async fn get_active_users(
    State(state): State<AppState>,
    Query(q): Query<ActiveUsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let parse = |raw: Option<&str>| -> Result<Option<DateBucket>, AppError> {
        raw.map(DateBucket::parse_iso)
            .transpose()
            .map_err(|msg| AppError::bad_request("INVALID_DATE", msg))
    };

    if let Some(date) = parse(q.date.as_deref())? {
        let row = state
            .store()
            .get_daily_active_users(date)?
            .ok_or_else(|| AppError::not_found("No active-user record for that day"))?;
        return Ok(ok(row).into_response());
    }

    // 无参数的查询不退化为全量峰值
    if q.start.is_none() && q.end.is_none() {
        return Err(AppError::bad_request(
            "INVALID_DATE_RANGE",
            "Please provide either a date or a date range",
        ));
    }

    let today = DateBucket::today(state.config().utc_offset_minutes);
    let range = DateRange::resolve(None, parse(q.start.as_deref())?, parse(q.end.as_deref())?, today)
        .map_err(|msg| AppError::bad_request("INVALID_DATE_RANGE", msg))?;

    let peak = state
        .store()
        .max_daily_active_users(range)?
        .ok_or_else(|| AppError::not_found("No active-user records in that range"))?;

    Ok(ok(ActiveUsersRangeResponse {
        start: range.start,
        end: range.end,
        active_users: peak,
    })
    .into_response())
}
