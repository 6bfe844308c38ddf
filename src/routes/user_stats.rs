use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TOP_CHANNELS_LIMIT;
use crate::datebucket::{DateBucket, DateRange};
use crate::extractors::JsonBody;
use crate::ingest::grouping::process_user_batch;
use crate::ingest::incremental::process_live_message;
use crate::ingest::RawMessageEvent;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::counters::{UserCounterDefaults, UserCounterKey, UserStatsFilter};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add", post(add_message))
        .route("/stats", get(get_stats))
        .route("/top-channels", get(top_channels))
        .route("/process-message", post(process_message))
        .route("/process-messages", post(process_messages))
        .route("/delete-user/:user_id", delete(delete_user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMessageRequest {
    guild_id: String,
    channel_id: String,
    channel_name: String,
    user_id: String,
    username: String,
    nickname: Option<String>,
}

/// One live message already reduced to metadata by the caller. The day bucket
/// is derived server-side.
async fn add_message(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AddMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store().get_consent(&req.user_id)? {
        return Err(AppError::consent_denied(&req.user_id));
    }

    let key = UserCounterKey {
        guild_id: req.guild_id,
        channel_id: req.channel_id,
        user_id: req.user_id,
        date: DateBucket::today(state.config().utc_offset_minutes),
    };
    let defaults = UserCounterDefaults {
        channel_name: req.channel_name,
        username: req.username,
        nickname: req.nickname,
    };
    let row = state.store().upsert_increment_user(&key, 1, &defaults)?;
    Ok(ok(row))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessMessageRequest {
    guild_id: String,
    channel_id: String,
    channel_name: String,
    user_id: String,
    username: String,
    nickname: Option<String>,
    #[serde(default)]
    is_bot: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessMessageResponse {
    outcome: &'static str,
}

/// Combined live-message entry point: the guild counter is always updated,
/// the user counter only under consent. Never rejects for missing consent.
async fn process_message(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ProcessMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let event = RawMessageEvent {
        guild_id: req.guild_id,
        channel_id: req.channel_id,
        channel_name: req.channel_name,
        user_id: req.user_id,
        username: req.username,
        nickname: req.nickname,
        created_at: Utc::now(),
        is_bot: req.is_bot,
    };
    let outcome = process_live_message(
        state.store(),
        &event,
        state.config().utc_offset_minutes,
    );
    Ok(ok(ProcessMessageResponse {
        outcome: outcome.as_str(),
    }))
}

/// 与原有查询契约一致：username 与 userid 为 OR 关系，日期为 YYYYMMDD
#[derive(Debug, Deserialize)]
struct StatsQuery {
    username: Option<String>,
    userid: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

impl StatsQuery {
    fn filter(&self, utc_offset_minutes: i32) -> Result<UserStatsFilter, AppError> {
        let start = self.parse_date(self.start.as_deref())?;
        let end = self.parse_date(self.end.as_deref())?;
        let range = DateRange::resolve(None, start, end, DateBucket::today(utc_offset_minutes))
            .map_err(|msg| AppError::bad_request("INVALID_DATE_RANGE", msg))?;

        Ok(UserStatsFilter {
            username: self.username.clone(),
            user_id: self.userid.clone(),
            range,
        })
    }

    fn parse_date(&self, raw: Option<&str>) -> Result<Option<DateBucket>, AppError> {
        raw.map(DateBucket::parse_compact)
            .transpose()
            .map_err(|msg| AppError::bad_request("INVALID_DATE", msg))
    }
}

async fn get_stats(
    State(state): State<AppState>,
    Query(q): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.filter(state.config().utc_offset_minutes)?;
    let rows = state.store().query_user_counters(&filter)?;
    if rows.is_empty() {
        return Err(AppError::not_found(
            "No activity found for the given user and range",
        ));
    }
    Ok(ok(rows))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopChannelsResponse {
    total_message_count: u64,
    top_channels: Vec<crate::store::operations::counters::ChannelRank>,
}

async fn top_channels(
    State(state): State<AppState>,
    Query(q): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.filter(state.config().utc_offset_minutes)?;
    let ranked = state
        .store()
        .rank_top_channels(&filter, TOP_CHANNELS_LIMIT)?;
    if ranked.is_empty() {
        return Err(AppError::not_found(
            "No activity found for the given user and range",
        ));
    }
    let total = state.store().total_count(&filter)?;
    Ok(ok(TopChannelsResponse {
        total_message_count: total,
        top_channels: ranked,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchMessage {
    channel_id: String,
    channel_name: String,
    created_at: DateTime<Utc>,
    username: String,
    nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessMessagesRequest {
    user_id: String,
    guild_id: String,
    messages: Vec<BatchMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessMessagesResponse {
    processed: u64,
    distinct_keys: usize,
    failed_keys: usize,
}

async fn process_messages(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ProcessMessagesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let events: Vec<RawMessageEvent> = req
        .messages
        .iter()
        .map(|m| RawMessageEvent {
            guild_id: req.guild_id.clone(),
            channel_id: m.channel_id.clone(),
            channel_name: m.channel_name.clone(),
            user_id: req.user_id.clone(),
            username: m.username.clone(),
            nickname: m.nickname.clone(),
            created_at: m.created_at,
            is_bot: false,
        })
        .collect();

    let outcome = process_user_batch(
        state.store(),
        &req.user_id,
        &events,
        state.config().utc_offset_minutes,
    )?;

    Ok(ok(ProcessMessagesResponse {
        processed: outcome.total_messages,
        distinct_keys: outcome.distinct_keys,
        failed_keys: outcome.failed_keys,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteUserResponse {
    deleted: u64,
}

async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state.store().delete_all_for_user(&user_id)?;
    tracing::info!(user_id = %user_id, deleted, "User activity rows deleted");
    Ok(ok(DeleteUserResponse { deleted }))
}
