pub mod backfill;
pub mod census;
pub mod grouping;
pub mod incremental;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::source::SourceError;
use crate::store::StoreError;

/// One message event on its way into the counters. Ephemeral: never persisted,
/// and message content never reaches this type.
#[derive(Debug, Clone)]
pub struct RawMessageEvent {
    pub guild_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub username: String,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_bot: bool,
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Blocks user-scoped writes only; guild-scoped counters are unaffected.
    #[error("user {0} has not consented to activity tracking")]
    ConsentDenied(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
}
