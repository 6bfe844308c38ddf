pub mod discord;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds of the platform epoch (2015-01-01T00:00:00Z) that snowflake
/// timestamps are measured from.
const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

/// Opaque, time-ordered message id used as the pagination cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageCursor(pub u64);

impl MessageCursor {
    /// Cursor pointing just before the first message created at `instant`.
    /// Instants before the platform epoch clamp to the zero cursor.
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        let offset_ms = instant.timestamp_millis() - SNOWFLAKE_EPOCH_MS;
        if offset_ms <= 0 {
            return Self(0);
        }
        Self((offset_ms as u64) << 22)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        let ms = (self.0 >> 22) as i64 + SNOWFLAKE_EPOCH_MS;
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for MessageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
    pub guild_id: String,
}

/// One message as seen by the crawler and census. Content never crosses this
/// boundary.
#[derive(Debug, Clone)]
pub struct SourceMessage {
    pub id: MessageCursor,
    pub channel_id: String,
    pub author_id: String,
    pub author_username: String,
    pub display_name: Option<String>,
    pub is_bot: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageQuery {
    pub limit: u16,
    pub after: Option<MessageCursor>,
    pub before: Option<MessageCursor>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// The channel exists but the credential cannot read it. Skipped and
    /// recorded, never fatal to siblings.
    #[error("permission denied for channel {channel_id}")]
    PermissionDenied { channel_id: String },
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected source response: {0}")]
    InvalidResponse(String),
}

/// The platform SDK's live guild/channel collections reduced to an explicit
/// capability. Pagination within one channel is sequential (each page depends
/// on the prior cursor); everything else may run concurrently.
#[async_trait]
pub trait Source: Send + Sync {
    async fn list_guilds(&self) -> Result<Vec<GuildRef>, SourceError>;

    /// Text-capable channels of one guild.
    async fn list_channels(&self, guild: &GuildRef) -> Result<Vec<ChannelRef>, SourceError>;

    /// One page of messages. The page is exhausted when the batch is empty or
    /// smaller than `query.limit`.
    async fn fetch_messages(
        &self,
        channel: &ChannelRef,
        query: &PageQuery,
    ) -> Result<Vec<SourceMessage>, SourceError>;

    /// Non-bot member count, the ceiling for the daily census.
    async fn non_bot_member_count(&self, guild: &GuildRef) -> Result<usize, SourceError>;
}

#[cfg(test)]
pub mod testing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips_through_time() {
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let cursor = MessageCursor::from_instant(instant);
        assert_eq!(cursor.timestamp(), instant);
    }

    #[test]
    fn cursor_clamps_before_platform_epoch() {
        let ancient = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(MessageCursor::from_instant(ancient), MessageCursor(0));
    }

    #[test]
    fn cursor_order_matches_time_order() {
        let earlier = MessageCursor::from_instant(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        let later = MessageCursor::from_instant(Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap());
        assert!(earlier < later);
    }

    #[test]
    fn cursor_parses_decimal_ids() {
        assert_eq!(MessageCursor::parse("1234567890"), Some(MessageCursor(1234567890)));
        assert_eq!(MessageCursor::parse("not-a-cursor"), None);
    }
}
