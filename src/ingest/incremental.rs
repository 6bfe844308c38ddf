//! Incremental ingestor for one live message event.
//!
//! At-most-once: a failed counter write is logged and dropped, never retried.
//! The statistics are eventually consistent and tolerate the loss.

use crate::datebucket::DateBucket;
use crate::ingest::RawMessageEvent;
use crate::store::operations::counters::{
    GeneralCounterKey, UserCounterDefaults, UserCounterKey,
};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    /// Bot-authored: nothing changes.
    IgnoredBot,
    /// General counter updated; user counter skipped for lack of consent.
    GeneralOnly,
    /// Both counters updated.
    Counted,
    /// A write failed and was dropped (logged).
    Dropped,
}

impl LiveOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IgnoredBot => "ignoredBot",
            Self::GeneralOnly => "generalOnly",
            Self::Counted => "counted",
            Self::Dropped => "dropped",
        }
    }
}

pub fn process_live_message(
    store: &Store,
    event: &RawMessageEvent,
    utc_offset_minutes: i32,
) -> LiveOutcome {
    if event.is_bot {
        return LiveOutcome::IgnoredBot;
    }

    let today = DateBucket::from_instant(event.created_at, utc_offset_minutes);
    let mut dropped = false;

    // Guild-scoped counter is consent-independent and always attempted.
    let general_key = GeneralCounterKey {
        guild_id: event.guild_id.clone(),
        channel_id: event.channel_id.clone(),
        date: today,
    };
    if let Err(e) = store.upsert_increment_general(&general_key, 1, &event.channel_name) {
        dropped = true;
        tracing::warn!(
            channel_id = %event.channel_id,
            error = %e,
            "Dropped general counter increment"
        );
    }

    // 先读 consent 再写入存在竞态（用户可能在两步之间撤回同意）；
    // 按最终一致性处理，不加锁。
    let consented = match store.get_consent(&event.user_id) {
        Ok(consent) => consent,
        Err(e) => {
            tracing::warn!(user_id = %event.user_id, error = %e, "Consent lookup failed, treating as false");
            false
        }
    };
    if !consented {
        return if dropped {
            LiveOutcome::Dropped
        } else {
            LiveOutcome::GeneralOnly
        };
    }

    let user_key = UserCounterKey {
        guild_id: event.guild_id.clone(),
        channel_id: event.channel_id.clone(),
        user_id: event.user_id.clone(),
        date: today,
    };
    let defaults = UserCounterDefaults {
        channel_name: event.channel_name.clone(),
        username: event.username.clone(),
        nickname: event.nickname.clone(),
    };
    if let Err(e) = store.upsert_increment_user(&user_key, 1, &defaults) {
        tracing::warn!(
            user_id = %event.user_id,
            channel_id = %event.channel_id,
            error = %e,
            "Dropped user counter increment"
        );
        return LiveOutcome::Dropped;
    }

    if dropped {
        LiveOutcome::Dropped
    } else {
        LiveOutcome::Counted
    }
}
