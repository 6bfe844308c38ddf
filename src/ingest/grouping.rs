//! Grouping / batch-upsert engine.
//!
//! Reduces a batch of raw events to one summed delta per counter key, then
//! applies one atomic upsert per key. There is no batch-level atomicity: a
//! failed key is logged and skipped, the remaining keys still apply.

use std::collections::HashMap;

use crate::datebucket::DateBucket;
use crate::ingest::{IngestError, RawMessageEvent};
use crate::store::operations::counters::{
    GeneralCounterKey, UserCounterDefaults, UserCounterKey,
};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct UserDelta {
    pub key: UserCounterKey,
    pub count: u64,
    pub defaults: UserCounterDefaults,
}

#[derive(Debug, Clone)]
pub struct GeneralDelta {
    pub key: GeneralCounterKey,
    pub count: u64,
    pub channel_name: String,
}

/// Outcome of one batch application. `failed_keys` counts per-key upsert
/// failures that were logged and skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub distinct_keys: usize,
    pub applied_keys: usize,
    pub failed_keys: usize,
    pub total_messages: u64,
}

/// Group a user's events by (channel, day). Bot events are dropped outright;
/// descriptive fields take the first-seen value within the group.
pub fn group_user_events(
    user_id: &str,
    events: &[RawMessageEvent],
    utc_offset_minutes: i32,
) -> Vec<UserDelta> {
    let mut order: Vec<UserDelta> = Vec::new();
    let mut index: HashMap<(String, DateBucket), usize> = HashMap::new();

    for event in events {
        if event.is_bot {
            continue;
        }
        let date = DateBucket::from_instant(event.created_at, utc_offset_minutes);
        match index.get(&(event.channel_id.clone(), date)) {
            Some(&at) => order[at].count += 1,
            None => {
                index.insert((event.channel_id.clone(), date), order.len());
                order.push(UserDelta {
                    key: UserCounterKey {
                        guild_id: event.guild_id.clone(),
                        channel_id: event.channel_id.clone(),
                        user_id: user_id.to_string(),
                        date,
                    },
                    count: 1,
                    defaults: UserCounterDefaults {
                        channel_name: event.channel_name.clone(),
                        username: event.username.clone(),
                        nickname: event.nickname.clone(),
                    },
                });
            }
        }
    }
    order
}

/// Group events by (channel, day) with no user dimension.
pub fn group_general_events(
    events: &[RawMessageEvent],
    utc_offset_minutes: i32,
) -> Vec<GeneralDelta> {
    let mut order: Vec<GeneralDelta> = Vec::new();
    let mut index: HashMap<(String, DateBucket), usize> = HashMap::new();

    for event in events {
        if event.is_bot {
            continue;
        }
        let date = DateBucket::from_instant(event.created_at, utc_offset_minutes);
        match index.get(&(event.channel_id.clone(), date)) {
            Some(&at) => order[at].count += 1,
            None => {
                index.insert((event.channel_id.clone(), date), order.len());
                order.push(GeneralDelta {
                    key: GeneralCounterKey {
                        guild_id: event.guild_id.clone(),
                        channel_id: event.channel_id.clone(),
                        date,
                    },
                    count: 1,
                    channel_name: event.channel_name.clone(),
                });
            }
        }
    }
    order
}

pub fn apply_user_deltas(store: &Store, deltas: &[UserDelta]) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        distinct_keys: deltas.len(),
        ..Default::default()
    };
    for delta in deltas {
        match store.upsert_increment_user(&delta.key, delta.count, &delta.defaults) {
            Ok(_) => {
                outcome.applied_keys += 1;
                outcome.total_messages += delta.count;
            }
            Err(e) => {
                outcome.failed_keys += 1;
                tracing::warn!(
                    channel_id = %delta.key.channel_id,
                    date = %delta.key.date,
                    error = %e,
                    "User counter upsert failed, skipping key"
                );
            }
        }
    }
    outcome
}

pub fn apply_general_deltas(store: &Store, deltas: &[GeneralDelta]) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        distinct_keys: deltas.len(),
        ..Default::default()
    };
    for delta in deltas {
        match store.upsert_increment_general(&delta.key, delta.count, &delta.channel_name) {
            Ok(_) => {
                outcome.applied_keys += 1;
                outcome.total_messages += delta.count;
            }
            Err(e) => {
                outcome.failed_keys += 1;
                tracing::warn!(
                    channel_id = %delta.key.channel_id,
                    date = %delta.key.date,
                    error = %e,
                    "General counter upsert failed, skipping key"
                );
            }
        }
    }
    outcome
}

/// Consent-gated batch for one user: grouped, then applied key by key. Invoked
/// only after the caller intends a user-scoped write; the gate re-checks here.
pub fn process_user_batch(
    store: &Store,
    user_id: &str,
    events: &[RawMessageEvent],
    utc_offset_minutes: i32,
) -> Result<BatchOutcome, IngestError> {
    if !store.get_consent(user_id)? {
        return Err(IngestError::ConsentDenied(user_id.to_string()));
    }
    let deltas = group_user_events(user_id, events, utc_offset_minutes);
    Ok(apply_user_deltas(store, &deltas))
}
