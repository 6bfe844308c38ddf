use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_CAS_RETRIES;
use crate::datebucket::{DateBucket, DateRange};
use crate::store::keys;
use crate::store::{Store, StoreError};

/// One per-user, per-channel, per-day aggregate row. Written only when the
/// author's consent was true at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivityCounter {
    pub guild_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub username: String,
    pub nickname: Option<String>,
    pub date: DateBucket,
    pub message_count: u64,
}

/// Per-channel, per-day aggregate row with no user dimension. Consent-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralActivityCounter {
    pub guild_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub date: DateBucket,
    pub message_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserCounterKey {
    pub guild_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub date: DateBucket,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneralCounterKey {
    pub guild_id: String,
    pub channel_id: String,
    pub date: DateBucket,
}

/// Descriptive fields applied only when a key is first inserted (first write wins).
#[derive(Debug, Clone)]
pub struct UserCounterDefaults {
    pub channel_name: String,
    pub username: String,
    pub nickname: Option<String>,
}

/// Identity filter plus resolved date range. `username` and `user_id` combine
/// with logical OR, matching the original query contract.
#[derive(Debug, Clone)]
pub struct UserStatsFilter {
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub range: DateRange,
}

impl UserStatsFilter {
    fn matches(&self, counter: &UserActivityCounter) -> bool {
        let identity = self
            .username
            .as_deref()
            .is_some_and(|name| counter.username == name)
            || self
                .user_id
                .as_deref()
                .is_some_and(|id| counter.user_id == id);
        identity && self.range.contains(counter.date)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRank {
    pub channel_name: String,
    pub message_count: u64,
}

impl Store {
    /// Atomic increment-if-exists-else-insert, serialized per key through a
    /// bounded compare-and-swap loop. Defaults are used only on insert.
    pub fn upsert_increment_user(
        &self,
        key: &UserCounterKey,
        delta: u64,
        defaults: &UserCounterDefaults,
    ) -> Result<UserActivityCounter, StoreError> {
        let tree_key = keys::user_counter_key(&key.guild_id, &key.channel_id, &key.user_id, key.date);

        let mut attempts = 0;
        loop {
            let current = self.user_counters.get(tree_key.as_bytes())?;
            let next = match &current {
                Some(raw) => {
                    let mut counter: UserActivityCounter = Self::deserialize(raw)?;
                    counter.message_count = counter.message_count.saturating_add(delta);
                    counter
                }
                None => UserActivityCounter {
                    guild_id: key.guild_id.clone(),
                    channel_id: key.channel_id.clone(),
                    channel_name: defaults.channel_name.clone(),
                    user_id: key.user_id.clone(),
                    username: defaults.username.clone(),
                    nickname: defaults.nickname.clone(),
                    date: key.date,
                    message_count: delta,
                },
            };

            let encoded = Self::serialize(&next)?;
            if self
                .user_counters
                .compare_and_swap(tree_key.as_bytes(), current, Some(encoded))?
                .is_ok()
            {
                return Ok(next);
            }

            attempts += 1;
            if attempts >= MAX_CAS_RETRIES {
                return Err(StoreError::CasRetryExhausted {
                    entity: "user_counter".to_string(),
                    key: tree_key,
                    attempts,
                });
            }
        }
    }

    pub fn upsert_increment_general(
        &self,
        key: &GeneralCounterKey,
        delta: u64,
        channel_name: &str,
    ) -> Result<GeneralActivityCounter, StoreError> {
        let tree_key = keys::general_counter_key(&key.guild_id, &key.channel_id, key.date);

        let mut attempts = 0;
        loop {
            let current = self.general_counters.get(tree_key.as_bytes())?;
            let next = match &current {
                Some(raw) => {
                    let mut counter: GeneralActivityCounter = Self::deserialize(raw)?;
                    counter.message_count = counter.message_count.saturating_add(delta);
                    counter
                }
                None => GeneralActivityCounter {
                    guild_id: key.guild_id.clone(),
                    channel_id: key.channel_id.clone(),
                    channel_name: channel_name.to_string(),
                    date: key.date,
                    message_count: delta,
                },
            };

            let encoded = Self::serialize(&next)?;
            if self
                .general_counters
                .compare_and_swap(tree_key.as_bytes(), current, Some(encoded))?
                .is_ok()
            {
                return Ok(next);
            }

            attempts += 1;
            if attempts >= MAX_CAS_RETRIES {
                return Err(StoreError::CasRetryExhausted {
                    entity: "general_counter".to_string(),
                    key: tree_key,
                    attempts,
                });
            }
        }
    }

    /// All user rows matching the filter, in stable key order.
    pub fn query_user_counters(
        &self,
        filter: &UserStatsFilter,
    ) -> Result<Vec<UserActivityCounter>, StoreError> {
        if filter.username.is_none() && filter.user_id.is_none() {
            return Err(StoreError::Validation(
                "either username or userid must be provided".to_string(),
            ));
        }

        let mut matched = Vec::new();
        for item in self.user_counters.iter() {
            let (_, raw) = item?;
            let counter: UserActivityCounter = Self::deserialize(&raw)?;
            if filter.matches(&counter) {
                matched.push(counter);
            }
        }
        Ok(matched)
    }

    /// Sum of matching counts, no grouping.
    pub fn total_count(&self, filter: &UserStatsFilter) -> Result<u64, StoreError> {
        Ok(self
            .query_user_counters(filter)?
            .iter()
            .map(|c| c.message_count)
            .sum())
    }

    /// Per-channel sums within the filter, descending. Ties keep first-seen
    /// order (stable sort over tree iteration order), truncated to `limit`.
    pub fn rank_top_channels(
        &self,
        filter: &UserStatsFilter,
        limit: usize,
    ) -> Result<Vec<ChannelRank>, StoreError> {
        let mut order: Vec<(String, ChannelRank)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for counter in self.query_user_counters(filter)? {
            match index.get(&counter.channel_id) {
                Some(&at) => {
                    order[at].1.message_count += counter.message_count;
                }
                None => {
                    index.insert(counter.channel_id.clone(), order.len());
                    order.push((
                        counter.channel_id.clone(),
                        ChannelRank {
                            channel_name: counter.channel_name.clone(),
                            message_count: counter.message_count,
                        },
                    ));
                }
            }
        }

        let mut ranked: Vec<ChannelRank> = order.into_iter().map(|(_, rank)| rank).collect();
        ranked.sort_by(|a, b| b.message_count.cmp(&a.message_count));
        ranked.truncate(limit);
        Ok(ranked)
    }

    pub fn query_general_counters(
        &self,
        date: DateBucket,
    ) -> Result<Vec<GeneralActivityCounter>, StoreError> {
        let mut matched = Vec::new();
        for item in self.general_counters.iter() {
            let (_, raw) = item?;
            let counter: GeneralActivityCounter = Self::deserialize(&raw)?;
            if counter.date == date {
                matched.push(counter);
            }
        }
        Ok(matched)
    }

    /// Per-user erasure: removes every user-scoped row for `user_id` across all
    /// channels and dates. General counters are never touched.
    pub fn delete_all_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut doomed = Vec::new();
        for item in self.user_counters.iter() {
            let (key, raw) = item?;
            let counter: UserActivityCounter = Self::deserialize(&raw)?;
            if counter.user_id == user_id {
                doomed.push(key);
            }
        }

        let mut deleted = 0u64;
        for key in doomed {
            if self.user_counters.remove(key)?.is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
