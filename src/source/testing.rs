//! Scripted in-memory [`Source`] used by crawler and census tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ChannelRef, GuildRef, MessageCursor, PageQuery, Source, SourceError, SourceMessage};

#[derive(Default)]
pub struct FakeSource {
    guilds: Vec<GuildRef>,
    channels: HashMap<String, Vec<ChannelRef>>,
    /// Per channel, ascending by id.
    messages: HashMap<String, Vec<SourceMessage>>,
    denied_channels: HashSet<String>,
    failing_channels: HashSet<String>,
    member_count: usize,
    pub fetch_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guild(mut self, id: &str, name: &str) -> Self {
        self.guilds.push(GuildRef {
            id: id.to_string(),
            name: name.to_string(),
        });
        self.channels.entry(id.to_string()).or_default();
        self
    }

    pub fn with_channel(mut self, guild_id: &str, id: &str, name: &str) -> Self {
        self.channels
            .entry(guild_id.to_string())
            .or_default()
            .push(ChannelRef {
                id: id.to_string(),
                name: name.to_string(),
                guild_id: guild_id.to_string(),
            });
        self.messages.entry(id.to_string()).or_default();
        self
    }

    pub fn with_members(mut self, non_bot_count: usize) -> Self {
        self.member_count = non_bot_count;
        self
    }

    pub fn deny_channel(mut self, channel_id: &str) -> Self {
        self.denied_channels.insert(channel_id.to_string());
        self
    }

    pub fn fail_channel(mut self, channel_id: &str) -> Self {
        self.failing_channels.insert(channel_id.to_string());
        self
    }

    pub fn push_message(
        &mut self,
        channel_id: &str,
        id: u64,
        author_id: &str,
        is_bot: bool,
        created_at: DateTime<Utc>,
    ) {
        let messages = self.messages.entry(channel_id.to_string()).or_default();
        messages.push(SourceMessage {
            id: MessageCursor(id),
            channel_id: channel_id.to_string(),
            author_id: author_id.to_string(),
            author_username: format!("user-{author_id}"),
            display_name: None,
            is_bot,
            created_at,
        });
        messages.sort_by_key(|m| m.id);
    }
}

#[async_trait]
impl Source for FakeSource {
    async fn list_guilds(&self) -> Result<Vec<GuildRef>, SourceError> {
        Ok(self.guilds.clone())
    }

    async fn list_channels(&self, guild: &GuildRef) -> Result<Vec<ChannelRef>, SourceError> {
        Ok(self.channels.get(&guild.id).cloned().unwrap_or_default())
    }

    async fn fetch_messages(
        &self,
        channel: &ChannelRef,
        query: &PageQuery,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);

        if self.denied_channels.contains(&channel.id) {
            return Err(SourceError::PermissionDenied {
                channel_id: channel.id.clone(),
            });
        }
        if self.failing_channels.contains(&channel.id) {
            return Err(SourceError::Unavailable("scripted failure".to_string()));
        }

        let all = self.messages.get(&channel.id).cloned().unwrap_or_default();
        let limit = query.limit as usize;

        let page = if let Some(after) = query.after {
            // forward: oldest first beyond the cursor
            all.into_iter()
                .filter(|m| m.id > after)
                .take(limit)
                .collect()
        } else {
            // backward: newest first, optionally below the cursor
            let mut selected: Vec<SourceMessage> = all
                .into_iter()
                .filter(|m| query.before.map_or(true, |b| m.id < b))
                .collect();
            selected.reverse();
            selected.truncate(limit);
            selected
        };

        Ok(page)
    }

    async fn non_bot_member_count(&self, _guild: &GuildRef) -> Result<usize, SourceError> {
        Ok(self.member_count)
    }
}
