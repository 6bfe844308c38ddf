//! Discord REST adapter for the [`Source`] capability.
//!
//! The core never touches SDK concrete types; this adapter maps the REST
//! surface onto the trait and normalizes its failure modes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::SourceConfig;
use crate::source::{
    ChannelRef, GuildRef, MessageCursor, PageQuery, Source, SourceError, SourceMessage,
};

/// Channel types that carry messages: guild text (0) and announcement (5).
const TEXT_CHANNEL_TYPES: [u8; 2] = [0, 5];

/// Page size for member listing (the REST maximum).
const MEMBER_PAGE_SIZE: usize = 1000;

/// API error code for "missing access" on a channel.
const MISSING_ACCESS: u32 = 50001;

#[derive(Debug, Clone)]
pub struct DiscordRest {
    base_url: String,
    auth_header: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WireGuild {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    username: String,
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    author: WireUser,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    user: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

impl DiscordRest {
    pub fn new(config: &SourceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            auth_header: format!("Bot {}", config.bot_token),
            client,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        channel_id: Option<&str>,
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| SourceError::InvalidResponse(e.to_string()));
        }

        let wire_error = response.json::<WireError>().await.unwrap_or(WireError {
            code: 0,
            message: status.to_string(),
        });

        if status == reqwest::StatusCode::FORBIDDEN || wire_error.code == MISSING_ACCESS {
            if let Some(channel_id) = channel_id {
                return Err(SourceError::PermissionDenied {
                    channel_id: channel_id.to_string(),
                });
            }
        }
        Err(SourceError::Unavailable(format!(
            "{} (code {}): {}",
            status, wire_error.code, wire_error.message
        )))
    }
}

#[async_trait]
impl Source for DiscordRest {
    async fn list_guilds(&self) -> Result<Vec<GuildRef>, SourceError> {
        let guilds: Vec<WireGuild> = self.get_json("/users/@me/guilds", None).await?;
        Ok(guilds
            .into_iter()
            .map(|g| GuildRef {
                id: g.id,
                name: g.name,
            })
            .collect())
    }

    async fn list_channels(&self, guild: &GuildRef) -> Result<Vec<ChannelRef>, SourceError> {
        let channels: Vec<WireChannel> = self
            .get_json(&format!("/guilds/{}/channels", guild.id), None)
            .await?;
        Ok(channels
            .into_iter()
            .filter(|c| TEXT_CHANNEL_TYPES.contains(&c.kind))
            .map(|c| ChannelRef {
                name: c.name.unwrap_or_else(|| c.id.clone()),
                id: c.id,
                guild_id: guild.id.clone(),
            })
            .collect())
    }

    async fn fetch_messages(
        &self,
        channel: &ChannelRef,
        query: &PageQuery,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        let mut path = format!("/channels/{}/messages?limit={}", channel.id, query.limit);
        if let Some(after) = query.after {
            path.push_str(&format!("&after={after}"));
        }
        if let Some(before) = query.before {
            path.push_str(&format!("&before={before}"));
        }

        let messages: Vec<WireMessage> = self.get_json(&path, Some(&channel.id)).await?;
        messages
            .into_iter()
            .map(|m| {
                let id = MessageCursor::parse(&m.id).ok_or_else(|| {
                    SourceError::InvalidResponse(format!("non-numeric message id {}", m.id))
                })?;
                Ok(SourceMessage {
                    id,
                    channel_id: channel.id.clone(),
                    author_id: m.author.id,
                    author_username: m.author.username,
                    display_name: m.author.global_name,
                    is_bot: m.author.bot,
                    created_at: m.timestamp,
                })
            })
            .collect()
    }

    async fn non_bot_member_count(&self, guild: &GuildRef) -> Result<usize, SourceError> {
        let mut count = 0usize;
        let mut after: Option<String> = None;

        loop {
            let mut path = format!("/guilds/{}/members?limit={}", guild.id, MEMBER_PAGE_SIZE);
            if let Some(ref cursor) = after {
                path.push_str(&format!("&after={cursor}"));
            }

            let members: Vec<WireMember> = self.get_json(&path, None).await?;
            let page_len = members.len();
            count += members.iter().filter(|m| !m.user.bot).count();
            after = members.into_iter().last().map(|m| m.user.id);

            if page_len < MEMBER_PAGE_SIZE || after.is_none() {
                return Ok(count);
            }
        }
    }
}
