//! Historical backfill crawler.
//!
//! Replays message history from the Source over a bounded lookback window and
//! feeds the grouping engine in fixed-size chunks. Guilds and channels crawl
//! concurrently; pagination inside one channel is strictly sequential because
//! each page depends on the prior page's cursor. The crawl is best-effort:
//! a failing channel never aborts its siblings.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;

use crate::config::BackfillConfig;
use crate::constants::SOURCE_PAGE_SIZE;
use crate::ingest::grouping::{
    apply_general_deltas, apply_user_deltas, group_general_events, group_user_events,
};
use crate::ingest::{IngestError, RawMessageEvent};
use crate::source::{
    ChannelRef, GuildRef, MessageCursor, PageQuery, Source, SourceError, SourceMessage,
};
use crate::store::Store;

/// Guild-wide crawls rebuild consent-independent general counters; user crawls
/// rebuild one consenting user's counters (typically after a fresh opt-in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillMode {
    GuildWide,
    User(String),
}

#[derive(Debug, Clone)]
pub struct SkippedChannel {
    pub channel_id: String,
    pub channel_name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BackfillSummary {
    pub channels_processed: usize,
    pub channels_skipped: usize,
    pub messages_fetched: u64,
    pub messages_flushed: u64,
    pub skipped: Vec<SkippedChannel>,
}

impl BackfillSummary {
    fn absorb(&mut self, other: BackfillSummary) {
        self.channels_processed += other.channels_processed;
        self.channels_skipped += other.channels_skipped;
        self.messages_fetched += other.messages_fetched;
        self.messages_flushed += other.messages_flushed;
        self.skipped.extend(other.skipped);
    }
}

struct ChannelResult {
    fetched: u64,
    flushed: u64,
    skipped: Option<SkippedChannel>,
}

pub struct BackfillCrawler {
    store: Arc<Store>,
    source: Arc<dyn Source>,
    config: BackfillConfig,
    utc_offset_minutes: i32,
}

impl BackfillCrawler {
    pub fn new(
        store: Arc<Store>,
        source: Arc<dyn Source>,
        config: &BackfillConfig,
        utc_offset_minutes: i32,
    ) -> Self {
        Self {
            store,
            source,
            config: config.clone(),
            utc_offset_minutes,
        }
    }

    /// Crawl every reachable guild. Re-running over an already-applied window
    /// increments the same keys again; there is no resync mode.
    pub async fn run(&self, mode: &BackfillMode) -> Result<BackfillSummary, IngestError> {
        if let BackfillMode::User(user_id) = mode {
            if !self.store.get_consent(user_id)? {
                return Err(IngestError::ConsentDenied(user_id.clone()));
            }
        }

        let cutoff = Utc::now() - Duration::days(self.config.lookback_days);
        let lower_bound = MessageCursor::from_instant(cutoff);
        tracing::info!(
            cutoff = %cutoff,
            cursor = %lower_bound,
            ?mode,
            "Starting backfill crawl"
        );

        let guilds = self.source.list_guilds().await?;
        let guild_runs = guilds
            .iter()
            .map(|guild| self.crawl_guild(guild, lower_bound, mode));

        let mut summary = BackfillSummary::default();
        for guild_summary in join_all(guild_runs).await {
            summary.absorb(guild_summary);
        }

        tracing::info!(
            processed = summary.channels_processed,
            skipped = summary.channels_skipped,
            fetched = summary.messages_fetched,
            flushed = summary.messages_flushed,
            "Backfill crawl finished"
        );
        for entry in &summary.skipped {
            tracing::warn!(
                channel_id = %entry.channel_id,
                channel = %entry.channel_name,
                reason = %entry.reason,
                "Channel skipped during backfill"
            );
        }
        Ok(summary)
    }

    async fn crawl_guild(
        &self,
        guild: &GuildRef,
        lower_bound: MessageCursor,
        mode: &BackfillMode,
    ) -> BackfillSummary {
        let channels = match self.source.list_channels(guild).await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!(guild = %guild.name, error = %e, "Channel listing failed, skipping guild");
                return BackfillSummary {
                    channels_skipped: 1,
                    skipped: vec![SkippedChannel {
                        channel_id: guild.id.clone(),
                        channel_name: guild.name.clone(),
                        reason: format!("channel listing failed: {e}"),
                    }],
                    ..Default::default()
                };
            }
        };

        let runs = channels
            .iter()
            .map(|channel| self.crawl_channel(channel, lower_bound, mode));

        let mut summary = BackfillSummary::default();
        for (channel, result) in channels.iter().zip(join_all(runs).await) {
            summary.messages_fetched += result.fetched;
            summary.messages_flushed += result.flushed;
            match result.skipped {
                Some(entry) => {
                    summary.channels_skipped += 1;
                    summary.skipped.push(entry);
                }
                None => {
                    summary.channels_processed += 1;
                    tracing::debug!(channel = %channel.name, fetched = result.fetched, "Channel crawl complete");
                }
            }
        }
        summary
    }

    /// Strictly forward pagination from the lower bound. Stops on an empty
    /// page, a short page, or a page that yields no new maximum cursor.
    async fn crawl_channel(
        &self,
        channel: &ChannelRef,
        lower_bound: MessageCursor,
        mode: &BackfillMode,
    ) -> ChannelResult {
        let mut cursor = lower_bound;
        let mut seen: HashSet<MessageCursor> = HashSet::new();
        let mut pending: Vec<RawMessageEvent> = Vec::new();
        let mut fetched = 0u64;
        let mut flushed = 0u64;

        loop {
            let query = PageQuery {
                limit: SOURCE_PAGE_SIZE,
                after: Some(cursor),
                before: None,
            };
            let page = match self.source.fetch_messages(channel, &query).await {
                Ok(page) => page,
                Err(SourceError::PermissionDenied { .. }) => {
                    flushed += self.flush(mode, &mut pending);
                    return ChannelResult {
                        fetched,
                        flushed,
                        skipped: Some(SkippedChannel {
                            channel_id: channel.id.clone(),
                            channel_name: channel.name.clone(),
                            reason: "no access".to_string(),
                        }),
                    };
                }
                Err(e) => {
                    // transient failure: abandon this channel only, keep what
                    // was already collected
                    flushed += self.flush(mode, &mut pending);
                    return ChannelResult {
                        fetched,
                        flushed,
                        skipped: Some(SkippedChannel {
                            channel_id: channel.id.clone(),
                            channel_name: channel.name.clone(),
                            reason: e.to_string(),
                        }),
                    };
                }
            };

            if page.is_empty() {
                break;
            }
            fetched += page.len() as u64;
            let Some(max_id) = page.iter().map(|m| m.id).max() else {
                break;
            };

            for message in &page {
                if message.is_bot {
                    continue;
                }
                if let BackfillMode::User(user_id) = mode {
                    if &message.author_id != user_id {
                        continue;
                    }
                }
                // pages may overlap; the seen-set makes the pass idempotent
                if !seen.insert(message.id) {
                    continue;
                }
                pending.push(self.to_event(message, channel));
                if pending.len() >= self.config.chunk_size {
                    flushed += self.flush(mode, &mut pending);
                }
            }

            if max_id <= cursor {
                break;
            }
            cursor = max_id;

            if page.len() < SOURCE_PAGE_SIZE as usize {
                break;
            }
        }

        flushed += self.flush(mode, &mut pending);
        ChannelResult {
            fetched,
            flushed,
            skipped: None,
        }
    }

    fn flush(&self, mode: &BackfillMode, pending: &mut Vec<RawMessageEvent>) -> u64 {
        if pending.is_empty() {
            return 0;
        }
        let outcome = match mode {
            BackfillMode::User(user_id) => {
                let deltas = group_user_events(user_id, pending, self.utc_offset_minutes);
                apply_user_deltas(&self.store, &deltas)
            }
            BackfillMode::GuildWide => {
                let deltas = group_general_events(pending, self.utc_offset_minutes);
                apply_general_deltas(&self.store, &deltas)
            }
        };
        pending.clear();
        outcome.total_messages
    }

    fn to_event(&self, message: &SourceMessage, channel: &ChannelRef) -> RawMessageEvent {
        RawMessageEvent {
            guild_id: channel.guild_id.clone(),
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            user_id: message.author_id.clone(),
            username: message.author_username.clone(),
            nickname: message.display_name.clone(),
            created_at: message.created_at,
            is_bot: message.is_bot,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use crate::datebucket::{DateBucket, DateRange};
    use crate::source::testing::FakeSource;
    use crate::source::MessageCursor;
    use crate::store::operations::counters::UserStatsFilter;

    use super::*;

    fn open_store() -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(
            Store::open(dir.path().join("backfill.sled").to_str().unwrap()).expect("open store"),
        );
        (dir, store)
    }

    fn crawler(store: Arc<Store>, source: FakeSource, chunk_size: usize) -> BackfillCrawler {
        BackfillCrawler::new(
            store,
            Arc::new(source),
            &BackfillConfig {
                lookback_days: 30,
                chunk_size,
            },
            0,
        )
    }

    fn recent(days_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::days(days_ago)
    }

    /// Time-ordered fake ids so the lookback cursor actually bounds them.
    fn id_at(instant: DateTime<Utc>, seq: u64) -> u64 {
        MessageCursor::from_instant(instant).0 + seq
    }

    fn all_time(user: &str) -> UserStatsFilter {
        UserStatsFilter {
            username: None,
            user_id: Some(user.to_string()),
            range: DateRange {
                start: DateBucket::EPOCH,
                end: DateBucket::parse_compact("29991231").unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn user_backfill_counts_only_that_user() {
        let (_dir, store) = open_store();
        store.set_consent("u1", true).unwrap();

        let mut source = FakeSource::new()
            .with_guild("g1", "guild")
            .with_channel("g1", "c1", "#general")
            .with_channel("g1", "c2", "#random");
        let when = recent(2);
        for seq in 0..150 {
            source.push_message("c1", id_at(when, seq), "u1", false, when);
        }
        source.push_message("c1", id_at(when, 200), "u2", false, when);
        source.push_message("c1", id_at(when, 201), "bot", true, when);
        for seq in 0..5 {
            source.push_message("c2", id_at(when, seq), "u1", false, when);
        }

        let crawler = crawler(store.clone(), source, 100);
        let summary = crawler
            .run(&BackfillMode::User("u1".to_string()))
            .await
            .unwrap();

        assert_eq!(summary.channels_processed, 2);
        assert_eq!(summary.channels_skipped, 0);
        assert_eq!(summary.messages_flushed, 155);

        let rows = store.query_user_counters(&all_time("u1")).unwrap();
        let total: u64 = rows.iter().map(|r| r.message_count).sum();
        assert_eq!(total, 155);
        assert!(store.query_user_counters(&all_time("u2")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn messages_before_the_lookback_window_are_excluded() {
        let (_dir, store) = open_store();
        store.set_consent("u1", true).unwrap();

        let mut source = FakeSource::new()
            .with_guild("g1", "guild")
            .with_channel("g1", "c1", "#general");
        let ancient = recent(90);
        let fresh = recent(1);
        source.push_message("c1", id_at(ancient, 0), "u1", false, ancient);
        source.push_message("c1", id_at(fresh, 0), "u1", false, fresh);

        let crawler = crawler(store.clone(), source, 100);
        let summary = crawler
            .run(&BackfillMode::User("u1".to_string()))
            .await
            .unwrap();

        assert_eq!(summary.messages_flushed, 1);
        assert_eq!(store.total_count(&all_time("u1")).unwrap(), 1);
    }

    #[tokio::test]
    async fn denied_channel_is_recorded_and_siblings_continue() {
        let (_dir, store) = open_store();
        store.set_consent("u1", true).unwrap();

        let mut source = FakeSource::new()
            .with_guild("g1", "guild")
            .with_channel("g1", "locked", "#locked")
            .with_channel("g1", "open", "#open")
            .deny_channel("locked");
        let when = recent(2);
        source.push_message("open", id_at(when, 0), "u1", false, when);

        let crawler = crawler(store.clone(), source, 100);
        let summary = crawler
            .run(&BackfillMode::User("u1".to_string()))
            .await
            .unwrap();

        assert_eq!(summary.channels_processed, 1);
        assert_eq!(summary.channels_skipped, 1);
        assert_eq!(summary.skipped[0].channel_id, "locked");
        assert_eq!(summary.skipped[0].reason, "no access");
        assert_eq!(store.total_count(&all_time("u1")).unwrap(), 1);
    }

    #[tokio::test]
    async fn transient_failure_aborts_only_that_channel() {
        let (_dir, store) = open_store();
        store.set_consent("u1", true).unwrap();

        let mut source = FakeSource::new()
            .with_guild("g1", "guild")
            .with_channel("g1", "flaky", "#flaky")
            .with_channel("g1", "steady", "#steady")
            .fail_channel("flaky");
        let when = recent(2);
        source.push_message("steady", id_at(when, 0), "u1", false, when);
        source.push_message("steady", id_at(when, 1), "u1", false, when);

        let crawler = crawler(store.clone(), source, 100);
        let summary = crawler
            .run(&BackfillMode::User("u1".to_string()))
            .await
            .unwrap();

        assert_eq!(summary.channels_skipped, 1);
        assert_eq!(store.total_count(&all_time("u1")).unwrap(), 2);
    }

    #[tokio::test]
    async fn unconsented_user_backfill_is_refused_up_front() {
        let (_dir, store) = open_store();
        let source = FakeSource::new().with_guild("g1", "guild");
        let crawler = crawler(store.clone(), source, 100);

        let result = crawler.run(&BackfillMode::User("u1".to_string())).await;
        assert!(matches!(result, Err(IngestError::ConsentDenied(_))));
    }

    #[tokio::test]
    async fn guild_wide_mode_rebuilds_general_counters_for_everyone() {
        let (_dir, store) = open_store();

        let mut source = FakeSource::new()
            .with_guild("g1", "guild")
            .with_channel("g1", "c1", "#general");
        let when = recent(2);
        source.push_message("c1", id_at(when, 0), "u1", false, when);
        source.push_message("c1", id_at(when, 1), "u2", false, when);
        source.push_message("c1", id_at(when, 2), "bot", true, when);

        let crawler = crawler(store.clone(), source, 100);
        let summary = crawler.run(&BackfillMode::GuildWide).await.unwrap();

        assert_eq!(summary.messages_flushed, 2);
        let day = DateBucket::from_instant(when, 0);
        assert_eq!(store.query_general_counters(day).unwrap()[0].message_count, 2);
        assert!(store.query_user_counters(&all_time("u1")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn small_chunks_flush_incrementally_with_identical_totals() {
        let (_dir, store) = open_store();
        store.set_consent("u1", true).unwrap();

        let mut source = FakeSource::new()
            .with_guild("g1", "guild")
            .with_channel("g1", "c1", "#general");
        let when = recent(2);
        for seq in 0..37 {
            source.push_message("c1", id_at(when, seq), "u1", false, when);
        }

        let crawler = crawler(store.clone(), source, 10);
        let summary = crawler
            .run(&BackfillMode::User("u1".to_string()))
            .await
            .unwrap();

        assert_eq!(summary.messages_flushed, 37);
        assert_eq!(store.total_count(&all_time("u1")).unwrap(), 37);
    }
}
