//! Daily distinct-active-user census.
//!
//! Walks each channel backward from the newest message and collects distinct
//! non-bot author ids for the current local day. The non-bot member count is a
//! hard ceiling: once every member has been seen there is nothing left to find
//! and the scan exits early. Channels are scanned sequentially so the early
//! exit can cut the remaining ones.

use std::collections::HashSet;

use crate::constants::SOURCE_PAGE_SIZE;
use crate::datebucket::DateBucket;
use crate::ingest::IngestError;
use crate::source::{ChannelRef, GuildRef, PageQuery, Source};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct CensusSummary {
    pub date: DateBucket,
    pub active_users: u64,
    pub ceiling: usize,
    pub channels_scanned: usize,
    pub channels_failed: usize,
    pub early_exit: bool,
}

/// Run the census for one guild and persist the result with a max-merge, so a
/// rerun later the same day can only raise the stored value.
pub async fn run_census(
    store: &Store,
    source: &dyn Source,
    guild: &GuildRef,
    utc_offset_minutes: i32,
) -> Result<CensusSummary, IngestError> {
    let today = DateBucket::today(utc_offset_minutes);
    let boundary = today.start_of_day_utc(utc_offset_minutes);
    let ceiling = source.non_bot_member_count(guild).await?;

    let mut active: HashSet<String> = HashSet::new();
    let mut channels_scanned = 0usize;
    let mut channels_failed = 0usize;
    let mut early_exit = false;

    let channels = source.list_channels(guild).await?;
    for channel in &channels {
        if active.len() >= ceiling {
            early_exit = true;
            break;
        }
        match scan_channel(source, channel, boundary, ceiling, &mut active).await {
            Ok(exhausted_ceiling) => {
                channels_scanned += 1;
                if exhausted_ceiling {
                    early_exit = true;
                    break;
                }
            }
            Err(e) => {
                channels_failed += 1;
                tracing::warn!(
                    guild = %guild.name,
                    channel = %channel.name,
                    error = %e,
                    "Census channel scan failed, skipping"
                );
            }
        }
    }

    let row = store.save_daily_active_users(today, active.len() as u64)?;
    tracing::info!(
        guild = %guild.name,
        date = %today,
        counted = active.len(),
        stored = row.active_users,
        ceiling,
        channels_scanned,
        channels_failed,
        early_exit,
        "Census complete"
    );

    Ok(CensusSummary {
        date: today,
        active_users: row.active_users,
        ceiling,
        channels_scanned,
        channels_failed,
        early_exit,
    })
}

/// Backward page walk, newest first. Stops at the first message older than the
/// day boundary. Returns true when the ceiling was reached mid-scan.
async fn scan_channel(
    source: &dyn Source,
    channel: &ChannelRef,
    boundary: chrono::DateTime<chrono::Utc>,
    ceiling: usize,
    active: &mut HashSet<String>,
) -> Result<bool, crate::source::SourceError> {
    let mut before = None;

    loop {
        let query = PageQuery {
            limit: SOURCE_PAGE_SIZE,
            after: None,
            before,
        };
        let page = source.fetch_messages(channel, &query).await?;
        if page.is_empty() {
            return Ok(false);
        }

        for message in &page {
            // Pages come newest first: the first pre-boundary message ends the
            // channel, everything after it is older still.
            if message.created_at < boundary {
                return Ok(false);
            }
            if message.is_bot {
                continue;
            }
            active.insert(message.author_id.clone());
            if active.len() >= ceiling {
                return Ok(true);
            }
        }

        if page.len() < SOURCE_PAGE_SIZE as usize {
            return Ok(false);
        }
        // oldest id of the page; ids and time order agree
        before = page.iter().map(|m| m.id).min();
    }
}
