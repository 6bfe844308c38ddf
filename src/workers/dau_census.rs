//! Nightly active-user census, scheduled shortly before local midnight so the
//! day's traffic is nearly complete when it runs.

use crate::ingest::census::run_census;
use crate::source::Source;
use crate::store::Store;

pub async fn run(store: &Store, source: &dyn Source, utc_offset_minutes: i32) {
    tracing::info!("DAU census worker running");

    let guilds = match source.list_guilds().await {
        Ok(guilds) => guilds,
        Err(e) => {
            tracing::warn!(error = %e, "Census aborted: guild listing failed");
            return;
        }
    };

    for guild in &guilds {
        match run_census(store, source, guild, utc_offset_minutes).await {
            Ok(summary) => {
                tracing::info!(
                    guild = %guild.name,
                    date = %summary.date,
                    active = summary.active_users,
                    ceiling = summary.ceiling,
                    "Census stored"
                );
            }
            Err(e) => {
                tracing::warn!(guild = %guild.name, error = %e, "Census failed for guild");
            }
        }
    }
}
