use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use activity_backend::datebucket::{DateBucket, DateRange};
use activity_backend::ingest::grouping::group_user_events;
use activity_backend::ingest::RawMessageEvent;

fn event(channel: u8, day: u32, hour: u32) -> RawMessageEvent {
    RawMessageEvent {
        guild_id: "g1".to_string(),
        channel_id: format!("c{channel}"),
        channel_name: format!("#c{channel}"),
        user_id: "u1".to_string(),
        username: "alice".to_string(),
        nickname: None,
        created_at: Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap(),
        is_bot: false,
    }
}

proptest! {
    #[test]
    fn pt_compact_dates_round_trip(year in 2000i32..2100, month in 1u32..=12, day in 1u32..=28) {
        let compact = format!("{year:04}{month:02}{day:02}");
        let bucket = DateBucket::parse_compact(&compact).unwrap();
        prop_assert_eq!(bucket.compact(), compact);
    }

    #[test]
    fn pt_wrong_length_or_non_digit_dates_are_rejected(raw in "[0-9]{0,7}|[a-z]{8}") {
        prop_assert!(DateBucket::parse_compact(&raw).is_err());
    }

    #[test]
    fn pt_grouping_preserves_the_message_total(
        shape in proptest::collection::vec((0u8..3, 1u32..6, 0u32..24), 0..80)
    ) {
        let events: Vec<RawMessageEvent> = shape
            .into_iter()
            .map(|(channel, day, hour)| event(channel, day, hour))
            .collect();

        let deltas = group_user_events("u1", &events, 0);
        let total: u64 = deltas.iter().map(|d| d.count).sum();
        prop_assert_eq!(total, events.len() as u64);

        // one delta per distinct (channel, day)
        let mut keys: Vec<_> = deltas
            .iter()
            .map(|d| (d.key.channel_id.clone(), d.key.date))
            .collect();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), deltas.len());
    }

    #[test]
    fn pt_range_resolution_orders_endpoints(a in 0u32..3000, b in 0u32..3000) {
        let base = DateBucket::parse_compact("20200101").unwrap();
        let to_bucket = |days: u32| {
            DateBucket::new(base.date() + chrono::Duration::days(days as i64))
        };
        let today = to_bucket(4000);

        let start = to_bucket(a);
        let end = to_bucket(b);
        let resolved = DateRange::resolve(None, Some(start), Some(end), today);
        if a <= b {
            let range = resolved.unwrap();
            prop_assert!(range.contains(start) && range.contains(end));
        } else {
            prop_assert!(resolved.is_err());
        }
    }
}
