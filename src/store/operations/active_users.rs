use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CAS_RETRIES;
use crate::datebucket::{DateBucket, DateRange};
use crate::store::keys;
use crate::store::{Store, StoreError};

/// One row per calendar day holding the distinct-active-user census result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActiveUsers {
    pub date: DateBucket,
    pub active_users: u64,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Max-merge upsert: a stored value is only replaced by a larger one.
    /// Recomputes that legitimately shrink are therefore invisible; kept as the
    /// observed behavior (see DESIGN.md).
    pub fn save_daily_active_users(
        &self,
        date: DateBucket,
        active_users: u64,
    ) -> Result<DailyActiveUsers, StoreError> {
        let tree_key = keys::daily_active_users_key(date);

        let mut attempts = 0;
        loop {
            let current = self.daily_active_users.get(tree_key.as_bytes())?;
            let next = match &current {
                Some(raw) => {
                    let existing: DailyActiveUsers = Self::deserialize(raw)?;
                    DailyActiveUsers {
                        date,
                        active_users: existing.active_users.max(active_users),
                        updated_at: Utc::now(),
                    }
                }
                None => DailyActiveUsers {
                    date,
                    active_users,
                    updated_at: Utc::now(),
                },
            };

            let encoded = Self::serialize(&next)?;
            if self
                .daily_active_users
                .compare_and_swap(tree_key.as_bytes(), current, Some(encoded))?
                .is_ok()
            {
                return Ok(next);
            }

            attempts += 1;
            if attempts >= MAX_CAS_RETRIES {
                return Err(StoreError::CasRetryExhausted {
                    entity: "daily_active_users".to_string(),
                    key: tree_key,
                    attempts,
                });
            }
        }
    }

    pub fn get_daily_active_users(
        &self,
        date: DateBucket,
    ) -> Result<Option<DailyActiveUsers>, StoreError> {
        let tree_key = keys::daily_active_users_key(date);
        match self.daily_active_users.get(tree_key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Maximum per-day value across an inclusive range: a peak, not a sum.
    /// Compact date keys sort lexicographically, so a sled range scan suffices.
    pub fn max_daily_active_users(&self, range: DateRange) -> Result<Option<u64>, StoreError> {
        let start = keys::daily_active_users_key(range.start);
        let end = keys::daily_active_users_key(range.end);

        let mut peak: Option<u64> = None;
        for item in self
            .daily_active_users
            .range(start.as_bytes()..=end.as_bytes())
        {
            let (_, raw) = item?;
            let row: DailyActiveUsers = Self::deserialize(&raw)?;
            peak = Some(peak.map_or(row.active_users, |p| p.max(row.active_users)));
        }
        Ok(peak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store =
            Store::open(dir.path().join("dau.sled").to_str().unwrap()).expect("open store");
        (dir, store)
    }

    fn date(raw: &str) -> DateBucket {
        DateBucket::parse_compact(raw).expect("test date")
    }

    #[test]
    fn save_is_max_merge() {
        let (_dir, store) = open_store();
        let day = date("20250110");

        store.save_daily_active_users(day, 12).unwrap();
        let after_lower = store.save_daily_active_users(day, 9).unwrap();
        assert_eq!(after_lower.active_users, 12);

        let after_higher = store.save_daily_active_users(day, 15).unwrap();
        assert_eq!(after_higher.active_users, 15);
        assert_eq!(
            store.get_daily_active_users(day).unwrap().unwrap().active_users,
            15
        );
    }

    #[test]
    fn range_query_returns_the_peak() {
        let (_dir, store) = open_store();
        store.save_daily_active_users(date("20250101"), 4).unwrap();
        store.save_daily_active_users(date("20250102"), 9).unwrap();
        store.save_daily_active_users(date("20250103"), 6).unwrap();
        store.save_daily_active_users(date("20250201"), 99).unwrap();

        let peak = store
            .max_daily_active_users(DateRange {
                start: date("20250101"),
                end: date("20250103"),
            })
            .unwrap();
        assert_eq!(peak, Some(9));
    }

    #[test]
    fn empty_range_has_no_peak() {
        let (_dir, store) = open_store();
        let peak = store
            .max_daily_active_users(DateRange {
                start: date("20250101"),
                end: date("20250131"),
            })
            .unwrap();
        assert_eq!(peak, None);
    }
}
