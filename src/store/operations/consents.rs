use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    pub user_id: String,
    pub consent: bool,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Absent records read as consent=false.
    pub fn get_consent(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .get_consent_record(user_id)?
            .map(|record| record.consent)
            .unwrap_or(false))
    }

    pub fn get_consent_record(&self, user_id: &str) -> Result<Option<ConsentRecord>, StoreError> {
        let key = keys::consent_key(user_id);
        match self.user_consents.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_consent(&self, user_id: &str, consent: bool) -> Result<ConsentRecord, StoreError> {
        let record = ConsentRecord {
            user_id: user_id.to_string(),
            consent,
            updated_at: Utc::now(),
        };
        let key = keys::consent_key(user_id);
        self.user_consents
            .insert(key.as_bytes(), Self::serialize(&record)?)?;
        Ok(record)
    }
}
