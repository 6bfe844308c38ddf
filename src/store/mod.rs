pub mod keys;
pub mod operations;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub user_counters: sled::Tree,
    pub general_counters: sled::Tree,
    pub daily_active_users: sled::Tree,
    pub user_consents: sled::Tree,
}

/// Tree name constants. Renaming one is a migration, not an edit.
mod trees {
    pub const USER_COUNTERS: &str = "user_counters";
    pub const GENERAL_COUNTERS: &str = "general_counters";
    pub const DAILY_ACTIVE_USERS: &str = "daily_active_users";
    pub const USER_CONSENTS: &str = "user_consents";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let user_counters = db.open_tree(trees::USER_COUNTERS)?;
        let general_counters = db.open_tree(trees::GENERAL_COUNTERS)?;
        let daily_active_users = db.open_tree(trees::DAILY_ACTIVE_USERS)?;
        let user_consents = db.open_tree(trees::USER_CONSENTS)?;

        Ok(Self {
            db,
            user_counters,
            general_counters,
            daily_active_users,
            user_consents,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.db.size_on_disk().is_ok()
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
