//! Hourly durability flush. sled buffers writes; this bounds the loss window
//! between crashes.

use crate::store::Store;

pub async fn run(store: &Store) {
    match store.flush() {
        Ok(()) => tracing::debug!("Store flushed"),
        Err(e) => tracing::warn!(error = %e, "Store flush failed"),
    }
}
