pub mod active_users;
pub mod consents;
pub mod counters;
