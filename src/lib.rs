pub mod auth;
pub mod config;
pub mod constants;
pub mod datebucket;
pub mod extractors;
pub mod ingest;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod source;
pub mod state;
pub mod store;
pub mod workers;
