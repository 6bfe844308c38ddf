use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::constants::BACKFILL_CHUNK_SIZE;

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub api_secret: String,
    pub cors_origin: String,
    /// Fixed UTC offset (minutes) used for every date-bucket derivation.
    pub utc_offset_minutes: i32,
    pub backfill: BackfillConfig,
    pub worker: WorkerConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub lookback_days: i64,
    pub chunk_size: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub census_cron: String,
}

#[derive(Clone)]
pub struct SourceConfig {
    pub enabled: bool,
    pub api_url: String,
    pub bot_token: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("api_secret", &"***REDACTED***")
            .field("cors_origin", &self.cors_origin)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("backfill", &self.backfill)
            .field("worker", &self.worker)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("bot_token", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 6969_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/activity.sled"),
            api_secret: env_or(
                "API_SECRET",
                "change_me_to_random_64_chars_change_me_to_random_64_chars",
            ),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            utc_offset_minutes: env_or_parse("UTC_OFFSET_MINUTES", 0_i32),
            backfill: BackfillConfig {
                lookback_days: env_or_parse("BACKFILL_LOOKBACK_DAYS", 1095_i64),
                chunk_size: env_or_parse("BACKFILL_CHUNK_SIZE", BACKFILL_CHUNK_SIZE),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                census_cron: env_or("CENSUS_CRON", "0 55 23 * * *"),
            },
            source: SourceConfig {
                enabled: env_or_bool("SOURCE_ENABLED", false),
                api_url: env_or("SOURCE_API_URL", "https://discord.com/api/v10"),
                bot_token: env_or("SOURCE_BOT_TOKEN", ""),
                timeout_secs: env_or_parse("SOURCE_TIMEOUT_SECS", 30_u64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
