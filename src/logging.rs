use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

/// Stdout logging plus, when enabled, a daily-rolling JSON file. `RUST_LOG`
/// overrides the configured level. Safe to call more than once: a second call
/// is a no-op, which keeps test setups simple.
pub fn init_tracing(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Option<Layer> is itself a layer, so the file sink stays one pipeline.
    let file_layer = config
        .enable_file_logs
        .then(|| file_appender(&config.log_dir))
        .flatten()
        .map(|appender| fmt::layer().with_writer(appender).with_ansi(false).json());

    let _ = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init();
}

fn file_appender(log_dir: &str) -> Option<RollingFileAppender> {
    match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("activity-backend")
        .filename_suffix("log")
        .max_log_files(30)
        .build(log_dir)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            // 文件日志不可用时退回纯 stdout，不阻断启动
            eprintln!("rolling file appender unavailable ({e}), logging to stdout only");
            None
        }
    }
}
