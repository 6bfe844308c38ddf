use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use activity_backend::config::{BackfillConfig, Config, SourceConfig, WorkerConfig};
use activity_backend::routes::build_router;
use activity_backend::state::AppState;
use activity_backend::store::Store;

pub const TEST_SECRET: &str = "integration-test-signing-secret";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

pub async fn spawn_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("activity-test.sled");

    // 直接构造 Config，避免使用 set_var 造成多线程测试环境变量竞态
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 0,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        api_secret: TEST_SECRET.to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        utc_offset_minutes: 0,
        backfill: BackfillConfig {
            lookback_days: 30,
            chunk_size: 100,
        },
        worker: WorkerConfig {
            is_leader: false,
            census_cron: "0 55 23 * * *".to_string(),
        },
        source: SourceConfig {
            enabled: false,
            api_url: String::new(),
            bot_token: String::new(),
            timeout_secs: 5,
        },
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(store, None, &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}
