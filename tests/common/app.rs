use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use learnpath_backend::config::{Config, GeneratorConfig, RateLimitConfig};
use learnpath_backend::routes::build_router;
use learnpath_backend::services::gateway::ContentGateway;
use learnpath_backend::services::generator::ContentGenerator;
use learnpath_backend::state::AppState;
use learnpath_backend::store::Store;

use super::fixtures::FixtureGenerator;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

pub struct TestLimits {
    pub api: u64,
    pub generation: u64,
}

impl Default for TestLimits {
    fn default() -> Self {
        Self {
            api: 1_000,
            generation: 100,
        }
    }
}

pub async fn spawn_with(generator: Arc<dyn ContentGenerator>, limits: TestLimits) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("learnpath-test.sled");

    // 直接构造 Config，避免 set_var 在并行测试中互相干扰
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        log_json: false,
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        jwt_secret: format!("integration-test-jwt-secret-{}", uuid::Uuid::new_v4()),
        cors_origin: "http://localhost:5173".to_string(),
        trust_proxy: false,
        rate_limit: RateLimitConfig {
            window_secs: 60,
            max_requests: limits.api,
            generation_max_requests: limits.generation,
        },
        generator: GeneratorConfig {
            max_attempts: 2,
            retry_backoff_ms: 0,
            timeout_secs: 5,
            ..GeneratorConfig::default()
        },
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let gateway = Arc::new(ContentGateway::new(
        generator,
        config.generator.max_attempts,
        Duration::from_secs(config.generator.timeout_secs),
        Duration::ZERO,
    ));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(store, gateway, &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with(Arc::new(FixtureGenerator::default()), TestLimits::default()).await
}

pub async fn spawn_test_app_with_limits(api: u64, generation: u64) -> TestApp {
    spawn_with(
        Arc::new(FixtureGenerator::default()),
        TestLimits { api, generation },
    )
    .await
}
