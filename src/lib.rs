use std::sync::Arc;
use std::time::Instant;

use ocr_conn::ExtractorPool;

pub mod api;
pub mod build_info;
pub mod eval;
pub mod model;
pub mod server;
pub mod util;

use util::config::Config;

/// 应用状态：配置与引擎池在启动时创建一次，通过 axum State 传递
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: Arc<ExtractorPool>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let pool = ExtractorPool::new(
            config.ocr_pool.max_engines,
            config.ocr_engine.engine_options(),
        );
        Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
