//! 服务器模块
//!
//! - 配置管理 (config.rs)
//! - HTTP服务器设置 (http.rs)
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use ocr_eval::server::ServerBootstrap;
//!
//! let server = ServerBootstrap::new()?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http;

pub use config::ConfigManager;
pub use http::{HttpServer, ServerManager};

use crate::build_info;
use crate::util::config::{Config, ConfigValidator};
use crate::util::log::ConsoleOutput;
use crate::AppState;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::PathBuf;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

const PREWARM_TIMEOUT: Duration = Duration::from_secs(30);

/// 服务器引导程序 - 统一的服务器启动入口
pub struct ServerBootstrap {
    config: Config,
    _log_guard: Option<WorkerGuard>,
}

impl ServerBootstrap {
    pub fn new() -> Result<Self> {
        let (config, validation_report) = ConfigManager::load_and_validate()?;
        let log_guard =
            ConfigManager::initialize_logging(&config, "ocr-server", ConsoleOutput::Stdout)?;
        ConfigManager::log_validation_report(&validation_report);

        if validation_report.has_errors() {
            return Err(anyhow!(
                "配置验证失败: {} 个错误",
                validation_report.error_count()
            ));
        }

        info!("[ok] 服务器引导程序初始化完成");
        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    /// 启动服务器，阻塞直到收到关闭信号
    pub async fn start(self) -> Result<()> {
        info!("=== OCR服务启动 ===");
        info!("版本信息: {}", build_info::summary());
        info!("服务地址: {}", self.config.base_url());

        let app_state = AppState::new(self.config.clone());
        info!(
            capacity = app_state.pool.capacity(),
            binary = %self.config.ocr_engine.resolved_binary().display(),
            "[build] OCR引擎池已创建"
        );

        match timeout(PREWARM_TIMEOUT, Self::prewarm_ocr_engines(&app_state, self.config.ocr_pool.prewarm)).await {
            Ok(()) => {}
            Err(_) => {
                warn!("[warn] OCR引擎预热超时（{}秒），跳过预热继续启动", PREWARM_TIMEOUT.as_secs());
                warn!("首次OCR请求可能会有延迟");
            }
        }

        let pool = app_state.pool.clone();
        let server = ServerManager::create_server(&self.config, app_state).await?;
        let result = ServerManager::start_server(server).await;

        // 关闭引擎池：拒绝新的请求并回收空闲引擎进程
        pool.close();
        info!("[ok] OCR引擎池已关闭");
        result
    }

    /// 预热若干引擎，失败只告警（首个请求时会再次尝试启动）
    async fn prewarm_ocr_engines(app_state: &AppState, count: usize) {
        if count == 0 {
            return;
        }
        let pool = app_state.pool.clone();
        match tokio::task::spawn_blocking(move || pool.prewarm(count)).await {
            Ok(Ok(started)) => info!("[ok] OCR引擎预热完成，启动 {} 个", started),
            Ok(Err(e)) => warn!("[warn] OCR引擎预热失败: {}", e),
            Err(e) => warn!("[warn] OCR引擎预热任务异常: {}", e),
        }
    }
}

/// 启动服务器的便捷函数
pub async fn start_server() -> Result<()> {
    let server = ServerBootstrap::new()?;
    server.start().await
}

/// 启动前自检结果
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealthReport {
    pub overall_healthy: bool,
    pub config_errors: Vec<String>,
    pub engine_binary: PathBuf,
    pub engine_binary_exists: bool,
    pub log_directory_ok: bool,
}

/// 检查系统健康状态（不启动服务）
pub async fn check_system_health() -> Result<SystemHealthReport> {
    let (config, _) = ConfigManager::load_and_validate()?;
    Ok(check_config_health(&config))
}

pub fn check_config_health(config: &Config) -> SystemHealthReport {
    let config_errors: Vec<String> = ConfigValidator::validate(config)
        .issues
        .iter()
        .filter(|issue| matches!(issue, crate::util::config::ValidationIssue::Error(_)))
        .map(|issue| issue.to_string())
        .collect();

    let engine_binary = config.ocr_engine.resolved_binary();
    let engine_binary_exists = engine_binary.is_file();

    let log_directory_ok = if config.logging.file.enabled {
        std::fs::create_dir_all(&config.logging.file.directory).is_ok()
    } else {
        true
    };

    SystemHealthReport {
        overall_healthy: config_errors.is_empty() && engine_binary_exists && log_directory_ok,
        config_errors,
        engine_binary,
        engine_binary_exists,
        log_directory_ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_health_reports_missing_engine() {
        let mut config = Config::default();
        config.ocr_engine.binary = Some("/nonexistent/PaddleOCR-json".to_string());
        let report = check_config_health(&config);
        assert!(!report.overall_healthy);
        assert!(!report.engine_binary_exists);
        assert!(report.config_errors.is_empty());
        assert!(report.log_directory_ok);
    }

    #[test]
    fn test_health_with_engine_present() {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("PaddleOCR-json");
        std::fs::write(&binary, b"").unwrap();

        let mut config = Config::default();
        config.ocr_engine.work_dir = Some(dir.path().display().to_string());
        config.logging.file.enabled = true;
        config.logging.file.directory = dir.path().join("logs").display().to_string();
        config.server.port = 0;

        let report = check_config_health(&config);
        assert!(report.engine_binary_exists);
        assert!(report.log_directory_ok);
        assert_eq!(report.config_errors.len(), 1);
        assert!(!report.overall_healthy);
    }
}
