//! 配置管理模块
//! 负责配置文件的查找、加载、验证与日志初始化

use crate::util::config::{Config, ConfigLoader, ConfigValidator, ValidationIssue, ValidationReport};
use crate::util::log::{log_init_with_config, ConsoleOutput};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 服务端使用：查找并加载配置，不存在时写入模板并使用默认值
    pub fn load_and_validate() -> Result<(Config, ValidationReport)> {
        let config_path = Self::find_config_file_path(CONFIG_FILE_NAME);
        let config = if config_path.exists() {
            ConfigLoader::load_with_env_overrides(&config_path)?
        } else {
            Self::write_template(&config_path);
            ConfigLoader::apply_env_overrides(Config::default())
        };

        let report = ConfigValidator::validate(&config);
        Ok((config, report))
    }

    /// 命令行工具使用：显式路径必须存在；未指定时查找，找不到则用默认值（不写模板）。
    /// 存在验证错误时直接失败，警告随报告返回，待日志就绪后输出
    pub fn load_optional(explicit: Option<&Path>) -> Result<(Config, ValidationReport)> {
        let config = Self::read_optional(explicit)?;
        let report = ConfigValidator::validate(&config);
        if report.has_errors() {
            let errors: Vec<String> = report
                .issues
                .iter()
                .filter(|issue| matches!(issue, ValidationIssue::Error(_)))
                .map(ToString::to_string)
                .collect();
            bail!("配置验证失败: {}", errors.join("; "));
        }
        Ok((config, report))
    }

    fn read_optional(explicit: Option<&Path>) -> Result<Config> {
        if let Some(path) = explicit {
            if !path.exists() {
                bail!("配置文件不存在: {}", path.display());
            }
            return ConfigLoader::load_with_env_overrides(path);
        }
        let path = Self::find_config_file_path(CONFIG_FILE_NAME);
        if path.exists() {
            ConfigLoader::load_with_env_overrides(&path)
        } else {
            Ok(ConfigLoader::apply_env_overrides(Config::default()))
        }
    }

    fn write_template(config_path: &Path) {
        match Config::default().write_yaml_to_path(config_path) {
            Ok(()) => eprintln!("[note] 配置文件不存在，已生成模板: {}", config_path.display()),
            Err(e) => eprintln!("[warn] 生成配置模板失败: {} - {}", config_path.display(), e),
        }
    }

    /// 初始化日志系统，返回的 guard 需要在进程生命周期内持有
    pub fn initialize_logging(
        config: &Config,
        file_prefix: &str,
        console: ConsoleOutput,
    ) -> Result<Option<WorkerGuard>> {
        log_init_with_config(file_prefix, &config.logging, console)
    }

    /// 日志就绪后输出配置验证结果
    pub fn log_validation_report(report: &ValidationReport) {
        for issue in &report.issues {
            match issue {
                ValidationIssue::Error(_) => warn!(target: "server.config", "[fail] {}", issue),
                ValidationIssue::Warning(_) => info!(target: "server.config", "ℹ {}", issue),
            }
        }
        if !report.issues.is_empty() {
            info!(
                target: "server.config",
                errors = report.error_count(),
                warnings = report.warning_count(),
                "配置验证完成"
            );
        }
    }

    /// 智能查找配置文件路径，适应开发和生产环境
    pub fn find_config_file_path(filename: &str) -> PathBuf {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        Self::search_config(&current_dir, exe_dir.as_deref(), filename)
    }

    fn search_config(current_dir: &Path, exe_dir: Option<&Path>, filename: &str) -> PathBuf {
        let mut candidates = vec![current_dir.join("config").join(filename)];
        // 在 bin/ 下运行时，配置位于上级目录
        if let Some(parent) = current_dir.parent() {
            candidates.push(parent.join("config").join(filename));
        }
        if let Some(exe_dir) = exe_dir {
            candidates.push(exe_dir.join("config").join(filename));
            if exe_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
                if let Some(root) = exe_dir.parent() {
                    candidates.push(root.join("config").join(filename));
                }
            }
        }
        candidates.push(current_dir.join(filename));

        if let Some(found) = candidates.iter().find(|p| p.exists()) {
            return found.clone();
        }

        // 都不存在：bin/ 下返回上级 config/，否则返回 ./config/
        if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
            if let Some(parent) = current_dir.parent() {
                return parent.join("config").join(filename);
            }
        }
        current_dir.join("config").join(filename)
    }
}
