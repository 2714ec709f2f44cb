//! 配置加载和管理模块
//! 处理配置文件的读取、写入和环境变量覆盖

use super::types::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从YAML文件读取配置
    pub fn read_yaml(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config = serde_yaml::from_str(&config_str)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(config)
    }

    /// 读取配置并应用环境变量覆盖
    pub fn load_with_env_overrides(path: impl AsRef<Path>) -> Result<Config> {
        let config = Self::read_yaml(path)?;
        Ok(Self::apply_env_overrides(config))
    }

    /// 从环境变量读取配置覆盖
    pub fn apply_env_overrides(config: Config) -> Config {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    fn apply_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
        if let Some(host) = var("OCR_HOST") {
            tracing::info!("[ok] 环境变量覆盖服务器地址: {}", host);
            config.server.host = host;
        }

        if let Some(port) = var("OCR_PORT").and_then(|p| p.parse::<u16>().ok()) {
            config.server.port = port;
            tracing::info!("[ok] 环境变量覆盖服务器端口: {}", port);
        }

        if let Some(dir) = var("OCR_ENGINE_DIR") {
            tracing::info!("[ok] 环境变量覆盖OCR引擎目录: {}", dir);
            config.ocr_engine.work_dir = Some(dir);
        }

        if let Some(bin) = var("OCR_ENGINE_BIN") {
            tracing::info!("[ok] 环境变量覆盖OCR引擎路径: {}", bin);
            config.ocr_engine.binary = Some(bin);
        }

        if let Some(level) = var("OCR_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(size) = var("OCR_POOL_SIZE").and_then(|s| s.parse::<usize>().ok()) {
            config.ocr_pool.max_engines = size;
            tracing::info!("[ok] 环境变量覆盖OCR引擎池容量: {}", size);
        }

        config
    }
}

/// 配置写入器
pub struct ConfigWriter;

impl ConfigWriter {
    /// 生成默认配置模板
    pub fn generate_template() -> Config {
        Config::default()
    }

    /// 写入YAML文件，必要时创建目录
    pub fn write_yaml_with_dir(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("创建配置目录失败: {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(config)?;
        fs::write(path, yaml).with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }
}
