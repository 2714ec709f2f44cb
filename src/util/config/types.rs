//! 配置结构定义模块
//! 包含系统配置的所有数据结构

use crate::eval::EngineErrorPolicy;
use ocr_conn::{ImageLimits, OcrEngineOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ocr_engine: OcrEngineConfig,
    #[serde(default)]
    pub ocr_pool: OcrPoolConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// 单个请求的超时时间（秒），包含排队等待引擎的时间
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            protocol: default_protocol(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: LogFileConfig,
    /// 是否输出 JSON 结构化日志
    #[serde(default)]
    pub structured: Option<bool>,
    #[serde(default)]
    pub level_config: Option<LevelConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: LogFileConfig::default(),
            structured: None,
            level_config: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 日志文件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    pub enabled: bool,
    pub directory: String,
    pub retention_days: Option<u32>,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "logs".to_string(),
            retention_days: Some(7),
        }
    }
}

/// 按模块调整日志级别
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelConfig {
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub evaluation: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

/// 本地OCR引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrEngineConfig {
    /// 引擎工作的目录（包含 PaddleOCR-json, lib/, models/）
    #[serde(default)]
    pub work_dir: Option<String>,
    /// 二进制路径（默认 work_dir/PaddleOCR-json）
    #[serde(default)]
    pub binary: Option<String>,
    /// 依赖库目录（默认 work_dir/lib）
    #[serde(default)]
    pub lib_path: Option<String>,
    /// 单次响应超时（秒），默认 10
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub use_angle_cls: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_max_input_mb")]
    pub max_input_mb: u64,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,
}

impl Default for OcrEngineConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            binary: None,
            lib_path: None,
            timeout_secs: None,
            use_angle_cls: true,
            extra_args: Vec::new(),
            max_input_mb: default_max_input_mb(),
            max_pixels: default_max_pixels(),
            min_dimension: default_min_dimension(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_input_mb() -> u64 {
    10
}
fn default_max_pixels() -> u64 {
    25_000_000
}
fn default_min_dimension() -> u32 {
    16
}

impl OcrEngineConfig {
    pub fn limits(&self) -> ImageLimits {
        ImageLimits {
            max_input_bytes: (self.max_input_mb * 1024 * 1024) as usize,
            max_pixels: self.max_pixels,
            min_dimension: self.min_dimension,
        }
    }

    /// 构建OCR引擎启动选项
    pub fn engine_options(&self) -> OcrEngineOptions {
        OcrEngineOptions {
            work_dir: self.work_dir.as_ref().map(PathBuf::from),
            binary: self.binary.as_ref().map(PathBuf::from),
            lib_path: self.lib_path.as_ref().map(PathBuf::from),
            timeout_secs: self.timeout_secs,
            use_angle_cls: self.use_angle_cls,
            extra_args: self.extra_args.clone(),
            limits: self.limits(),
        }
    }

    /// 引擎二进制的实际路径（用于健康检查）
    pub fn resolved_binary(&self) -> PathBuf {
        let (_, binary, _) = self.engine_options().resolve_paths();
        binary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrPoolConfig {
    #[serde(default = "default_ocr_pool_max_engines")]
    pub max_engines: usize,
    /// 启动时预热的引擎数量
    #[serde(default = "default_ocr_pool_prewarm")]
    pub prewarm: usize,
}

impl Default for OcrPoolConfig {
    fn default() -> Self {
        Self {
            max_engines: default_ocr_pool_max_engines(),
            prewarm: default_ocr_pool_prewarm(),
        }
    }
}

const fn default_ocr_pool_max_engines() -> usize {
    2
}

const fn default_ocr_pool_prewarm() -> usize {
    1
}

/// 上传接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_max_file_mb")]
    pub max_file_mb: u64,
    /// multipart 中图片字段名
    #[serde(default = "default_upload_field")]
    pub field_name: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_mb: default_upload_max_file_mb(),
            field_name: default_upload_field(),
        }
    }
}

fn default_upload_max_file_mb() -> u64 {
    10
}

fn default_upload_field() -> String {
    "image".to_string()
}

impl UploadConfig {
    pub fn max_body_bytes(&self) -> usize {
        // multipart 边界与表单头需要少量余量
        (self.max_file_mb * 1024 * 1024) as usize + 64 * 1024
    }
}

/// 准确率评测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    #[serde(default = "default_gt_dir")]
    pub gt_dir: String,
    #[serde(default = "default_gt_prefix")]
    pub gt_prefix: String,
    #[serde(default = "default_eval_extensions")]
    pub image_extensions: Vec<String>,
    /// 批量识别时接受的图片扩展名
    #[serde(default = "default_batch_extensions")]
    pub batch_extensions: Vec<String>,
    #[serde(default)]
    pub on_engine_error: EngineErrorPolicy,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            gt_dir: default_gt_dir(),
            gt_prefix: default_gt_prefix(),
            image_extensions: default_eval_extensions(),
            batch_extensions: default_batch_extensions(),
            on_engine_error: EngineErrorPolicy::default(),
        }
    }
}

fn default_image_dir() -> String {
    "dataset/ch4_test_images".to_string()
}
fn default_gt_dir() -> String {
    "dataset/ch4_test_localization_transcription_gt".to_string()
}
fn default_gt_prefix() -> String {
    "gt_".to_string()
}
fn default_eval_extensions() -> Vec<String> {
    ["jpg", "png", "jpeg"].iter().map(|s| s.to_string()).collect()
}
fn default_batch_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "bmp", "tiff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    pub fn get_port(&self) -> u16 {
        self.server.port
    }

    /// 获取基础URL
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.server.protocol, self.server.host, self.server.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
server:
  host: 0.0.0.0
  port: 9000
ocr_engine:
  work_dir: /opt/paddleocr
  use_angle_cls: false
evaluation:
  on_engine_error: abort
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.get_port(), 9000);
        assert_eq!(config.server.request_timeout_secs, 120);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ocr_pool.max_engines, 2);
        assert_eq!(config.upload.field_name, "image");
        assert_eq!(config.evaluation.gt_prefix, "gt_");
        assert_eq!(config.evaluation.on_engine_error, EngineErrorPolicy::Abort);

        let opts = config.ocr_engine.engine_options();
        assert_eq!(opts.work_dir, Some(PathBuf::from("/opt/paddleocr")));
        assert!(!opts.use_angle_cls);
        assert_eq!(opts.limits.max_input_bytes, 10 * 1024 * 1024);
        assert_eq!(
            config.ocr_engine.resolved_binary(),
            PathBuf::from("/opt/paddleocr/PaddleOCR-json")
        );
    }

    #[test]
    fn test_relative_engine_dir_resolves_from_process_dir() {
        let mut engine = OcrEngineConfig::default();
        engine.work_dir = Some("ocr".to_string());
        let binary = engine.resolved_binary();
        assert!(binary.is_absolute());
        assert_eq!(binary, ocr_conn::CURRENT_DIR.join("ocr").join("PaddleOCR-json"));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.base_url(), "http://127.0.0.1:8000");
        assert_eq!(config.evaluation.image_extensions, vec!["jpg", "png", "jpeg"]);
        assert_eq!(config.evaluation.on_engine_error, EngineErrorPolicy::Record);
    }
}
