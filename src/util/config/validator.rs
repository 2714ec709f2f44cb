//! 配置验证模块

use super::types::Config;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    Error(String),
    Warning(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::Error(msg) => write!(f, "[error] {}", msg),
            ValidationIssue::Warning(msg) => write!(f, "[warn] {}", msg),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn error(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Error(msg.into()));
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Warning(msg.into()));
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, ValidationIssue::Error(_)))
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len() - self.error_count()
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> ValidationReport {
        let mut report = ValidationReport::default();

        if config.server.port == 0 {
            report.error("端口不能为0");
        } else if config.server.port < 1024 {
            report.warning("使用了特权端口，可能需要管理员权限");
        }
        if config.server.host.trim().is_empty() {
            report.error("主机配置不能为空");
        }

        if config.ocr_pool.max_engines == 0 {
            report.error("ocr_pool.max_engines 必须大于0");
        }
        if config.ocr_pool.prewarm > config.ocr_pool.max_engines {
            report.warning("ocr_pool.prewarm 大于引擎池容量，将按容量预热");
        }
        if config.ocr_engine.timeout_secs == Some(0) {
            report.error("ocr_engine.timeout_secs 不能为0");
        }
        if config.ocr_engine.min_dimension == 0 {
            report.warning("ocr_engine.min_dimension 为0，过小图片不会被拦截");
        }

        if config.upload.max_file_mb == 0 {
            report.error("upload.max_file_mb 必须大于0");
        }
        if config.upload.max_file_mb > config.ocr_engine.max_input_mb {
            report.warning("upload.max_file_mb 大于 ocr_engine.max_input_mb，超出部分会被引擎校验拒绝");
        }

        if config.evaluation.image_extensions.is_empty() {
            report.error("evaluation.image_extensions 不能为空");
        }
        if config
            .evaluation
            .image_extensions
            .iter()
            .any(|ext| ext.starts_with('.'))
        {
            report.warning("evaluation.image_extensions 无需包含前导点");
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let report = ConfigValidator::validate(&Config::default());
        assert!(!report.has_errors(), "{:?}", report.issues);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut config = Config::default();
        config.server.port = 0;
        config.ocr_pool.max_engines = 0;
        config.evaluation.image_extensions.clear();

        let report = ConfigValidator::validate(&config);
        assert_eq!(report.error_count(), 3);
        // prewarm(1) > max_engines(0)
        assert_eq!(report.warning_count(), 1);
    }
}
