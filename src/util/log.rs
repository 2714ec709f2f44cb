use crate::util::config::{LevelConfig, LoggingConfig};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::fmt::format::Format;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 控制台日志的输出流
///
/// 服务端写 stdout；命令行工具的 stdout 留给结果（报告、JSON），日志写 stderr。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleOutput {
    Stdout,
    Stderr,
}

impl ConsoleOutput {
    /// 只有连到终端时才输出颜色转义
    pub fn is_terminal(self) -> bool {
        match self {
            ConsoleOutput::Stdout => io::stdout().is_terminal(),
            ConsoleOutput::Stderr => io::stderr().is_terminal(),
        }
    }
}

/// 按配置初始化日志：控制台 + 可选的按天滚动文件
///
/// 返回的 guard 必须由调用方持有，drop 后文件日志停止刷新。
pub fn log_init_with_config(
    file_prefix: &str,
    config: &LoggingConfig,
    console: ConsoleOutput,
) -> anyhow::Result<Option<WorkerGuard>> {
    let level_filter = parse_level(&config.level).unwrap_or(LevelFilter::INFO);
    let filter_expression = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| build_env_filter_expression(level_filter, config.level_config.as_ref()));
    let use_json = config.structured.unwrap_or(false);

    let console_filter = env_filter(&filter_expression, level_filter);
    let ansi = console.is_terminal();
    let stdio_layer = match console {
        ConsoleOutput::Stdout => console_layer(use_json, ansi, io::stdout, console_filter),
        ConsoleOutput::Stderr => console_layer(use_json, ansi, io::stderr, console_filter),
    };
    let mut layers: Vec<BoxedLayer> = vec![stdio_layer];

    let mut guard = None;
    let mut log_dir = None;
    if config.file.enabled {
        let dir = resolve_log_dir(&config.file.directory);
        std::fs::create_dir_all(&dir)?;

        let file_appender = daily(&dir, format!("{}.log", file_prefix));
        let (no_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        let file_filter = env_filter(&filter_expression, level_filter);
        let file_layer: BoxedLayer = if use_json {
            layer()
                .json()
                .with_ansi(false)
                .with_writer(no_blocking)
                .with_filter(file_filter)
                .boxed()
        } else {
            layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(no_blocking)
                .with_filter(file_filter)
                .boxed()
        };
        layers.push(file_layer);
        guard = Some(file_guard);
        log_dir = Some(dir);
    }

    Registry::default().with(layers).try_init()?;

    tracing::info!(
        event = "log.init",
        level = %config.level,
        filter = %filter_expression,
        structured = use_json,
        console = ?console,
        file = config.file.enabled,
        directory = %log_dir.as_deref().map(|d| d.display().to_string()).unwrap_or_default()
    );

    if let (Some(dir), Some(retention_days)) = (log_dir, config.file.retention_days) {
        if let Err(e) = cleanup_old_logs(&dir, file_prefix, retention_days) {
            tracing::warn!("日志清理失败: {}", e);
        }
    }

    Ok(guard)
}

fn console_layer<W>(use_json: bool, ansi: bool, writer: W, filter: EnvFilter) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if use_json {
        layer()
            .json()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        let console_format = Format::default()
            .without_time()
            .with_level(false)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);
        layer()
            .event_format(console_format)
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    }
}

fn env_filter(expression: &str, fallback: LevelFilter) -> EnvFilter {
    EnvFilter::try_new(expression).unwrap_or_else(|_| EnvFilter::new(level_filter_to_str(fallback)))
}

/// 相对路径基于工作目录；在 bin/ 下运行时取上级目录
fn resolve_log_dir(directory: &str) -> PathBuf {
    let path = Path::new(directory);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
        if let Some(parent) = current_dir.parent() {
            return parent.join(path);
        }
    }
    current_dir.join(path)
}

/// 删除超过保留天数的日志文件（只处理带前缀的文件）
pub fn cleanup_old_logs(log_dir: &Path, file_prefix: &str, retention_days: u32) -> anyhow::Result<usize> {
    if !log_dir.exists() {
        tracing::debug!("日志目录不存在: {}", log_dir.display());
        return Ok(0);
    }

    let retention = std::time::Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let cutoff = std::time::SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(std::time::UNIX_EPOCH);

    let mut deleted_count = 0;
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(file_prefix));
        if !is_log {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .or_else(|_| metadata.created())
            .unwrap_or_else(|_| std::time::SystemTime::now());
        if modified < cutoff {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    deleted_count += 1;
                    tracing::debug!("已删除过期日志: {}", path.display());
                }
                Err(e) => tracing::warn!("删除日志文件失败: {} - {}", path.display(), e),
            }
        }
    }

    if deleted_count > 0 {
        tracing::info!("已清理 {} 个过期日志文件，保留 {} 天", deleted_count, retention_days);
    }
    Ok(deleted_count)
}

fn build_env_filter_expression(default_level: LevelFilter, level_config: Option<&LevelConfig>) -> String {
    let mut directives = vec![level_filter_to_str(default_level).to_string()];

    if let Some(cfg) = level_config {
        if let Some(level) = cfg.api.as_deref().and_then(normalize_level_str) {
            directives.push(format!("ocr_eval::api={level}"));
            directives.push(format!("ocr_eval::model={level}"));
        }
        if let Some(level) = cfg.engine.as_deref().and_then(normalize_level_str) {
            directives.push(format!("ocr_conn={level}"));
        }
        if let Some(level) = cfg.evaluation.as_deref().and_then(normalize_level_str) {
            directives.push(format!("ocr_eval::eval={level}"));
        }
        if let Some(level) = cfg.system.as_deref().and_then(normalize_level_str) {
            directives.push(format!("ocr_eval::server={level}"));
        }

        let mut overrides: Vec<_> = cfg.overrides.iter().collect();
        overrides.sort();
        for (target, level_str) in overrides {
            if let Some(level) = normalize_level_str(level_str) {
                directives.push(format!("{}={level}", normalize_directive_target(target)));
            }
        }
    }

    directives.join(",")
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" => Some(LevelFilter::OFF),
        _ => None,
    }
}

fn normalize_level_str(level: &str) -> Option<&'static str> {
    parse_level(level).map(level_filter_to_str)
}

fn level_filter_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "off",
        LevelFilter::ERROR => "error",
        LevelFilter::WARN => "warn",
        LevelFilter::INFO => "info",
        LevelFilter::DEBUG => "debug",
        LevelFilter::TRACE => "trace",
    }
}

fn normalize_directive_target(target: &str) -> String {
    if let Some(raw) = target.strip_prefix("target:") {
        raw.to_string()
    } else if target.contains("::") {
        target.to_string()
    } else {
        let path = target.replace('.', "::");
        format!("ocr_eval::{path}")
    }
}
