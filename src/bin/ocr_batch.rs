//! 批量识别目录下的图片并打印文本与置信度；传入单个文件时输出原始识别结果

use anyhow::{Context, Result};
use clap::Parser;
use ocr_conn::{Extractor, TextRecognizer};
use ocr_eval::eval::batch;
use ocr_eval::server::ConfigManager;
use ocr_eval::util::log::ConsoleOutput;
use std::path::PathBuf;

/// Run OCR over a directory of images, or over a single image.
#[derive(Debug, Parser)]
#[clap(version)]
struct Opts {
    /// Image directory or a single image file.
    #[clap(default_value = "dataset/ch4_training_images")]
    path: PathBuf,

    /// Image extensions to include in directory mode (comma separated).
    #[clap(long = "ext", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Disable text angle classification.
    #[clap(long)]
    no_angle_cls: bool,

    /// PaddleOCR-json working directory.
    #[clap(long)]
    engine_dir: Option<PathBuf>,

    /// Path to config.yaml.
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let (mut config, validation) = ConfigManager::load_optional(opts.config.as_deref())?;
    let _log_guard =
        ConfigManager::initialize_logging(&config, "ocr-batch", ConsoleOutput::Stderr)?;
    ConfigManager::log_validation_report(&validation);

    if let Some(dir) = &opts.engine_dir {
        config.ocr_engine.work_dir = Some(dir.display().to_string());
    }
    if opts.no_angle_cls {
        config.ocr_engine.use_angle_cls = false;
    }

    let mut engine = Extractor::new_with_options(config.ocr_engine.engine_options())
        .with_context(|| {
            format!(
                "无法启动OCR引擎: {}",
                config.ocr_engine.resolved_binary().display()
            )
        })?;

    if opts.path.is_file() {
        let detections = engine
            .recognize(&opts.path)
            .with_context(|| format!("识别失败: {}", opts.path.display()))?;
        println!("{}", serde_json::to_string_pretty(&detections)?);
        return Ok(());
    }

    let extensions = if opts.extensions.is_empty() {
        config.evaluation.batch_extensions.clone()
    } else {
        opts.extensions
    };
    let summary = batch::recognize_dir(&mut engine, &opts.path, &extensions, |item| {
        println!("\nImage: {}", item.image.file_name);
        for line in item.render_lines() {
            println!("{line}");
        }
    })?;

    tracing::info!(
        images = summary.images,
        with_text = summary.with_text,
        without_text = summary.without_text,
        failed = summary.failed,
        "[batch] 完成"
    );
    Ok(())
}
