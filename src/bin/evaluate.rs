//! 在 ICDAR 风格数据集上评测 OCR 准确率（子串命中率）

use anyhow::{Context, Result};
use clap::Parser;
use ocr_conn::Extractor;
use ocr_eval::eval::{EngineErrorPolicy, EvaluationOptions, Evaluator};
use ocr_eval::server::ConfigManager;
use ocr_eval::util::log::ConsoleOutput;
use std::path::PathBuf;

/// Evaluate OCR accuracy against ground-truth transcription files.
#[derive(Debug, Parser)]
#[clap(
    version,
    after_help = r#"
Ground-truth files are named `<prefix><image base name>.txt`, one region per
line: `x1,y1,x2,y2,x3,y3,x4,y4,transcription`. Regions marked `###` are ignored.

An image counts as matched when any of its transcriptions occurs as a substring
of the recognized text (at most one match per image).
"#
)]
struct Opts {
    /// Directory containing the images.
    #[clap(long, short = 'i')]
    images: Option<PathBuf>,

    /// Directory containing the ground-truth files.
    #[clap(long, short = 'g')]
    ground_truth: Option<PathBuf>,

    /// Ground-truth file name prefix.
    #[clap(long)]
    gt_prefix: Option<String>,

    /// Image extensions to include (comma separated).
    #[clap(long = "ext", value_delimiter = ',')]
    extensions: Vec<String>,

    /// What to do when the OCR engine fails on an image.
    #[clap(long, value_enum)]
    on_engine_error: Option<EngineErrorPolicy>,

    /// Stop at the first OCR failure (same as `--on-engine-error abort`).
    #[clap(long, conflicts_with = "on_engine_error")]
    fail_fast: bool,

    /// Disable text angle classification.
    #[clap(long)]
    no_angle_cls: bool,

    /// PaddleOCR-json working directory.
    #[clap(long)]
    engine_dir: Option<PathBuf>,

    /// Path to config.yaml.
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,

    /// Also write the full report as JSON.
    #[clap(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let (mut config, validation) = ConfigManager::load_optional(opts.config.as_deref())?;
    let _log_guard =
        ConfigManager::initialize_logging(&config, "ocr-evaluate", ConsoleOutput::Stderr)?;
    ConfigManager::log_validation_report(&validation);
    tracing::debug!("Parsed options: {:?}", opts);

    if let Some(dir) = &opts.engine_dir {
        config.ocr_engine.work_dir = Some(dir.display().to_string());
    }
    if opts.no_angle_cls {
        config.ocr_engine.use_angle_cls = false;
    }

    let mut options = EvaluationOptions::from_config(&config.evaluation);
    if let Some(dir) = opts.images {
        options.image_dir = dir;
    }
    if let Some(dir) = opts.ground_truth {
        options.gt_dir = dir;
    }
    if let Some(prefix) = opts.gt_prefix {
        options.gt_prefix = prefix;
    }
    if !opts.extensions.is_empty() {
        options.extensions = opts.extensions;
    }
    if let Some(policy) = opts.on_engine_error {
        options.on_engine_error = policy;
    }
    if opts.fail_fast {
        options.on_engine_error = EngineErrorPolicy::Abort;
    }

    // 引擎只启动一次，整个评测复用
    let mut engine = Extractor::new_with_options(config.ocr_engine.engine_options())
        .with_context(|| {
            format!(
                "无法启动OCR引擎: {}",
                config.ocr_engine.resolved_binary().display()
            )
        })?;

    let mut evaluator = Evaluator::new(&mut engine, options);
    let report = evaluator
        .run_with(|outcome| {
            for line in outcome.console_lines() {
                println!("{line}");
            }
        })
        .context("评测中止")?;

    if report.score.errored > 0 || report.score.skipped > 0 {
        println!(
            "\nSkipped: {}  OCR failed: {}",
            report.score.skipped, report.score.errored
        );
    }
    println!("\n{}", report.summary_line());

    if let Some(path) = &opts.json {
        let file = std::fs::File::create(path)
            .with_context(|| format!("无法创建报告文件: {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &report)
            .with_context(|| format!("写入报告失败: {}", path.display()))?;
        tracing::info!("[eval] 报告已写入 {}", path.display());
    }
    Ok(())
}
