//! OCR 准确率评测
//!
//! - dataset: 图片目录遍历与标注文件命名
//! - ground_truth: 标注文件解析
//! - score: 预测文本与计分
//! - batch: 批量识别输出
//!
//! 准确率口径为子串包含（不是编辑距离），每张图片最多命中一次。

pub mod batch;
pub mod dataset;
pub mod ground_truth;
pub mod score;

pub use dataset::ImageRecord;
pub use ground_truth::GroundTruth;
pub use score::{Prediction, ScoreBoard};

use crate::util::config::EvaluationConfig;
use ocr_conn::{OcrError, TextRecognizer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("无法读取目录 {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("无法读取标注文件 {path}: {source}")]
    ReadGroundTruth {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("图片 {image} 识别失败: {source}")]
    Engine {
        image: String,
        #[source]
        source: OcrError,
    },
}

/// OCR 调用失败时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineErrorPolicy {
    /// 立即终止评测并返回错误
    Abort,
    /// 记录到 errored 计数后继续
    #[default]
    Record,
}

/// 单张图片的评测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImageOutcome {
    MissingGroundTruth {
        image: String,
        ground_truth: String,
    },
    EmptyGroundTruth {
        image: String,
        ground_truth: String,
    },
    Matched {
        image: String,
        prediction: String,
        expected: Vec<String>,
        matched: String,
    },
    NoMatch {
        image: String,
        prediction: String,
        expected: Vec<String>,
    },
    EngineFailed {
        image: String,
        error: String,
    },
}

impl ImageOutcome {
    pub fn image(&self) -> &str {
        match self {
            ImageOutcome::MissingGroundTruth { image, .. }
            | ImageOutcome::EmptyGroundTruth { image, .. }
            | ImageOutcome::Matched { image, .. }
            | ImageOutcome::NoMatch { image, .. }
            | ImageOutcome::EngineFailed { image, .. } => image,
        }
    }

    /// 控制台输出的行
    pub fn console_lines(&self) -> Vec<String> {
        match self {
            ImageOutcome::MissingGroundTruth { ground_truth, .. } => {
                vec![format!("❌ Missing GT: {}", ground_truth)]
            }
            ImageOutcome::EmptyGroundTruth { ground_truth, .. } => {
                vec![format!("⚠️ No valid GT text in {}", ground_truth)]
            }
            ImageOutcome::Matched {
                image,
                prediction,
                expected,
                ..
            } => summary_lines(image, prediction, expected),
            ImageOutcome::NoMatch {
                image,
                prediction,
                expected,
            } => {
                let mut lines = summary_lines(image, prediction, expected);
                lines.push("❌ No match".to_string());
                lines
            }
            ImageOutcome::EngineFailed { image, error } => vec![
                String::new(),
                format!("Image: {}", image),
                format!("❌ OCR failed: {}", error),
            ],
        }
    }
}

fn summary_lines(image: &str, prediction: &str, expected: &[String]) -> Vec<String> {
    vec![
        String::new(),
        format!("Image: {}", image),
        format!("OCR : {}", prediction),
        format!("GT  : {:?}", expected),
    ]
}

/// 一次评测的输入
#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    pub image_dir: PathBuf,
    pub gt_dir: PathBuf,
    pub gt_prefix: String,
    pub extensions: Vec<String>,
    pub on_engine_error: EngineErrorPolicy,
}

impl EvaluationOptions {
    pub fn new(image_dir: impl Into<PathBuf>, gt_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(&EvaluationConfig::default()).with_dirs(image_dir, gt_dir)
    }

    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self {
            image_dir: PathBuf::from(&config.image_dir),
            gt_dir: PathBuf::from(&config.gt_dir),
            gt_prefix: config.gt_prefix.clone(),
            extensions: config.image_extensions.clone(),
            on_engine_error: config.on_engine_error,
        }
    }

    pub fn with_dirs(mut self, image_dir: impl Into<PathBuf>, gt_dir: impl Into<PathBuf>) -> Self {
        self.image_dir = image_dir.into();
        self.gt_dir = gt_dir.into();
        self
    }
}

/// 评测报告：逐图结果与计分
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    pub outcomes: Vec<ImageOutcome>,
    pub score: ScoreBoard,
    pub accuracy: f64,
}

impl EvaluationReport {
    pub fn accuracy(&self) -> f64 {
        self.score.accuracy()
    }

    pub fn summary_line(&self) -> String {
        format!("✅ OCR Accuracy: {:.2}%", self.accuracy())
    }
}

/// 准确率评测器，引擎由调用方构造后注入，整次评测复用同一个引擎
pub struct Evaluator<E> {
    engine: E,
    options: EvaluationOptions,
}

impl<E: TextRecognizer> Evaluator<E> {
    pub fn new(engine: E, options: EvaluationOptions) -> Self {
        Self { engine, options }
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn run(&mut self) -> Result<EvaluationReport, EvalError> {
        self.run_with(|_| {})
    }

    /// 逐张评测；每得到一个结果立即回调，便于实时输出
    pub fn run_with<F>(&mut self, mut on_outcome: F) -> Result<EvaluationReport, EvalError>
    where
        F: FnMut(&ImageOutcome),
    {
        let images = dataset::list_images(&self.options.image_dir, &self.options.extensions)?;
        info!(
            image_dir = %self.options.image_dir.display(),
            gt_dir = %self.options.gt_dir.display(),
            images = images.len(),
            policy = ?self.options.on_engine_error,
            "[eval] 开始评测"
        );

        let start = Instant::now();
        let mut report = EvaluationReport::default();
        for image in &images {
            let outcome = self.evaluate_image(image, &mut report.score)?;
            on_outcome(&outcome);
            report.outcomes.push(outcome);
        }
        report.accuracy = report.score.accuracy();

        info!(
            total = report.score.total,
            matched = report.score.matched,
            errored = report.score.errored,
            skipped = report.score.skipped,
            accuracy = report.accuracy,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "[eval] 评测完成"
        );
        Ok(report)
    }

    /// 评测单张图片并更新计分
    pub fn evaluate_image(
        &mut self,
        image: &ImageRecord,
        board: &mut ScoreBoard,
    ) -> Result<ImageOutcome, EvalError> {
        let gt_name = image.ground_truth_file_name(&self.options.gt_prefix);
        let gt_path = self.options.gt_dir.join(&gt_name);

        let Some(ground_truth) = GroundTruth::load(&gt_path)? else {
            debug!(image = %image.file_name, "缺少标注文件 {}", gt_path.display());
            board.skipped += 1;
            return Ok(ImageOutcome::MissingGroundTruth {
                image: image.file_name.clone(),
                ground_truth: gt_name,
            });
        };
        if ground_truth.malformed_lines > 0 {
            debug!(
                image = %image.file_name,
                malformed = ground_truth.malformed_lines,
                "标注文件存在字段不足的行"
            );
        }
        if ground_truth.is_empty() {
            board.skipped += 1;
            return Ok(ImageOutcome::EmptyGroundTruth {
                image: image.file_name.clone(),
                ground_truth: gt_name,
            });
        }

        let detections = match self.engine.recognize(&image.path) {
            Ok(detections) => detections,
            Err(source) => match self.options.on_engine_error {
                EngineErrorPolicy::Abort => {
                    return Err(EvalError::Engine {
                        image: image.file_name.clone(),
                        source,
                    })
                }
                EngineErrorPolicy::Record => {
                    warn!(image = %image.file_name, error = %source, "[eval] 识别失败，已记录并继续");
                    board.errored += 1;
                    return Ok(ImageOutcome::EngineFailed {
                        image: image.file_name.clone(),
                        error: source.to_string(),
                    });
                }
            },
        };

        let prediction = Prediction::from_fragments(detections.iter().map(|d| d.text.as_str()));
        let matched = board.score(&prediction, &ground_truth).map(str::to_string);
        let outcome = match matched {
            Some(matched) => ImageOutcome::Matched {
                image: image.file_name.clone(),
                prediction: prediction.text,
                expected: ground_truth.texts,
                matched,
            },
            None => ImageOutcome::NoMatch {
                image: image.file_name.clone(),
                prediction: prediction.text,
                expected: ground_truth.texts,
            },
        };
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ocr_conn::ContentData;
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use tempfile::TempDir;

    /// 按文件名返回预设文本块的假引擎
    #[derive(Default)]
    pub(crate) struct MockRecognizer {
        fragments: HashMap<String, Vec<String>>,
        failing: HashSet<String>,
        pub calls: Vec<String>,
    }

    impl MockRecognizer {
        pub fn with(mut self, file_name: &str, fragments: &[&str]) -> Self {
            self.fragments.insert(
                file_name.to_string(),
                fragments.iter().map(|s| s.to_string()).collect(),
            );
            self
        }

        pub fn failing(mut self, file_name: &str) -> Self {
            self.failing.insert(file_name.to_string());
            self
        }
    }

    impl TextRecognizer for MockRecognizer {
        fn recognize(&mut self, path: &Path) -> Result<Vec<ContentData>, OcrError> {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            self.calls.push(name.clone());
            if self.failing.contains(&name) {
                return Err(OcrError::Engine {
                    code: 500,
                    message: "mock engine crashed".to_string(),
                });
            }
            Ok(self
                .fragments
                .get(&name)
                .map(|texts| {
                    texts
                        .iter()
                        .map(|text| ContentData {
                            rect: [[0, 0], [1, 0], [1, 1], [0, 1]],
                            score: 0.99,
                            text: text.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    struct Dataset {
        _root: TempDir,
        images: PathBuf,
        gt: PathBuf,
    }

    impl Dataset {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let images = root.path().join("images");
            let gt = root.path().join("gt");
            std::fs::create_dir_all(&images).unwrap();
            std::fs::create_dir_all(&gt).unwrap();
            Self {
                _root: root,
                images,
                gt,
            }
        }

        fn image(self, name: &str) -> Self {
            std::fs::write(self.images.join(name), b"fake").unwrap();
            self
        }

        fn ground_truth(self, name: &str, content: &str) -> Self {
            std::fs::write(self.gt.join(name), content).unwrap();
            self
        }

        fn options(&self) -> EvaluationOptions {
            EvaluationOptions::new(&self.images, &self.gt)
        }
    }

    const HELLO_GT: &str = "10,10,50,10,50,30,10,30,Hello\n";

    #[test]
    fn test_split_fragments_match() {
        let data = Dataset::new()
            .image("img_1.jpg")
            .ground_truth("gt_img_1.txt", HELLO_GT);
        let engine = MockRecognizer::default().with("img_1.jpg", &["He", "llo", "world"]);

        let report = Evaluator::new(engine, data.options()).run().unwrap();
        assert_eq!(report.score.total, 1);
        assert_eq!(report.score.matched, 1);
        assert_eq!(report.accuracy(), 100.0);
        assert_eq!(report.summary_line(), "✅ OCR Accuracy: 100.00%");
        assert!(matches!(
            &report.outcomes[0],
            ImageOutcome::Matched { matched, .. } if matched == "hello"
        ));
    }

    #[test]
    fn test_no_match() {
        let data = Dataset::new()
            .image("img_1.jpg")
            .ground_truth("gt_img_1.txt", HELLO_GT);
        let engine = MockRecognizer::default().with("img_1.jpg", &["goodbye"]);

        let report = Evaluator::new(engine, data.options()).run().unwrap();
        assert_eq!(report.score.total, 1);
        assert_eq!(report.score.matched, 0);
        assert_eq!(report.summary_line(), "✅ OCR Accuracy: 0.00%");
        assert_eq!(
            report.outcomes[0].console_lines(),
            vec![
                "".to_string(),
                "Image: img_1.jpg".to_string(),
                "OCR : goodbye".to_string(),
                "GT  : [\"hello\"]".to_string(),
                "❌ No match".to_string(),
            ]
        );
    }

    #[test]
    fn test_malformed_only_line_skips_image() {
        let data = Dataset::new()
            .image("img_1.jpg")
            .ground_truth("gt_img_1.txt", "1,2,3,4,###\n");
        let mut engine = MockRecognizer::default().with("img_1.jpg", &["hello"]);

        let report = Evaluator::new(&mut engine, data.options()).run().unwrap();
        assert_eq!(report.score.total, 0);
        assert_eq!(report.score.skipped, 1);
        assert_eq!(report.accuracy(), 0.0);
        assert_eq!(
            report.outcomes[0].console_lines(),
            vec!["⚠️ No valid GT text in gt_img_1.txt"]
        );
        // 无有效标注时不调用引擎
        assert!(engine.calls.is_empty());
    }

    #[test]
    fn test_missing_ground_truth_is_skipped() {
        let data = Dataset::new()
            .image("img_1.jpg")
            .image("img_2.png")
            .ground_truth("gt_img_1.txt", HELLO_GT);
        let engine = MockRecognizer::default().with("img_1.jpg", &["hello"]);

        let report = Evaluator::new(engine, data.options()).run().unwrap();
        assert_eq!(report.score.total, 1);
        assert_eq!(report.score.matched, 1);
        assert_eq!(report.score.skipped, 1);
        assert_eq!(
            report.outcomes[1],
            ImageOutcome::MissingGroundTruth {
                image: "img_2.png".to_string(),
                ground_truth: "gt_img_2.txt".to_string(),
            }
        );
        assert_eq!(report.outcomes[1].console_lines(), vec!["❌ Missing GT: gt_img_2.txt"]);
    }

    #[test]
    fn test_one_match_per_image_and_unknown_extensions() {
        let data = Dataset::new()
            .image("img_1.JPG")
            .image("img_2.jpeg")
            .image("img_3.gif")
            .ground_truth("gt_img_1.txt", "0,0,1,0,1,1,0,1,exit\n0,0,1,0,1,1,0,1,open\n")
            .ground_truth("gt_img_2.txt", "0,0,1,0,1,1,0,1,stop\n0,0,1,0,1,1,0,1,go\n")
            .ground_truth("gt_img_3.txt", HELLO_GT);
        let engine = MockRecognizer::default()
            .with("img_1.JPG", &["EXIT", "OPEN"])
            .with("img_2.jpeg", &["let's", "go"])
            .with("img_3.gif", &["hello"]);

        let mut evaluator = Evaluator::new(engine, data.options());
        let report = evaluator.run().unwrap();
        // img_1 首个命中；img_2 先比较 stop 未中，再命中 go
        assert_eq!(report.score.total, 3);
        assert_eq!(report.score.matched, 2);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(evaluator.into_engine().calls, vec!["img_1.JPG", "img_2.jpeg"]);
    }

    #[test]
    fn test_every_first_string_matched_is_hundred() {
        let data = Dataset::new()
            .image("a.png")
            .image("b.png")
            .ground_truth("gt_a.txt", "0,0,1,0,1,1,0,1,alpha\n0,0,1,0,1,1,0,1,zzz\n")
            .ground_truth("gt_b.txt", "0,0,1,0,1,1,0,1,beta\n");
        let engine = MockRecognizer::default()
            .with("a.png", &["Alpha"])
            .with("b.png", &["the", "beta"]);

        let report = Evaluator::new(engine, data.options()).run().unwrap();
        assert_eq!(report.score.total, 2);
        assert_eq!(report.accuracy(), 100.0);
    }

    #[test]
    fn test_no_detections_is_empty_prediction() {
        let data = Dataset::new()
            .image("img_1.jpg")
            .ground_truth("gt_img_1.txt", HELLO_GT);
        let report = Evaluator::new(MockRecognizer::default(), data.options())
            .run()
            .unwrap();
        assert_eq!(report.score.total, 1);
        assert!(matches!(
            &report.outcomes[0],
            ImageOutcome::NoMatch { prediction, .. } if prediction.is_empty()
        ));
    }

    #[test]
    fn test_engine_failure_recorded() {
        let data = Dataset::new()
            .image("img_1.jpg")
            .image("img_2.jpg")
            .ground_truth("gt_img_1.txt", HELLO_GT)
            .ground_truth("gt_img_2.txt", HELLO_GT);
        let engine = MockRecognizer::default()
            .failing("img_1.jpg")
            .with("img_2.jpg", &["hello"]);

        let mut seen = Vec::new();
        let report = Evaluator::new(engine, data.options())
            .run_with(|outcome| seen.push(outcome.image().to_string()))
            .unwrap();
        assert_eq!(seen, vec!["img_1.jpg", "img_2.jpg"]);
        assert_eq!(report.score.errored, 1);
        assert_eq!(report.score.total, 1);
        assert_eq!(report.accuracy(), 100.0);
        assert!(matches!(report.outcomes[0], ImageOutcome::EngineFailed { .. }));
    }

    #[test]
    fn test_engine_failure_aborts() {
        let data = Dataset::new()
            .image("img_1.jpg")
            .image("img_2.jpg")
            .ground_truth("gt_img_1.txt", HELLO_GT)
            .ground_truth("gt_img_2.txt", HELLO_GT);
        let mut engine = MockRecognizer::default().failing("img_1.jpg");
        let mut options = data.options();
        options.on_engine_error = EngineErrorPolicy::Abort;

        let err = Evaluator::new(&mut engine, options).run().unwrap_err();
        assert!(matches!(err, EvalError::Engine { ref image, .. } if image == "img_1.jpg"));
        assert_eq!(engine.calls, vec!["img_1.jpg"]);
    }

    #[test]
    fn test_report_json() {
        let data = Dataset::new()
            .image("img_1.jpg")
            .ground_truth("gt_img_1.txt", HELLO_GT);
        let engine = MockRecognizer::default().with("img_1.jpg", &["hello"]);
        let report = Evaluator::new(engine, data.options()).run().unwrap();

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["score"]["matched"], 1);
        assert_eq!(value["accuracy"], 100.0);
        assert_eq!(value["outcomes"][0]["outcome"], "matched");
        assert_eq!(value["outcomes"][0]["expected"][0], "hello");
    }

    #[test]
    fn test_engine_error_policy_serde() {
        let policy: EngineErrorPolicy = serde_yaml::from_str("abort").unwrap();
        assert_eq!(policy, EngineErrorPolicy::Abort);
        assert_eq!(serde_yaml::to_string(&EngineErrorPolicy::Record).unwrap().trim(), "record");
    }
}
