//! 批量识别：对目录中的每张图片打印识别文本与置信度

use super::dataset::{self, ImageRecord};
use super::EvalError;
use ocr_conn::{ContentData, OcrError, TextRecognizer};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// 单张图片的识别结果
#[derive(Debug)]
pub struct BatchItem {
    pub image: ImageRecord,
    pub result: Result<Vec<ContentData>, OcrError>,
}

impl BatchItem {
    /// 控制台输出：每个文本块一行，或 `No text detected`
    pub fn render_lines(&self) -> Vec<String> {
        match &self.result {
            Ok(detections) if detections.is_empty() => vec!["No text detected".to_string()],
            Ok(detections) => detections.iter().map(render_detection).collect(),
            Err(err) => vec![format!("❌ OCR failed: {}", err)],
        }
    }
}

pub fn render_detection(detection: &ContentData) -> String {
    format!("{}  (confidence: {:.2})", detection.text, detection.score)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub images: usize,
    pub with_text: usize,
    pub without_text: usize,
    pub failed: usize,
}

/// 按文件名顺序识别目录下的图片；单张失败不会中断整批
pub fn recognize_dir<E, F>(
    engine: &mut E,
    dir: &Path,
    extensions: &[String],
    mut on_item: F,
) -> Result<BatchSummary, EvalError>
where
    E: TextRecognizer + ?Sized,
    F: FnMut(&BatchItem),
{
    let images = dataset::list_images(dir, extensions)?;
    info!(dir = %dir.display(), count = images.len(), "[batch] 开始批量识别");

    let start = Instant::now();
    let mut summary = BatchSummary::default();
    for image in images {
        let result = engine.recognize(&image.path);
        summary.images += 1;
        match &result {
            Ok(detections) if detections.is_empty() => summary.without_text += 1,
            Ok(_) => summary.with_text += 1,
            Err(err) => {
                warn!(image = %image.file_name, error = %err, "[batch] 识别失败");
                summary.failed += 1;
            }
        }
        on_item(&BatchItem { image, result });
    }

    info!(
        images = summary.images,
        failed = summary.failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "[batch] 批量识别完成"
    );
    Ok(summary)
}
