use crate::util::ServerError;
use crate::AppState;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use ocr_conn::TextRecognizer;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// 上传识别的返回体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub text: Vec<String>,
}

struct Upload {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

/// 读取上传图片 -> 写入临时文件 -> 引擎识别，按引擎顺序返回文本块
pub async fn extract_text(
    state: &AppState,
    multipart: Multipart,
) -> Result<ExtractResponse, ServerError> {
    let field_name = state.config.upload.field_name.as_str();
    let upload = read_upload(multipart, field_name).await?;

    let max_bytes = (state.config.upload.max_file_mb * 1024 * 1024) as usize;
    if upload.bytes.len() > max_bytes {
        return Err(ServerError::PayloadTooLarge(format!(
            "图片超过大小限制 {}MB",
            state.config.upload.max_file_mb
        )));
    }
    // 先校验再占用引擎，坏图不进入引擎
    ocr_conn::ocr::validate_image_bytes(&upload.bytes, &state.config.ocr_engine.limits())?;

    let wait = Duration::from_secs(state.config.server.request_timeout_secs.max(1));
    let mut handle = tokio::time::timeout(wait, state.pool.acquire())
        .await
        .map_err(|_| ServerError::Unavailable("等待OCR引擎超时，请稍后重试".to_string()))??;

    let suffix = upload_suffix(upload.file_name.as_deref());
    let size = upload.bytes.len();
    let started = Instant::now();
    let text = tokio::task::spawn_blocking(move || -> Result<Vec<String>, ServerError> {
        let mut file = tempfile::Builder::new()
            .prefix("ocr-upload-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(&upload.bytes)?;
        file.flush()?;
        let detections = handle.recognize(file.path())?;
        Ok(detections.into_iter().map(|d| d.text).collect())
    })
    .await
    .map_err(|e| ServerError::Internal(format!("OCR任务异常退出: {e}")))??;

    info!(
        target: "api.extract",
        size,
        fragments = text.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "[ocr] 上传图片识别完成"
    );
    Ok(ExtractResponse { text })
}

async fn read_upload(mut multipart: Multipart, field_name: &str) -> Result<Upload, ServerError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(field_name) {
            debug!("忽略表单字段: {:?}", field.name());
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() {
            return Err(ServerError::BadRequest(format!("字段 `{field_name}` 为空文件")));
        }
        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Err(ServerError::BadRequest(format!(
        "缺少图片字段 `{field_name}`"
    )))
}

fn multipart_error(err: MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(err.body_text())
    } else {
        ServerError::BadRequest(err.body_text())
    }
}

/// 临时文件沿用上传文件的扩展名，缺省为 .png
fn upload_suffix(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_else(|| ".png".to_string())
}
