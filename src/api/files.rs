use crate::model::ocr::ExtractResponse;
use crate::util::ServerError;
use crate::AppState;
use axum::extract::{Multipart, State};
use axum::Json;

/// 图片上传识别接口：multipart 字段 `image`，返回 `{"text": [...]}`
pub async fn extract(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, ServerError> {
    let result = crate::model::ocr::extract_text(&state, multipart).await?;
    Ok(Json(result))
}
