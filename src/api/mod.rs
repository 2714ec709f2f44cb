mod files;
mod monitoring;

use crate::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

pub fn routes(app_state: AppState) -> Router {
    let body_limit = app_state.config.upload.max_body_bytes();
    let timeout = Duration::from_secs(app_state.config.server.request_timeout_secs.max(1));
    info!(
        "[global] 路由初始化 - 上传上限 {} 字节, 请求超时 {}s",
        body_limit,
        timeout.as_secs()
    );

    // 前端页面由其他源提供，CORS 全放开
    Router::new()
        .route("/api/extract", post(files::extract))
        .route("/api/extract/", post(files::extract))
        .route("/api/health", get(monitoring::basic_health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
