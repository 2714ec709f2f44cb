//! 健康检查

use crate::build_info;
use crate::model::HealthStatus;
use crate::util::WebResult;
use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;

/// 基本健康检查：版本信息与引擎池状态
pub async fn basic_health_check(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.pool.stats();
    // 池可用即健康；引擎按需启动，空闲数为 0 并不代表故障
    let status = if pool.capacity > 0 { "healthy" } else { "degraded" };
    let health = HealthStatus {
        status: status.to_string(),
        version: build_info::version_info(),
        uptime: state.uptime_secs(),
        timestamp: Utc::now().to_rfc3339(),
        pool,
    };

    let mut resp = WebResult::ok(health).into_json().into_response();
    resp.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        axum::http::HeaderValue::from_static("no-store"),
    );
    resp
}
