use crate::build_info::VersionInfo;
use ocr_conn::PoolStats;
use serde::Serialize;

pub mod ocr;

// 健康检查相关的数据结构
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: VersionInfo,
    pub uptime: u64,
    pub timestamp: String,
    pub pool: PoolStats,
}
