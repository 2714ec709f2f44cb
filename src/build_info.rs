use serde::Serialize;

/// 编译期写入的构建信息（见 build.rs）
pub const BUILD_VERSION: &str = env!("APP_BUILD_VERSION");
pub const BUILD_COMMIT: &str = env!("APP_BUILD_COMMIT");
pub const BUILD_TIMESTAMP: &str = env!("APP_BUILD_TIMESTAMP");

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub package: &'static str,
    pub build: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        package: env!("CARGO_PKG_VERSION"),
        build: BUILD_VERSION,
        commit: BUILD_COMMIT,
        built_at: BUILD_TIMESTAMP,
    }
}

/// 启动日志与 `--version` 使用的单行摘要
pub fn summary() -> String {
    let info = version_info();
    format!(
        "{} (build {}, commit {}, built at {})",
        info.package, info.build, info.commit, info.built_at
    )
}
