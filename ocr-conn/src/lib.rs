//! PaddleOCR-json 引擎连接层
//!
//! - `ocr`: 引擎进程驱动、协议解析、输入校验、`TextRecognizer` 抽象
//! - `pool`: 供并发调用方使用的引擎池

pub mod ocr;
pub mod pool;

pub use ocr::{
    ContentData, Extractor, ImageData, ImageLimits, OcrEngineOptions, OcrError, Rectangle,
    TextRecognizer,
};
pub use pool::{ExtractorHandle, ExtractorPool, PoolStats};

use std::env::current_dir;
use std::path::PathBuf;
use std::sync::LazyLock;

/// 进程启动时的工作目录，相对路径统一基于此目录解析
pub static CURRENT_DIR: LazyLock<PathBuf> =
    LazyLock::new(|| current_dir().unwrap_or_else(|_| PathBuf::from(".")));
