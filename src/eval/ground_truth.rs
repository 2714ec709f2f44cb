//! ICDAR 风格标注文件解析
//!
//! 每行 `x1,y1,x2,y2,x3,y3,x4,y4,transcription`，最后一个逗号字段为文本；
//! `###` 表示刻意忽略的区域。

use super::EvalError;
use serde::Serialize;
use std::io;
use std::path::Path;
use tracing::debug;

/// 忽略区域标记
pub const IGNORE_SENTINEL: &str = "###";
/// 合法标注行的最少字段数（8个坐标 + 文本）
pub const MIN_FIELDS: usize = 9;

/// 一张图片的有效标注文本（已归一化，按文件顺序）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroundTruth {
    pub texts: Vec<String>,
    /// 字段不足被丢弃的行数
    pub malformed_lines: usize,
    /// `###` 或空文本行数
    pub ignored_regions: usize,
}

#[derive(Debug, PartialEq)]
enum Line {
    Blank,
    Malformed,
    Ignored,
    Transcription(String),
}

impl GroundTruth {
    pub fn parse(content: &str) -> Self {
        let mut gt = GroundTruth::default();
        let content = content.trim_start_matches('\u{feff}');
        for (index, line) in content.lines().enumerate() {
            match parse_line(line) {
                Line::Blank => {}
                Line::Malformed => {
                    debug!(line = index + 1, "标注行字段不足{}个，已丢弃: {:?}", MIN_FIELDS, line);
                    gt.malformed_lines += 1;
                }
                Line::Ignored => gt.ignored_regions += 1,
                Line::Transcription(text) => gt.texts.push(text),
            }
        }
        gt
    }

    /// 读取标注文件；文件不存在时返回 `None`
    pub fn load(path: &Path) -> Result<Option<Self>, EvalError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(Self::parse(&String::from_utf8_lossy(&bytes)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(EvalError::ReadGroundTruth {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

fn parse_line(line: &str) -> Line {
    let line = line.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < MIN_FIELDS {
        return Line::Malformed;
    }
    let Some(last) = fields.last() else {
        return Line::Malformed;
    };
    let text = normalize(last);
    if text.is_empty() || text == IGNORE_SENTINEL {
        Line::Ignored
    } else {
        Line::Transcription(text)
    }
}

fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_lowercase()
}
