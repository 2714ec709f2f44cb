use super::EvalError;
use std::path::{Path, PathBuf};

/// 数据集中的一张图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub file_name: String,
    pub path: PathBuf,
}

impl ImageRecord {
    /// 去掉最后一个扩展名后的文件名，`img_1.jpg` -> `img_1`
    pub fn base_name(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((base, _)) if !base.is_empty() => base,
            _ => &self.file_name,
        }
    }

    /// 对应标注文件名，`img_1.jpg` -> `gt_img_1.txt`
    pub fn ground_truth_file_name(&self, prefix: &str) -> String {
        format!("{}{}.txt", prefix, self.base_name())
    }
}

/// 扩展名大小写不敏感比较；`extensions` 不带点
pub fn has_extension(file_name: &str, extensions: &[String]) -> bool {
    let lower = file_name.to_lowercase();
    extensions.iter().any(|ext| {
        let ext = ext.trim_start_matches('.').to_lowercase();
        lower.len() > ext.len() + 1 && lower.ends_with(&format!(".{ext}"))
    })
}

/// 列出目录下符合扩展名的图片，按文件名排序；子目录忽略
pub fn list_images(dir: &Path, extensions: &[String]) -> Result<Vec<ImageRecord>, EvalError> {
    let read_dir_err = |source| EvalError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false)
            || entry.path().is_file();
        if !is_file {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::debug!("跳过非UTF-8文件名: {:?}", entry.file_name());
            continue;
        };
        if has_extension(&file_name, extensions) {
            records.push(ImageRecord {
                path: entry.path(),
                file_name,
            });
        }
    }
    records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(records)
}
