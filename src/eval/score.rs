use super::ground_truth::GroundTruth;
use serde::Serialize;

/// 一张图片的识别结果：所有文本块按引擎顺序拼接并转小写
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Prediction {
    /// 以空格连接的文本，用于展示与匹配
    pub text: String,
    /// 无分隔符连接的文本，跨文本块切分的词也能匹配
    #[serde(skip)]
    compact: String,
}

impl Prediction {
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parts: Vec<String> = fragments
            .into_iter()
            .map(|s| s.as_ref().to_lowercase())
            .collect();
        Self {
            text: parts.join(" "),
            compact: parts.concat(),
        }
    }

    /// 子串匹配（非编辑距离），宽松的准确率口径
    pub fn contains(&self, expected: &str) -> bool {
        self.text.contains(expected) || self.compact.contains(expected)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// 一次评测的计数器
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBoard {
    /// 参与比较的标注文本数
    pub total: usize,
    /// 命中的图片数（每张图片最多计一次）
    pub matched: usize,
    /// OCR 调用失败且被记录的图片数
    pub errored: usize,
    /// 缺少标注或标注为空而跳过的图片数
    pub skipped: usize,
}

impl ScoreBoard {
    /// 依次比较标注文本，首个命中即停止；返回命中的文本
    pub fn score<'a>(&mut self, prediction: &Prediction, ground_truth: &'a GroundTruth) -> Option<&'a str> {
        for expected in &ground_truth.texts {
            self.total += 1;
            if prediction.contains(expected) {
                self.matched += 1;
                return Some(expected);
            }
        }
        None
    }

    /// 准确率百分比；没有任何标注参与时为 0
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64 * 100.0
        }
    }
}
