use crate::CURRENT_DIR;
use crossbeam::channel::{bounded, Receiver, Sender};
use image::{ImageFormat, ImageReader};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

type Point = [i64; 2];

const ENGINE_FORCE_RESTART_FAILURES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const STDERR_RECENT_LINES: usize = 200;
const STDERR_SUMMARY_LINES: usize = 20;
const DEFAULT_MAX_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_MAX_PIXELS: u64 = 25_000_000; // ~25MP, 5000x5000
const DEFAULT_MIN_DIMENSION: u32 = 16; // 过小图片直接判为无效

static ENGINE_STARTED: AtomicU64 = AtomicU64::new(0);
static ENGINE_RESTARTED: AtomicU64 = AtomicU64::new(0);

/// PaddleOCR-json 官方错误码
pub mod error_code {
    // 成功类 (正常返回)
    pub const OK_WITH_TEXT: u32 = 100; // 识别到文字
    pub const OK_NO_TEXT: u32 = 101; // 未识别到文字（正常）

    /// 判断是否为"成功"结果（包括空文本）
    #[inline]
    pub fn is_success(code: u32) -> bool {
        matches!(code, OK_WITH_TEXT | OK_NO_TEXT)
    }

    /// 判断是否为数据问题（不需要重启引擎）
    #[inline]
    pub fn is_data_error(code: u32) -> bool {
        matches!(code, 200..=217 | 300..=301)
    }

    /// 获取错误码的人类可读描述
    pub fn description(code: u32) -> &'static str {
        match code {
            100 => "识别成功",
            101 => "未识别到文字",
            200 => "图片路径不存在",
            201 => "路径编码转换失败",
            202 => "无法打开文件",
            203 => "图片无法解码",
            210..=217 => "剪贴板读取失败",
            300 => "Base64解析失败",
            301 => "Base64图片解码失败",
            400 => "JSON序列化失败",
            401 => "JSON反序列化失败",
            402 => "JSON键解析失败",
            403 => "未发现有效任务",
            _ => "未知错误",
        }
    }
}

#[derive(Debug, Error)]
pub enum OcrError {
    /// 输入数据问题，重试或重启引擎都无济于事
    #[error("数据错误 [{code}]: {message}")]
    Data { code: String, message: String },
    #[error("引擎错误 (code={code}): {message}")]
    Engine { code: u32, message: String },
    #[error("OCR引擎无响应 (超时或已崩溃)")]
    NoResponse,
    #[error("OCR响应解析失败: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("无法启动OCR引擎 {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("OCR引擎通信失败: {0}")]
    Io(#[from] io::Error),
    #[error("OCR失败（已重启重试）。第一次错误: {first}; 第二次错误: {second}")]
    RetryExhausted {
        first: Box<OcrError>,
        second: Box<OcrError>,
    },
    #[error("OCR引擎池已关闭")]
    PoolClosed,
}

impl OcrError {
    fn data(code: impl ToString, message: impl Into<String>) -> Self {
        OcrError::Data {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// 数据类错误不计入引擎故障
    pub fn is_data_error(&self) -> bool {
        matches!(self, OcrError::Data { .. })
    }
}

#[derive(Deserialize, Debug, Clone)]
struct Content {
    code: u32,
    #[serde(default)]
    data: serde_json::Value, // 可以是数组或字符串
}

/// 一个文本检测结果：四点框、识别文本与置信度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentData {
    #[serde(rename = "box")]
    pub rect: Rectangle,
    pub score: f64,
    pub text: String,
}

pub type Rectangle = [Point; 4];

/// 发送给引擎的一行请求：`{"image_path": "..."}`
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ImageData {
    pub image_path: String,
}

impl ImageData {
    /// 相对路径按进程当前目录补全，引擎自身的工作目录与调用方不同
    pub fn from_path<P>(path: P) -> ImageData
    where
        P: AsRef<Path>,
    {
        ImageData {
            image_path: absolutize(path.as_ref()).to_string_lossy().to_string(),
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        CURRENT_DIR.join(path)
    }
}

/// 文字识别能力的抽象，评测与批量识别只依赖该接口
pub trait TextRecognizer {
    /// 识别一张图片，按引擎返回顺序给出所有文本块；未识别到文字时返回空列表
    fn recognize(&mut self, path: &Path) -> Result<Vec<ContentData>, OcrError>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for &mut T {
    fn recognize(&mut self, path: &Path) -> Result<Vec<ContentData>, OcrError> {
        (**self).recognize(path)
    }
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn recognize(&mut self, path: &Path) -> Result<Vec<ContentData>, OcrError> {
        (**self).recognize(path)
    }
}

/// 输入图片的校验阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageLimits {
    pub max_input_bytes: usize,
    pub max_pixels: u64,
    pub min_dimension: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_pixels: DEFAULT_MAX_PIXELS,
            min_dimension: DEFAULT_MIN_DIMENSION,
        }
    }
}

/// 引擎启动选项（由上层传入）
#[derive(Debug, Clone)]
pub struct OcrEngineOptions {
    pub work_dir: Option<PathBuf>,
    pub binary: Option<PathBuf>,
    pub lib_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    /// 启用方向分类器（竖排/倒置文字）
    pub use_angle_cls: bool,
    /// 透传给 PaddleOCR-json 的额外启动参数，如 `-config_path=...`
    pub extra_args: Vec<String>,
    pub limits: ImageLimits,
}

impl Default for OcrEngineOptions {
    fn default() -> Self {
        Self {
            work_dir: None,
            binary: None,
            lib_path: None,
            timeout_secs: None,
            use_angle_cls: true,
            extra_args: Vec::new(),
            limits: ImageLimits::default(),
        }
    }
}

impl OcrEngineOptions {
    /// 解析 (工作目录, 二进制, 依赖库目录)，均为绝对路径。
    /// 子进程以工作目录为 cwd 启动，相对路径必须在此之前补全
    pub fn resolve_paths(&self) -> (PathBuf, PathBuf, PathBuf) {
        let work_dir = self
            .work_dir
            .as_deref()
            .map(absolutize)
            .unwrap_or_else(|| CURRENT_DIR.join("ocr"));
        let bin = self
            .binary
            .as_deref()
            .map(absolutize)
            .unwrap_or_else(|| work_dir.join("PaddleOCR-json"));
        let lib = self
            .lib_path
            .as_deref()
            .map(absolutize)
            .unwrap_or_else(|| work_dir.join("lib"));
        (work_dir, bin, lib)
    }

    fn startup_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("-use_angle_cls={}", self.use_angle_cls),
            format!("-cls={}", self.use_angle_cls),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// 单个 PaddleOCR-json 进程：一行 JSON 请求，一行 JSON 响应
pub struct Extractor {
    process: Child,
    receiver: Receiver<String>,
    stderr_recent: Arc<Mutex<VecDeque<String>>>,
    engine_opts: OcrEngineOptions,
    consecutive_failures: u32,
}

impl Extractor {
    /// 使用启动选项创建实例
    pub fn new_with_options(opts: OcrEngineOptions) -> Result<Self, OcrError> {
        let (process, receiver, stderr_recent) = Self::spawn_process(&opts)?;
        Ok(Self {
            process,
            receiver,
            stderr_recent,
            engine_opts: opts,
            consecutive_failures: 0,
        })
    }

    fn spawn_process(
        opts: &OcrEngineOptions,
    ) -> Result<(Child, Receiver<String>, Arc<Mutex<VecDeque<String>>>), OcrError> {
        let (work_dir, bin, lib) = opts.resolve_paths();
        info!(
            binary = %bin.display(),
            work_dir = %work_dir.display(),
            use_angle_cls = opts.use_angle_cls,
            "启动OCR引擎进程"
        );

        let mut process = Command::new(&bin)
            .args(opts.startup_args())
            .env("LD_LIBRARY_PATH", lib)
            .current_dir(&work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| OcrError::Spawn {
                binary: bin.display().to_string(),
                source,
            })?;

        let stdout = process.stdout.take().ok_or_else(|| {
            error!("❌ 无法获取OCR进程的stdout");
            io::Error::new(io::ErrorKind::Other, "OCR进程stdout不可用")
        })?;
        let stderr = process.stderr.take().ok_or_else(|| {
            error!("❌ 无法获取OCR进程的stderr");
            io::Error::new(io::ErrorKind::Other, "OCR进程stderr不可用")
        })?;

        let (sender, receiver) = bounded::<String>(0);
        spawn_stdout_reader(stdout, sender)?;

        // 只保留最近的 stderr 行，用于故障时打印摘要
        let stderr_recent: Arc<Mutex<VecDeque<String>>> =
            Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_RECENT_LINES)));
        spawn_stderr_reader(stderr, stderr_recent.clone())?;

        // Drain any startup banner noise quickly
        while receiver.recv_timeout(Duration::from_millis(200)).is_ok() {}
        ENGINE_STARTED.fetch_add(1, Ordering::Relaxed);
        Ok((process, receiver, stderr_recent))
    }

    fn read_response(&mut self) -> Result<String, OcrError> {
        let timeout = self.engine_opts.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let deadline = Instant::now() + Duration::from_secs(timeout);
        loop {
            let remain = deadline.saturating_duration_since(Instant::now());
            if remain.is_zero() {
                return Err(OcrError::NoResponse);
            }
            match self.receiver.recv_timeout(remain) {
                // 跳过版本横幅、日志等非 JSON 行
                Ok(line) if line.trim_start().starts_with('{') => return Ok(line),
                Ok(_) => continue,
                Err(_) => return Err(OcrError::NoResponse),
            }
        }
    }

    fn send_request(&mut self, image: &ImageData) -> Result<String, OcrError> {
        let start = Instant::now();
        debug!("📄 OCR处理: 文件路径 = {}", image.image_path);

        let request = serde_json::to_string(image)?;
        let stdin = self
            .process
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdin not piped"))?;
        writeln!(stdin, "{}", request.trim())?;
        stdin.flush()?;

        let response = self.read_response();
        match &response {
            Ok(raw) => debug!(
                "✅ OCR调用完成，耗时: {:?}, 响应长度: {} bytes",
                start.elapsed(),
                raw.len()
            ),
            Err(_) => warn!("⚠️ OCR引擎无响应，耗时: {:?}", start.elapsed()),
        }
        response
    }

    fn attempt(&mut self, image: &ImageData, attempt_num: u8) -> Result<Vec<ContentData>, OcrError> {
        debug!("🔄 OCR尝试 #{}", attempt_num);
        let raw = self.send_request(image)?;
        let parsed = parse_response(&raw);
        if let Err(e) = &parsed {
            warn!("❌ OCR尝试 #{} 失败: {}", attempt_num, e);
            if matches!(e, OcrError::Decode(_)) {
                debug!("原始响应 (前500字符): {}", raw.chars().take(500).collect::<String>());
            }
        }
        parsed
    }

    /// 识别一张图片；引擎类错误会重启进程并重试一次
    pub fn ocr_and_parse(&mut self, image: ImageData) -> Result<Vec<ContentData>, OcrError> {
        let call_start = Instant::now();

        if let Err(e) = validate_image_data(&image, &self.engine_opts.limits) {
            warn!("❌ 输入校验失败，直接返回数据错误: {}", e);
            return Err(e);
        }

        let first_err = match self.attempt(&image, 1) {
            Ok(contents) => {
                self.mark_success();
                info!(
                    "✅ OCR识别成功: {} 个文本块，耗时: {:?}",
                    contents.len(),
                    call_start.elapsed()
                );
                return Ok(contents);
            }
            // 数据问题（2xx/3xx）不触发重启，直接返回错误
            Err(e) if e.is_data_error() => return Err(e),
            Err(e) => e,
        };

        warn!("⚠️ 第一次OCR尝试失败（引擎问题），准备重启引擎并重试...");
        self.log_stderr_summary();
        self.restart()?;

        match self.attempt(&image, 2) {
            Ok(contents) => {
                self.mark_success();
                info!("✅ OCR处理在重启后成功，总耗时: {:?}", call_start.elapsed());
                Ok(contents)
            }
            Err(second_err) => {
                error!("💥 OCR处理最终失败，总耗时: {:?}", call_start.elapsed());
                self.log_stderr_summary();
                if !second_err.is_data_error() {
                    self.mark_failure();
                }
                Err(OcrError::RetryExhausted {
                    first: Box::new(first_err),
                    second: Box::new(second_err),
                })
            }
        }
    }

    fn log_stderr_summary(&self) {
        let snapshot: Vec<String> = self.stderr_recent.lock().iter().cloned().collect();
        if snapshot.is_empty() {
            return;
        }
        warn!("📋 [PaddleOCR-json stderr 最近{}行]", snapshot.len());
        let skip = snapshot.len().saturating_sub(STDERR_SUMMARY_LINES);
        for line in snapshot.iter().skip(skip) {
            warn!("stderr> {}", line);
        }
    }

    fn restart(&mut self) -> Result<(), OcrError> {
        let _ = self.process.kill();
        let _ = self.process.wait();
        match Self::spawn_process(&self.engine_opts) {
            Ok((process, receiver, stderr_recent)) => {
                self.process = process;
                self.receiver = receiver;
                self.stderr_recent = stderr_recent;
                self.consecutive_failures = 0;
                ENGINE_RESTARTED.fetch_add(1, Ordering::Relaxed);
                info!("OCR引擎重启成功");
                Ok(())
            }
            Err(e) => {
                error!("OCR引擎重启失败: {}", e);
                Err(e)
            }
        }
    }

    /// 进程意外退出时重新拉起
    pub fn ensure_running(&mut self) {
        let exited = match self.process.try_wait() {
            Ok(Some(status)) => {
                warn!(?status, "检测到OCR引擎已退出，准备重启");
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!("检查OCR引擎状态失败，将重新拉起: {}", err);
                true
            }
        };
        if exited {
            let _ = self.restart();
        }
    }

    fn mark_success(&mut self) {
        self.consecutive_failures = 0;
    }

    fn mark_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= ENGINE_FORCE_RESTART_FAILURES {
            warn!("OCR引擎连续失败{}次，执行强制重启", self.consecutive_failures);
            let _ = self.restart();
        }
    }
}

impl TextRecognizer for Extractor {
    fn recognize(&mut self, path: &Path) -> Result<Vec<ContentData>, OcrError> {
        self.ensure_running();
        self.ocr_and_parse(ImageData::from_path(path))
    }
}

impl Drop for Extractor {
    fn drop(&mut self) {
        self.process.kill().ok();
        self.process.wait().ok();
    }
}

fn spawn_stdout_reader(stdout: ChildStdout, sender: Sender<String>) -> io::Result<()> {
    thread::Builder::new()
        .name("ocr-stdout".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if sender.send(line.clone()).is_err() {
                            break;
                        }
                    }
                }
            }
        })?;
    Ok(())
}

fn spawn_stderr_reader(stderr: ChildStderr, recent: Arc<Mutex<VecDeque<String>>>) -> io::Result<()> {
    thread::Builder::new()
        .name("ocr-stderr".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let mut buf = recent.lock();
                        if buf.len() >= STDERR_RECENT_LINES {
                            buf.pop_front();
                        }
                        buf.push_back(line.trim_end().to_string());
                    }
                }
            }
        })?;
    Ok(())
}

/// 解析一行 PaddleOCR-json 响应
pub fn parse_response(raw: &str) -> Result<Vec<ContentData>, OcrError> {
    use error_code::*;

    let content: Content = serde_json::from_str(raw.trim())?;
    if is_success(content.code) {
        if content.code == OK_NO_TEXT {
            debug!("ℹ️ OCR未识别到文字");
            return Ok(Vec::new());
        }
        return match serde_json::from_value::<Vec<ContentData>>(content.data) {
            Ok(data) => Ok(data),
            Err(e) => {
                debug!("ℹ️ OCR完成但data无法解析为文本块: {}", e);
                Ok(Vec::new())
            }
        };
    }

    let desc = description(content.code);
    let detail = content.data.as_str().unwrap_or("Unknown");
    if is_data_error(content.code) {
        warn!("❌ 数据错误 (code={}): {} - {}", content.code, desc, detail);
        Err(OcrError::data(content.code, format!("{} - {}", desc, detail)))
    } else {
        warn!("❌ 引擎错误 (code={}): {} - {}", content.code, desc, detail);
        Err(OcrError::Engine {
            code: content.code,
            message: format!("{} - {}", desc, detail),
        })
    }
}

/// 输入校验：限制大小、像素、格式，提前将数据问题拦截为数据错误
fn validate_image_data(image: &ImageData, limits: &ImageLimits) -> Result<(), OcrError> {
    let bytes = std::fs::read(&image.image_path).map_err(|e| {
        let code = if e.kind() == io::ErrorKind::NotFound {
            "PATH_NOT_EXIST"
        } else {
            "READ_FAILED"
        };
        OcrError::data(code, format!("无法读取文件: {} ({})", image.image_path, e))
    })?;
    validate_image_bytes(&bytes, limits)
}

/// 校验图片字节：大小、格式（jpeg/png/bmp/tiff）、尺寸（读取文件头，不做完整解码）
pub fn validate_image_bytes(bytes: &[u8], limits: &ImageLimits) -> Result<(), OcrError> {
    if bytes.len() > limits.max_input_bytes {
        return Err(OcrError::data(
            "IMAGE_TOO_LARGE",
            format!(
                "输入文件过大: {} bytes (上限 {} bytes)",
                bytes.len(),
                limits.max_input_bytes
            ),
        ));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| OcrError::data("UNSUPPORTED_FORMAT", format!("无法识别格式: {}", e)))?;
    let allowed = matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tiff
    );
    if !allowed {
        return Err(OcrError::data(
            "UNSUPPORTED_FORMAT",
            format!("不支持的图片格式: {:?}", format),
        ));
    }

    // 只解析文件头取尺寸，像素交给引擎解码
    let (w, h) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| OcrError::data("IMAGE_DECODE", format!("图片头解析失败: {}", e)))?;
    if w < limits.min_dimension || h < limits.min_dimension {
        return Err(OcrError::data(
            "IMAGE_TOO_SMALL",
            format!(
                "图片尺寸过小: {}x{} (最小 {}x{})",
                w, h, limits.min_dimension, limits.min_dimension
            ),
        ));
    }
    let pixels = w as u64 * h as u64;
    if pixels > limits.max_pixels {
        return Err(OcrError::data(
            "IMAGE_TOO_LARGE",
            format!("像素总数过大: {} (上限 {})", pixels, limits.max_pixels),
        ));
    }
    Ok(())
}

/// 进程级引擎计数：(启动次数, 重启次数)
pub fn engine_counters() -> (u64, u64) {
    (
        ENGINE_STARTED.load(Ordering::Relaxed),
        ENGINE_RESTARTED.load(Ordering::Relaxed),
    )
}


#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_with_text() {
        let raw = r#"{"code":100,"data":[
            {"box":[[10,10],[50,10],[50,30],[10,30]],"score":0.98,"text":"Hello"},
            {"box":[[60,10],[90,10],[90,30],[60,30]],"score":0.91,"text":"world"}
        ]}"#;
        let contents = parse_response(raw).unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].text, "Hello");
        assert_eq!(contents[0].rect[2], [50, 30]);
        assert_eq!(contents[1].text, "world");
    }

    #[test]
    fn test_parse_response_without_text() {
        let raw = r#"{"code":101,"data":""}"#;
        assert!(parse_response(raw).unwrap().is_empty());
    }

    #[test]
    fn test_parse_response_data_error() {
        let raw = r#"{"code":203,"data":"cannot decode"}"#;
        let err = parse_response(raw).unwrap_err();
        assert!(err.is_data_error());
        assert!(err.to_string().contains("203"));
    }

    #[test]
    fn test_parse_response_engine_error() {
        let raw = r#"{"code":403,"data":"no task"}"#;
        let err = parse_response(raw).unwrap_err();
        assert!(!err.is_data_error());
        assert!(matches!(err, OcrError::Engine { code: 403, .. }));
    }

    #[test]
    fn test_parse_response_garbage() {
        assert!(matches!(
            parse_response("{not json"),
            Err(OcrError::Decode(_))
        ));
    }

    #[test]
    fn test_error_code_classification() {
        assert!(error_code::is_success(100));
        assert!(error_code::is_success(101));
        assert!(error_code::is_data_error(203));
        assert!(error_code::is_data_error(301));
        assert!(!error_code::is_data_error(402));
    }

    #[test]
    fn test_validate_image_bytes() {
        let limits = ImageLimits::default();
        assert!(validate_image_bytes(&png_bytes(32, 32), &limits).is_ok());

        let err = validate_image_bytes(&png_bytes(4, 4), &limits).unwrap_err();
        assert!(matches!(err, OcrError::Data { ref code, .. } if code == "IMAGE_TOO_SMALL"));

        let err = validate_image_bytes(b"definitely not an image", &limits).unwrap_err();
        assert!(matches!(err, OcrError::Data { ref code, .. } if code == "UNSUPPORTED_FORMAT"));

        let tight = ImageLimits {
            max_input_bytes: 8,
            ..ImageLimits::default()
        };
        let err = validate_image_bytes(&png_bytes(32, 32), &tight).unwrap_err();
        assert!(matches!(err, OcrError::Data { ref code, .. } if code == "IMAGE_TOO_LARGE"));
    }

    #[test]
    fn test_validate_missing_path() {
        let image = ImageData::from_path("/nonexistent/dir/img_1.jpg");
        let err = validate_image_data(&image, &ImageLimits::default()).unwrap_err();
        assert!(matches!(err, OcrError::Data { ref code, .. } if code == "PATH_NOT_EXIST"));
    }

    #[test]
    fn test_image_data_serialization() {
        let image = ImageData::from_path("/data/img_1.jpg");
        assert_eq!(
            serde_json::to_string(&image).unwrap(),
            r#"{"image_path":"/data/img_1.jpg"}"#
        );

        let relative = ImageData::from_path("img_1.jpg");
        assert_eq!(
            PathBuf::from(&relative.image_path),
            CURRENT_DIR.join("img_1.jpg")
        );
    }

    #[test]
    fn test_validate_reads_header_only() {
        // 头部完整、像素数据被截断的 PNG 仍可取得尺寸
        let mut bytes = png_bytes(64, 48);
        bytes.truncate(64);
        assert!(validate_image_bytes(&bytes, &ImageLimits::default()).is_ok());

        let limits = ImageLimits {
            max_pixels: 64 * 48 - 1,
            ..ImageLimits::default()
        };
        let err = validate_image_bytes(&bytes, &limits).unwrap_err();
        assert!(matches!(err, OcrError::Data { ref code, .. } if code == "IMAGE_TOO_LARGE"));

        // 只有魔数、没有 IHDR
        let err = validate_image_bytes(&bytes[..8], &ImageLimits::default()).unwrap_err();
        assert!(matches!(err, OcrError::Data { ref code, .. } if code == "IMAGE_DECODE"));
    }

    #[test]
    fn test_resolve_paths_absolute() {
        let opts = OcrEngineOptions {
            work_dir: Some(PathBuf::from("engines/paddle")),
            lib_path: Some(PathBuf::from("vendor/lib")),
            ..OcrEngineOptions::default()
        };
        let (work_dir, bin, lib) = opts.resolve_paths();
        assert_eq!(work_dir, CURRENT_DIR.join("engines/paddle"));
        assert_eq!(bin, CURRENT_DIR.join("engines/paddle/PaddleOCR-json"));
        assert_eq!(lib, CURRENT_DIR.join("vendor/lib"));

        let opts = OcrEngineOptions {
            work_dir: Some(PathBuf::from("/opt/paddle")),
            binary: Some(PathBuf::from("bin/PaddleOCR-json")),
            ..OcrEngineOptions::default()
        };
        let (work_dir, bin, lib) = opts.resolve_paths();
        assert_eq!(work_dir, PathBuf::from("/opt/paddle"));
        assert_eq!(bin, CURRENT_DIR.join("bin/PaddleOCR-json"));
        assert_eq!(lib, PathBuf::from("/opt/paddle/lib"));
    }

    #[test]
    fn test_startup_args() {
        let opts = OcrEngineOptions {
            use_angle_cls: false,
            extra_args: vec!["-config_path=models/config_en.txt".to_string()],
            ..OcrEngineOptions::default()
        };
        assert_eq!(
            opts.startup_args(),
            vec![
                "-use_angle_cls=false".to_string(),
                "-cls=false".to_string(),
                "-config_path=models/config_en.txt".to_string(),
            ]
        );
    }

    #[test]
    fn test_spawn_missing_binary() {
        let dir = tempfile::TempDir::new().unwrap();
        let opts = OcrEngineOptions {
            work_dir: Some(dir.path().to_path_buf()),
            ..OcrEngineOptions::default()
        };
        assert!(matches!(
            Extractor::new_with_options(opts),
            Err(OcrError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    mod engine_process {
        use super::*;
        use crate::ocr::fake_engine;
        use tempfile::TempDir;

        fn options(work_dir: &Path) -> OcrEngineOptions {
            OcrEngineOptions {
                work_dir: Some(work_dir.to_path_buf()),
                timeout_secs: Some(1),
                ..OcrEngineOptions::default()
            }
        }

        fn sample_image(dir: &Path) -> PathBuf {
            let path = dir.join("img_1.png");
            std::fs::write(&path, png_bytes(32, 32)).unwrap();
            path
        }

        #[test]
        fn test_recognize_skips_log_lines() {
            let dir = TempDir::new().unwrap();
            fake_engine::install(dir.path(), Some(fake_engine::TEXT_REPLY));
            let image = sample_image(dir.path());

            let mut engine = Extractor::new_with_options(options(dir.path())).unwrap();
            let contents = engine.recognize(&image).unwrap();
            assert_eq!(contents.len(), 1);
            assert_eq!(contents[0].text, "Hello");
            assert_eq!(contents[0].rect[2], [40, 20]);

            let requests = fake_engine::requests(dir.path());
            assert_eq!(requests.len(), 1);
            let request: serde_json::Value = serde_json::from_str(&requests[0]).unwrap();
            assert_eq!(request["image_path"], image.to_str().unwrap());

            // 同一进程处理后续请求
            engine.recognize(&image).unwrap();
            assert_eq!(fake_engine::starts(dir.path()), 1);
        }

        #[test]
        fn test_data_error_does_not_restart() {
            let dir = TempDir::new().unwrap();
            fake_engine::install(dir.path(), Some(fake_engine::DATA_ERROR_REPLY));
            let image = sample_image(dir.path());

            let mut engine = Extractor::new_with_options(options(dir.path())).unwrap();
            for _ in 0..2 {
                let err = engine.recognize(&image).unwrap_err();
                assert!(err.is_data_error());
                assert!(matches!(err, OcrError::Data { ref code, .. } if code == "203"));
            }
            assert_eq!(fake_engine::requests(dir.path()).len(), 2);
            assert_eq!(fake_engine::starts(dir.path()), 1);
        }

        #[test]
        fn test_silent_engine_restarts_once_then_fails() {
            let dir = TempDir::new().unwrap();
            fake_engine::install(dir.path(), None);
            let image = sample_image(dir.path());
            let (_, restarted_before) = engine_counters();

            let mut engine = Extractor::new_with_options(options(dir.path())).unwrap();
            let err = engine.recognize(&image).unwrap_err();
            match err {
                OcrError::RetryExhausted { first, second } => {
                    assert!(matches!(*first, OcrError::NoResponse));
                    assert!(matches!(*second, OcrError::NoResponse));
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(fake_engine::starts(dir.path()), 2);
            assert!(engine_counters().1 > restarted_before);
        }

        #[test]
        fn test_invalid_image_never_reaches_engine() {
            let dir = TempDir::new().unwrap();
            fake_engine::install(dir.path(), Some(fake_engine::TEXT_REPLY));
            let image = dir.path().join("broken.png");
            std::fs::write(&image, b"not a png").unwrap();

            let mut engine = Extractor::new_with_options(options(dir.path())).unwrap();
            let err = engine.recognize(&image).unwrap_err();
            assert!(err.is_data_error());
            assert!(fake_engine::requests(dir.path()).is_empty());
        }

        #[test]
        fn test_relative_work_dir() {
            let dir = tempfile::Builder::new()
                .prefix("relative-engine-")
                .tempdir_in(&*CURRENT_DIR)
                .unwrap();
            fake_engine::install(dir.path(), Some(fake_engine::TEXT_REPLY));
            let image = sample_image(dir.path());
            let relative = dir.path().strip_prefix(&*CURRENT_DIR).unwrap();
            assert!(relative.is_relative());

            let mut engine = Extractor::new_with_options(options(relative)).unwrap();
            assert_eq!(engine.recognize(&image).unwrap()[0].text, "Hello");
        }

        #[test]
        fn test_crashed_engine_is_respawned() {
            let dir = TempDir::new().unwrap();
            fake_engine::install(dir.path(), Some(fake_engine::TEXT_REPLY));
            let image = sample_image(dir.path());

            let mut engine = Extractor::new_with_options(options(dir.path())).unwrap();
            engine.process.kill().unwrap();
            engine.process.wait().unwrap();

            assert_eq!(engine.recognize(&image).unwrap()[0].text, "Hello");
            assert_eq!(fake_engine::starts(dir.path()), 2);
        }
    }
}
