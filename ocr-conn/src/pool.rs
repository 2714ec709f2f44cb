use crate::ocr::{engine_counters, ContentData, Extractor, OcrEngineOptions, OcrError, TextRecognizer};
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

const SLOW_CALL_WARN_THRESHOLD_MS: u128 = 8_000;
const MAX_POOL_CAPACITY: usize = 128;

struct PoolInner {
    idle: Mutex<Vec<Extractor>>,
    opts: OcrEngineOptions,
    max: usize,
    failures: AtomicU64,
}

/// 可复用的 OCR 引擎池：并发上限由信号量控制，引擎按需创建
pub struct ExtractorPool {
    inner: Arc<PoolInner>,
    semaphore: Arc<Semaphore>,
}

/// 从池中借出的引擎，drop 时归还
pub struct ExtractorHandle {
    pool: Arc<PoolInner>,
    engine: Option<Extractor>,
    _permit: OwnedSemaphorePermit,
}

impl TextRecognizer for ExtractorHandle {
    fn recognize(&mut self, path: &Path) -> Result<Vec<ContentData>, OcrError> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(OcrError::PoolClosed);
        };
        let start = Instant::now();
        let result = engine.recognize(path);
        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_CALL_WARN_THRESHOLD_MS {
            warn!(duration_ms = elapsed.as_millis() as u64, "单次OCR调用耗时超出阈值");
        }
        if let Err(err) = &result {
            // 数据类错误不算引擎故障
            if !err.is_data_error() {
                self.pool.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }
}

impl Drop for ExtractorHandle {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.idle.lock().push(engine);
        }
        // _permit drop 将自动释放并发许可
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    pub in_use: usize,
    pub idle_engines: usize,
    pub total_started: u64,
    pub total_restarted: u64,
    pub total_failures: u64,
}

impl ExtractorPool {
    pub fn new(capacity: usize, opts: OcrEngineOptions) -> Self {
        let max = capacity.clamp(1, MAX_POOL_CAPACITY);
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(max)),
                opts,
                max,
                failures: AtomicU64::new(0),
            }),
            semaphore: Arc::new(Semaphore::new(max)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.max
    }

    /// 预先启动若干引擎，避免首个请求承担模型加载耗时
    pub fn prewarm(&self, count: usize) -> Result<usize, OcrError> {
        let target = count.min(self.inner.max);
        let mut started = 0;
        while self.inner.idle.lock().len() < target {
            let engine = Extractor::new_with_options(self.inner.opts.clone())?;
            self.inner.idle.lock().push(engine);
            started += 1;
        }
        info!(started, target, "OCR引擎预热完成");
        Ok(started)
    }

    /// 获取一个可用的引擎句柄（异步等待并发许可）
    pub async fn acquire(&self) -> Result<ExtractorHandle, OcrError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OcrError::PoolClosed)?;

        // 取一个空闲引擎，没有则新建（许可数保证不会超过上限）。
        // 拉起进程会阻塞数百毫秒，放到阻塞线程池执行
        let idle = self.inner.idle.lock().pop();
        let opts = self.inner.opts.clone();
        let engine = tokio::task::spawn_blocking(move || match idle {
            Some(mut engine) => {
                engine.ensure_running();
                Ok(engine)
            }
            None => Extractor::new_with_options(opts),
        })
        .await
        .map_err(|e| {
            OcrError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("OCR引擎启动任务异常: {e}"),
            ))
        })??;

        Ok(ExtractorHandle {
            pool: self.inner.clone(),
            engine: Some(engine),
            _permit: permit,
        })
    }

    /// 关闭池：等待中的请求立即失败
    pub fn close(&self) {
        self.semaphore.close();
        self.inner.idle.lock().clear();
    }

    pub fn stats(&self) -> PoolStats {
        let capacity = self.inner.max;
        let available = self.semaphore.available_permits();
        let (total_started, total_restarted) = engine_counters();
        PoolStats {
            capacity,
            available,
            in_use: capacity.saturating_sub(available),
            idle_engines: self.inner.idle.lock().len(),
            total_started,
            total_restarted,
            total_failures: self.inner.failures.load(Ordering::Relaxed),
        }
    }
}
