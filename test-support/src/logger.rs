//! 捕获日志的 logger
//!
//! 测试并行运行且共用同一个全局 logger，断言时应按消息中的唯一内容过滤。

use std::sync::Once;

use lazy_static::lazy_static;
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

/// 一条捕获的日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    /// 级别
    pub level: Level,
    /// 格式化后的消息
    pub message: String,
}

lazy_static! {
    static ref RECORDS: Mutex<Vec<Captured>> = Mutex::new(Vec::new());
}

static INIT: Once = Once::new();

struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        RECORDS.lock().push(Captured {
            level: record.level(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// 安装捕获 logger（可重复调用）
pub fn init() {
    INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
}

/// 包含 `needle` 的日志
pub fn matching(needle: &str) -> Vec<Captured> {
    RECORDS
        .lock()
        .iter()
        .filter(|c| c.message.contains(needle))
        .cloned()
        .collect()
}

/// 是否有级别为 `level` 且包含 `needle` 的日志
pub fn contains(level: Level, needle: &str) -> bool {
    matching(needle).iter().any(|c| c.level == level)
}
