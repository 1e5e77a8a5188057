//! 自旋读写锁实现
//!
//! 状态字最低位表示写者持有，其余位为读者计数（以 [`READER`] 为单位）。

use core::{
    hint,
    sync::atomic::{AtomicUsize, Ordering},
};

use lock_api::{GuardSend, RawRwLock};

const WRITER: usize = 1;
const READER: usize = 2;

/// 原始自旋读写锁
///
/// 多个读者可以同时持有；写者独占。写者在获取时若有读者存在会持续自旋，
/// 因此读临界区必须保持短小，否则写者可能长时间得不到锁。
#[derive(Debug)]
pub struct RawSpinRwLock {
    state: AtomicUsize,
}

impl RawSpinRwLock {
    /// 创建一个未被持有的读写锁。
    pub const fn new() -> Self {
        RawSpinRwLock {
            state: AtomicUsize::new(0),
        }
    }
}

impl Default for RawSpinRwLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawRwLock for RawSpinRwLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinRwLock::new();

    type GuardMarker = GuardSend;

    fn lock_shared(&self) {
        while !self.try_lock_shared() {
            hint::spin_loop();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let state = self.state.load(Ordering::Relaxed);
        if state & WRITER != 0 {
            return false;
        }
        self.state
            .compare_exchange_weak(state, state + READER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_shared(&self) {
        self.state.fetch_sub(READER, Ordering::Release);
    }

    fn lock_exclusive(&self) {
        while self
            .state
            .compare_exchange_weak(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.state.load(Ordering::Relaxed) != 0 {
                hint::spin_loop();
            }
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.state.fetch_and(!WRITER, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != 0
    }

    fn is_locked_exclusive(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITER != 0
    }
}
