//! 自旋锁封装
//!
//! 将原始锁接入 `lock_api`，提供带 RAII 守卫的数据封装。

use crate::{RawSpinLock, RawSpinRwLock};

/// 提供对数据的互斥访问的自旋锁。
///
/// SpinLock 不可重入。当持有锁时，再次获取同一把锁将导致死锁。
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;

/// [`SpinLock`] 的 RAII 守卫，离开作用域时释放锁。
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

/// 基于自旋的读写锁。
pub type RwLock<T> = lock_api::RwLock<RawSpinRwLock, T>;

/// [`RwLock`] 的读守卫。
pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawSpinRwLock, T>;

/// [`RwLock`] 的写守卫。
pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawSpinRwLock, T>;
