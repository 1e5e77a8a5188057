//! 同步原语
//!
//! 向 CM 运行时提供短临界区使用的自旋锁和读写锁。
//!
//! 两种锁都以 `lock_api` 的原始锁 trait 实现，对外暴露的 [`SpinLock`] / [`RwLock`]
//! 即 `lock_api` 的通用封装，因此守卫类型、`try_lock`、`into_inner` 等接口与
//! `lock_api` 一致。
//!
//! # 使用约束
//!
//! - 自旋锁只适合保护**短小且不会睡眠**的临界区（例如结构性的表操作）。
//!   会调用外部引擎或可能阻塞的路径应使用可睡眠的互斥锁。
//! - 锁不可重入；在同一线程内嵌套获取同一把锁会导致死锁。
//! - 多把锁嵌套时必须遵循调用方约定的锁顺序。

#![no_std]

mod raw_spin_lock;
mod raw_spin_rwlock;
mod spin_lock;

pub use raw_spin_lock::RawSpinLock;
pub use raw_spin_rwlock::RawSpinRwLock;
pub use spin_lock::*;
