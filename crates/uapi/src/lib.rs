//! 与客户端共用的定义和声明
//!
//! 包含命令编号、定长输入/输出结构体、状态码以及消息的二进制布局，
//! 确保运行时与客户端库的一致性。

#![no_std]
#![allow(dead_code)]

extern crate alloc;

pub mod cmd;
pub mod errno;
pub mod message;
pub mod types;

pub use types::*;

/// 由主、次、修订号组合出版本号
pub const fn make_version(major: u32, minor: u32, patch: u32) -> u32 {
    (major << 16) | ((minor & 0xff) << 8) | (patch & 0xff)
}

/// 运行时 ABI 版本
///
/// 主版本号不同表示命令结构体或消息布局不兼容。
pub const CM_ABI_VERSION: u32 = make_version(2, 1, 0);

/// 取版本号中的主版本
pub const fn version_major(version: u32) -> u32 {
    version >> 16
}
