//! CM 运行时的外部协作方接口
//!
//! 运行时不直接操作 DSP 固件、电源或页表，而是通过以下 trait 调用外部实现：
//!
//! - [`EngineOps`]: CM 引擎（组件、内存、内存域、负载计数器）
//! - [`PowerOps`]: 电源/稳压器与性能档位投票
//! - [`RelinkRegisters`]: DMA 中继描述符表与链路控制寄存器
//! - [`UserMapper`]: 建立/撤销用户态映射
//!
//! 这些实现打包为 [`Platform`] 注入运行时。接口单独成 crate，
//! 测试用的 Mock 只依赖本 crate，不依赖运行时本身。

#![no_std]

extern crate alloc;

pub mod engine;
pub mod ids;
pub mod mapper;
pub mod power;
pub mod relink;

use alloc::sync::Arc;

pub use engine::{EngineCode, EngineOps, EngineResult, LoadCounters, MemoryAddresses};
pub use ids::{ClientId, TaskId};
pub use mapper::UserMapper;
pub use power::{PowerOps, PowerResource};
pub use relink::{DescriptorRecord, LinkControl, LinkEnd, RelinkRegisters};

/// 注入运行时的外部实现
#[derive(Clone)]
pub struct Platform {
    /// CM 引擎
    pub engine: Arc<dyn EngineOps>,
    /// 电源
    pub power: Arc<dyn PowerOps>,
    /// DMA 中继硬件
    pub relink: Arc<dyn RelinkRegisters>,
    /// 用户态映射
    pub mapper: Arc<dyn UserMapper>,
}
