//! DSP 组件管理器主机侧运行时
//!
//! 在主机进程中协调运行在一个或多个 DSP 核上的软件组件：
//! 进程与通道登记、跨核消息分发、内存区分配与用户态映射、
//! DMA 中继描述符构建以及 DSP 电源与负载调节。
//!
//! # 外部协作方
//!
//! 运行时不直接与 DSP 固件或硬件交互，而是通过 trait 调用外部实现：
//! - [`EngineOps`]: CM 引擎
//! - [`PowerOps`]: 电源与性能档位
//! - [`RelinkRegisters`]: DMA 中继硬件
//! - [`UserMapper`]: 用户态映射
//!
//! 这些接口定义在 `hal` crate 中，实现打包成 [`Platform`] 传给 [`CmContext::new`]。
//!
//! # 加锁顺序
//!
//! 进程登记表 → 通道结构锁 → 通道内部锁，任何路径都不反向加锁。

pub mod channel;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod governor;
pub mod memory;
pub mod platform;
pub mod power;
pub mod process;
pub mod relink;

pub use channel::{
    ChannelEntry, ChannelHandle, ChannelRegistry, ChannelState, ReadOutcome, SkeletonBinding,
};
pub use command::{Caller, Completion};
pub use config::CmConfig;
pub use context::CmContext;
pub use dispatch::{EventProducer, RawEvent};
pub use error::{CmError, CmResult};
pub use governor::{Governor, LoadSampler, load_percent};
pub use memory::{AreaInfo, MappingState, MemoryStats};
pub use platform::{
    ClientId, DescriptorRecord, EngineCode, EngineOps, EngineResult, LinkControl, LinkEnd,
    LoadCounters, MemoryAddresses, Platform, PowerOps, PowerResource, RelinkRegisters, TaskId,
    UserMapper,
};
pub use power::PowerDomains;
pub use process::{ProcessEntry, ProcessHandle, ProcessRegistry};
pub use relink::{RelinkBuilder, RelinkRing};

// Re-export 客户端共用的定义
pub use uapi;
