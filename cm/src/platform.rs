//! 外部协作方接口
//!
//! 接口定义在 `hal` crate 中，这里重新导出，运行时内部统一从本模块引用。
//! 这些实现打包为 [`Platform`]，在创建 [`crate::CmContext`] 时注入。

pub use hal::{
    ClientId, DescriptorRecord, EngineCode, EngineOps, EngineResult, LinkControl, LinkEnd,
    LoadCounters, MemoryAddresses, Platform, PowerOps, PowerResource, RelinkRegisters, TaskId,
    UserMapper,
};
