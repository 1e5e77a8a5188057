//! 电源接口

use uapi::{CoreId, PerfLevel};

use crate::engine::EngineResult;

/// 可单独上下电的电源资源
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PowerResource {
    /// 某个 DSP 核
    Core(CoreId),
    /// 各核共享的片上 ESRAM
    Esram,
}

/// 电源与性能档位接口
pub trait PowerOps: Send + Sync {
    /// 打开电源资源
    fn power_enable(&self, resource: PowerResource) -> EngineResult<()>;

    /// 关闭电源资源
    fn power_disable(&self, resource: PowerResource);

    /// 更新某个核的性能档位投票
    fn request_performance(&self, core: CoreId, level: PerfLevel);
}
