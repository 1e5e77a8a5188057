//! 测试支持 crate
//!
//! 提供外部协作方的 Mock 实现和捕获日志的 logger，供 `cm` 的单元测试和集成测试使用。
//! 只依赖 `hal` 与 `uapi`，不反向依赖运行时本身。

pub mod logger;
pub mod mock;

use std::sync::Arc;

use hal::Platform;
use mock::{MockEngine, MockMapper, MockPower, MockRelinkRegisters};

/// 一组 Mock 及由它们组成的 [`Platform`]
#[derive(Clone)]
pub struct MockPlatform {
    /// 引擎
    pub engine: Arc<MockEngine>,
    /// 电源
    pub power: Arc<MockPower>,
    /// DMA 中继寄存器
    pub relink: Arc<MockRelinkRegisters>,
    /// 用户态映射
    pub mapper: Arc<MockMapper>,
}

impl MockPlatform {
    /// 创建默认的 Mock 组合
    pub fn new() -> Self {
        Self {
            engine: Arc::new(MockEngine::new()),
            power: Arc::new(MockPower::new()),
            relink: Arc::new(MockRelinkRegisters::new(64)),
            mapper: Arc::new(MockMapper::new()),
        }
    }

    /// 转换为注入运行时的 [`Platform`]
    pub fn platform(&self) -> Platform {
        Platform {
            engine: self.engine.clone(),
            power: self.power.clone(),
            relink: self.relink.clone(),
            mapper: self.mapper.clone(),
        }
    }

}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}
