//! 集成测试共用的上下文构造

#![allow(dead_code)]

use cm::{CmConfig, CmContext, CmResult};
use test_support::MockPlatform;

/// 由一组 Mock 构造运行时上下文
pub trait MockContext {
    /// 使用给定配置创建运行时上下文
    fn context_with(&self, config: CmConfig) -> CmResult<CmContext>;

    /// 使用默认配置创建运行时上下文
    fn context(&self) -> CmResult<CmContext> {
        self.context_with(CmConfig::default())
    }
}

impl MockContext for MockPlatform {
    fn context_with(&self, config: CmConfig) -> CmResult<CmContext> {
        CmContext::new(config, self.platform())
    }
}
