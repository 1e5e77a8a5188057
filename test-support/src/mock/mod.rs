//! Mock 实现模块
//!
//! 每个 Mock 记录收到的调用，并允许测试注入一次性失败。

mod engine;
mod mapper;
mod power;
mod relink;

pub use engine::{EngineCall, EngineOp, INJECTED_ERROR, MOCK_ENGINE_VERSION, MockEngine};
pub use mapper::{MockMapper, UnmapHook};
pub use power::{MockPower, PowerEvent};
pub use relink::MockRelinkRegisters;
