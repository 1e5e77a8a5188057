//! 电源的 Mock 实现

use std::collections::BTreeSet;

use hal::{EngineCode, EngineResult, PowerOps, PowerResource};
use parking_lot::Mutex;
use uapi::{CoreId, PerfLevel};

/// 电源侧发生的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    /// 打开资源
    Enable(PowerResource),
    /// 关闭资源
    Disable(PowerResource),
    /// 性能档位投票
    Performance(CoreId, PerfLevel),
}

#[derive(Default)]
struct State {
    on: BTreeSet<PowerResource>,
    events: Vec<PowerEvent>,
    fail_next_enable: bool,
}

/// Mock 电源
#[derive(Default)]
pub struct MockPower {
    state: Mutex<State>,
}

impl MockPower {
    /// 创建全部关闭的电源
    pub fn new() -> Self {
        Self::default()
    }

    /// 资源当前是否打开
    pub fn is_on(&self, resource: PowerResource) -> bool {
        self.state.lock().on.contains(&resource)
    }

    /// 按顺序记录的事件
    pub fn events(&self) -> Vec<PowerEvent> {
        self.state.lock().events.clone()
    }

    /// 某个核最近一次的档位投票
    pub fn last_request(&self, core: CoreId) -> Option<PerfLevel> {
        self.state
            .lock()
            .events
            .iter()
            .rev()
            .find_map(|event| match event {
                PowerEvent::Performance(c, level) if *c == core => Some(*level),
                _ => None,
            })
    }

    /// 让下一次打开失败
    pub fn fail_next_enable(&self) {
        self.state.lock().fail_next_enable = true;
    }
}

impl PowerOps for MockPower {
    fn power_enable(&self, resource: PowerResource) -> EngineResult<()> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_enable) {
            return Err(EngineCode(-19));
        }
        state.on.insert(resource);
        state.events.push(PowerEvent::Enable(resource));
        Ok(())
    }

    fn power_disable(&self, resource: PowerResource) {
        let mut state = self.state.lock();
        state.on.remove(&resource);
        state.events.push(PowerEvent::Disable(resource));
    }

    fn request_performance(&self, core: CoreId, level: PerfLevel) {
        self.state
            .lock()
            .events
            .push(PowerEvent::Performance(core, level));
    }
}
