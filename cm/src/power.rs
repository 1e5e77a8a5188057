//! 电源资源引用计数
//!
//! 多个使用者共享同一个电源资源（例如各核共享的 ESRAM）。
//! 第一个引用打开资源，最后一个引用释放时关闭资源。

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::CmResult;
use crate::platform::{PowerOps, PowerResource};

/// 带引用计数的电源资源集合
pub struct PowerDomains {
    ops: Arc<dyn PowerOps>,
    refs: Mutex<BTreeMap<PowerResource, usize>>,
}

impl PowerDomains {
    /// 创建空集合，所有资源初始为关闭
    pub fn new(ops: Arc<dyn PowerOps>) -> Self {
        Self {
            ops,
            refs: Mutex::new(BTreeMap::new()),
        }
    }

    /// 底层电源接口
    pub fn ops(&self) -> &Arc<dyn PowerOps> {
        &self.ops
    }

    /// 增加一个引用，0 → 1 时打开资源
    ///
    /// 打开失败时不记录引用。
    pub fn acquire(&self, resource: PowerResource) -> CmResult<()> {
        let mut refs = self.refs.lock();
        let count = refs.get(&resource).copied().unwrap_or(0);
        if count == 0 {
            self.ops.power_enable(resource)?;
            debug!("power: {:?} on", resource);
        }
        refs.insert(resource, count + 1);
        Ok(())
    }

    /// 减少一个引用，1 → 0 时关闭资源
    pub fn release(&self, resource: PowerResource) {
        let mut refs = self.refs.lock();
        match refs.get_mut(&resource) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                refs.remove(&resource);
                self.ops.power_disable(resource);
                debug!("power: {:?} off", resource);
            }
            None => warn!("power: release of unreferenced {:?}", resource),
        }
    }

    /// 当前引用数
    pub fn refcount(&self, resource: PowerResource) -> usize {
        self.refs.lock().get(&resource).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CmError;
    use crate::platform::EngineCode;
    use test_support::mock::{MockPower, PowerEvent};
    use uapi::CoreId;

    #[test]
    fn test_first_and_last_reference_switch_power() {
        let mock = Arc::new(MockPower::new());
        let domains = PowerDomains::new(mock.clone());

        domains.acquire(PowerResource::Esram).unwrap();
        domains.acquire(PowerResource::Esram).unwrap();
        assert_eq!(domains.refcount(PowerResource::Esram), 2);
        domains.release(PowerResource::Esram);
        assert_eq!(mock.events().len(), 1);
        domains.release(PowerResource::Esram);

        assert_eq!(
            mock.events(),
            vec![
                PowerEvent::Enable(PowerResource::Esram),
                PowerEvent::Disable(PowerResource::Esram)
            ]
        );
        assert_eq!(domains.refcount(PowerResource::Esram), 0);
    }

    #[test]
    fn test_failed_enable_takes_no_reference() {
        let mock = Arc::new(MockPower::new());
        mock.fail_next_enable();
        let domains = PowerDomains::new(mock);
        let core = PowerResource::Core(CoreId(1));

        assert_eq!(
            domains.acquire(core),
            Err(CmError::Engine(EngineCode(-19)))
        );
        assert_eq!(domains.refcount(core), 0);
    }

    #[test]
    fn test_unbalanced_release_is_ignored() {
        let mock = Arc::new(MockPower::new());
        let domains = PowerDomains::new(mock.clone());
        domains.release(PowerResource::Esram);
        assert!(mock.events().is_empty());
    }
}
