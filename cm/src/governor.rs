//! DSP 负载调节
//!
//! 每个启用的核有一个后台线程，按周期读取引擎的负载计数器，
//! 根据带滞回的阈值在低档和高档之间切换性能档位投票：
//!
//! - 低档且负载严格大于高阈值时升到高档
//! - 高档且负载严格小于低阈值时降到低档
//!
//! 计数器单调递增并可能回绕，差值按回绕减法计算；总周期差为零时本周期不采样，
//! 读取失败时沿用上一次的采样，不发生切换。
//!
//! 通过模式命令可以把核固定在某个档位，此时采样继续但不下发投票。
//!
//! 同一个核的启用与停用由核上的转换锁串行化，整个转换过程持有该锁。

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use uapi::message::ServiceEvent;
use uapi::{CoreId, PerfLevel};

use crate::channel::ChannelRegistry;
use crate::config::CmConfig;
use crate::error::{CmError, CmResult};
use crate::platform::{EngineOps, LoadCounters, PowerResource};
use crate::power::PowerDomains;

/// 两次采样之间的负载百分比
///
/// 总周期差为零时返回 `None`。
pub fn load_percent(previous: LoadCounters, current: LoadCounters) -> Option<u32> {
    let total = current.total.wrapping_sub(previous.total);
    if total == 0 {
        return None;
    }
    let load = current.load.wrapping_sub(previous.load);
    let percent = (u64::from(load) * 100 / u64::from(total)).min(100);
    Some(percent as u32)
}

/// 带滞回的档位决策
#[derive(Debug, Clone)]
pub struct LoadSampler {
    previous: Option<LoadCounters>,
    level: PerfLevel,
    high_threshold: u32,
    low_threshold: u32,
}

impl LoadSampler {
    /// 从低档开始
    pub fn new(high_threshold: u32, low_threshold: u32) -> Self {
        Self {
            previous: None,
            level: PerfLevel::Low,
            high_threshold,
            low_threshold,
        }
    }

    /// 当前档位
    pub fn level(&self) -> PerfLevel {
        self.level
    }

    /// 处理一次采样，档位变化时返回新档位
    ///
    /// `None` 表示读取失败，沿用上一次采样。
    pub fn step(&mut self, sample: Option<LoadCounters>) -> Option<PerfLevel> {
        let current = sample?;
        let Some(previous) = self.previous.replace(current) else {
            return None;
        };
        let percent = load_percent(previous, current)?;
        let next = match self.level {
            PerfLevel::Low if percent > self.high_threshold => PerfLevel::High,
            PerfLevel::High if percent < self.low_threshold => PerfLevel::Low,
            _ => return None,
        };
        self.level = next;
        Some(next)
    }
}

struct CoreState {
    enabled: bool,
    sampler: LoadSampler,
    forced: Option<PerfLevel>,
}

struct CoreSlot {
    core: CoreId,
    /// 启用/停用期间持有
    transition: Mutex<()>,
    state: Mutex<CoreState>,
    stop: Mutex<bool>,
    wake: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// 启动采样线程
type Spawner = fn(Arc<Shared>, CoreId) -> io::Result<JoinHandle<()>>;

fn spawn_monitor(shared: Arc<Shared>, core: CoreId) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("cm-governor-{}", core.0))
        .spawn(move || monitor(shared, core))
}

struct Shared {
    engine: Arc<dyn EngineOps>,
    power: Arc<PowerDomains>,
    channels: Arc<ChannelRegistry>,
    period: Duration,
    cores: Vec<CoreSlot>,
}

impl Shared {
    fn slot(&self, core: CoreId) -> CmResult<&CoreSlot> {
        self.cores
            .get(usize::from(core.0))
            .ok_or(CmError::InvalidParameter)
    }

    fn tick(&self, slot: &CoreSlot) -> Option<PerfLevel> {
        let sample = match self.engine.load_counters(slot.core) {
            Ok(sample) => Some(sample),
            Err(code) => {
                debug!("cm: core {}: load counter read failed ({})", slot.core.0, code);
                None
            }
        };
        let mut state = slot.state.lock();
        if !state.enabled {
            return None;
        }
        let next = state.sampler.step(sample)?;
        info!("cm: core {}: load governor -> {:?}", slot.core.0, next);
        if state.forced.is_none() {
            self.power.ops().request_performance(slot.core, next);
        }
        Some(next)
    }
}

/// 各核的负载调节器
pub struct Governor {
    shared: Arc<Shared>,
    high_threshold: u32,
    low_threshold: u32,
}

impl Governor {
    /// 为 `config.core_count` 个核创建调节器，初始全部停用
    pub fn new(
        config: &CmConfig,
        engine: Arc<dyn EngineOps>,
        power: Arc<PowerDomains>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        let cores = (0..config.core_count)
            .map(|id| CoreSlot {
                core: CoreId(id),
                transition: Mutex::new(()),
                state: Mutex::new(CoreState {
                    enabled: false,
                    sampler: LoadSampler::new(config.high_threshold, config.low_threshold),
                    forced: None,
                }),
                stop: Mutex::new(false),
                wake: Condvar::new(),
                thread: Mutex::new(None),
            })
            .collect();
        Self {
            shared: Arc::new(Shared {
                engine,
                power,
                channels,
                period: config.governor_period,
                cores,
            }),
            high_threshold: config.high_threshold,
            low_threshold: config.low_threshold,
        }
    }

    /// 核是否已启用
    pub fn is_enabled(&self, core: CoreId) -> bool {
        self.shared
            .slot(core)
            .map(|slot| slot.state.lock().enabled)
            .unwrap_or(false)
    }

    /// 当前生效的档位，停用时为 `None`
    pub fn current_level(&self, core: CoreId) -> Option<PerfLevel> {
        let slot = self.shared.slot(core).ok()?;
        let state = slot.state.lock();
        state
            .enabled
            .then(|| state.forced.unwrap_or(state.sampler.level()))
    }

    /// 启用核：打开核电源，投票低档，启动采样线程
    ///
    /// 已启用时直接返回成功。线程无法启动时撤销投票并关闭核电源，返回
    /// [`CmError::OutOfMemory`]。
    pub fn enable(&self, core: CoreId) -> CmResult<()> {
        self.enable_with(core, spawn_monitor)
    }

    fn enable_with(&self, core: CoreId, spawn: Spawner) -> CmResult<()> {
        let slot = self.shared.slot(core)?;
        let _transition = slot.transition.lock();
        {
            let mut state = slot.state.lock();
            if state.enabled {
                return Ok(());
            }
            self.shared.power.acquire(PowerResource::Core(core))?;
            self.shared
                .power
                .ops()
                .request_performance(core, state.forced.unwrap_or(PerfLevel::Low));
            state.sampler = LoadSampler::new(self.high_threshold, self.low_threshold);
            state.enabled = true;
        }

        *slot.stop.lock() = false;
        match spawn(self.shared.clone(), core) {
            Ok(thread) => *slot.thread.lock() = Some(thread),
            Err(e) => {
                error!("cm: core {}: governor thread not started: {}", core.0, e);
                slot.state.lock().enabled = false;
                self.shared
                    .power
                    .ops()
                    .request_performance(core, PerfLevel::Released);
                self.shared.power.release(PowerResource::Core(core));
                return Err(CmError::OutOfMemory);
            }
        }
        info!("cm: core {}: enabled", core.0);
        Ok(())
    }

    /// 停用核：停止采样线程，撤销档位投票，广播下电事件，最后关闭核电源
    ///
    /// 未启用时直接返回成功。
    pub fn disable(&self, core: CoreId) -> CmResult<()> {
        let slot = self.shared.slot(core)?;
        let _transition = slot.transition.lock();
        if !slot.state.lock().enabled {
            return Ok(());
        }
        *slot.stop.lock() = true;
        slot.wake.notify_all();
        if let Some(thread) = slot.thread.lock().take() {
            if thread.join().is_err() {
                error!("cm: core {}: governor thread panicked", core.0);
            }
        }

        slot.state.lock().enabled = false;
        self.shared
            .power
            .ops()
            .request_performance(core, PerfLevel::Released);
        self.shared
            .channels
            .dispatch_to_all(&ServiceEvent::Shutdown { core });
        self.shared.power.release(PowerResource::Core(core));
        info!("cm: core {}: disabled", core.0);
        Ok(())
    }

    /// 立即执行一次采样，档位变化时返回新档位
    pub fn tick(&self, core: CoreId) -> Option<PerfLevel> {
        let slot = self.shared.slot(core).ok()?;
        self.shared.tick(slot)
    }

    /// 把核固定在 `level`（低档或高档）
    pub fn force_level(&self, core: CoreId, level: PerfLevel) -> CmResult<()> {
        if level == PerfLevel::Released {
            return Err(CmError::InvalidParameter);
        }
        let slot = self.shared.slot(core)?;
        let mut state = slot.state.lock();
        state.forced = Some(level);
        if state.enabled {
            self.shared.power.ops().request_performance(core, level);
        }
        debug!("cm: core {}: level forced to {:?}", core.0, level);
        Ok(())
    }

    /// 解除固定档位，恢复按负载投票
    pub fn release_forced(&self, core: CoreId) -> CmResult<()> {
        let slot = self.shared.slot(core)?;
        let mut state = slot.state.lock();
        if state.forced.take().is_some() && state.enabled {
            let level = state.sampler.level();
            self.shared.power.ops().request_performance(core, level);
        }
        Ok(())
    }

    /// 停用所有核
    pub fn shutdown(&self) {
        for slot in &self.shared.cores {
            if let Err(e) = self.disable(slot.core) {
                warn!("cm: core {}: disable failed: {}", slot.core.0, e);
            }
        }
    }
}

fn monitor(shared: Arc<Shared>, core: CoreId) {
    let Ok(slot) = shared.slot(core) else {
        return;
    };
    loop {
        {
            let mut stop = slot.stop.lock();
            if !*stop {
                slot.wake.wait_for(&mut stop, shared.period);
            }
            if *stop {
                break;
            }
        }
        shared.tick(slot);
    }
    debug!("cm: core {}: governor stopped", core.0);
}
