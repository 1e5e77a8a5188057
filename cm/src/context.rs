//! 运行时上下文
//!
//! [`CmContext`] 持有全部登记表和后台任务，由调用者创建并在各处显式传递。
//! 创建时启动事件消费线程；[`CmContext::shutdown`] 或 drop 时停止所有后台任务。

use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use sync::SpinLock;
use uapi::cmd::ChannelFlags;
use uapi::message::ServiceEvent;
use uapi::{CoreId, MemHandle, MemoryKind, RelinkDirection};

use crate::channel::{ChannelHandle, ChannelRegistry};
use crate::config::CmConfig;
use crate::dispatch::{DispatchWorker, EventProducer, event_queue};
use crate::error::{CmError, CmResult};
use crate::governor::Governor;
use crate::memory::{AreaInfo, MemoryRegistry};
use crate::platform::{ClientId, EngineOps, Platform, TaskId};
use crate::power::PowerDomains;
use crate::process::{ProcessHandle, ProcessRegistry};
use crate::relink::RelinkBuilder;

/// 运行时上下文
pub struct CmContext {
    config: CmConfig,
    engine: Arc<dyn EngineOps>,
    power: Arc<PowerDomains>,
    channels: Arc<ChannelRegistry>,
    memory: Arc<MemoryRegistry>,
    processes: ProcessRegistry,
    relink: SpinLock<RelinkBuilder>,
    governor: Governor,
    producer: EventProducer,
    worker: Mutex<DispatchWorker>,
}

impl CmContext {
    /// 创建上下文并启动事件消费线程
    pub fn new(config: CmConfig, platform: Platform) -> CmResult<Self> {
        if !config.is_valid() {
            return Err(CmError::InvalidParameter);
        }
        let Platform {
            engine,
            power,
            relink,
            mapper,
        } = platform;

        let power = Arc::new(PowerDomains::new(power));
        let channels = Arc::new(ChannelRegistry::new(config.channel_queue_limit));
        let memory = Arc::new(MemoryRegistry::new(
            engine.clone(),
            mapper,
            power.clone(),
            config.page_size,
        ));
        let processes = ProcessRegistry::new(
            engine.clone(),
            channels.clone(),
            memory.clone(),
            power.clone(),
        );
        let governor = Governor::new(&config, engine.clone(), power.clone(), channels.clone());
        let (producer, events) = event_queue(config.event_queue_capacity);
        let worker = DispatchWorker::spawn(events, channels.clone());
        if !worker.is_running() {
            return Err(CmError::OutOfMemory);
        }
        info!(
            "cm: runtime up, {} core(s), engine version {:#x}",
            config.core_count,
            engine.version()
        );

        Ok(Self {
            relink: SpinLock::new(RelinkBuilder::new(relink, config.relink_stop_spins)),
            config,
            engine,
            power,
            channels,
            memory,
            processes,
            governor,
            producer,
            worker: Mutex::new(worker),
        })
    }

    /// 配置
    pub fn config(&self) -> &CmConfig {
        &self.config
    }

    /// 引擎
    pub fn engine(&self) -> &Arc<dyn EngineOps> {
        &self.engine
    }

    /// 电源资源
    pub fn power(&self) -> &PowerDomains {
        &self.power
    }

    /// 通道登记表
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// 进程登记表
    pub fn processes(&self) -> &ProcessRegistry {
        &self.processes
    }

    /// 负载调节器
    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    /// 异步事件生产者
    pub fn event_producer(&self) -> EventProducer {
        self.producer.clone()
    }

    /// 核编号是否有效
    pub fn check_core(&self, core: CoreId) -> CmResult<()> {
        if core.0 < self.config.core_count {
            Ok(())
        } else {
            Err(CmError::InvalidParameter)
        }
    }

    /// 获取客户端的进程句柄
    pub fn acquire_process(&self, client: ClientId) -> ProcessHandle {
        self.processes.acquire(client)
    }

    /// 交还进程句柄
    pub fn release_process(&self, handle: ProcessHandle) {
        self.processes.release(handle);
    }

    /// 为进程打开通道
    pub fn open_channel(&self, process: &ProcessHandle, flags: ChannelFlags) -> ChannelHandle {
        self.channels.open(process.entry(), flags)
    }

    /// 关闭通道
    pub fn close_channel(&self, channel: &ChannelHandle) -> CmResult<()> {
        self.channels.close(channel)
    }

    /// 同步广播服务事件，返回收到事件的通道数
    pub fn dispatch_to_all(&self, event: &ServiceEvent) -> usize {
        self.channels.dispatch_to_all(event)
    }

    /// 分配内存区
    pub fn allocate(
        &self,
        process: &ProcessHandle,
        core: CoreId,
        kind: MemoryKind,
        size: usize,
        alignment: usize,
    ) -> CmResult<MemHandle> {
        self.check_core(core)?;
        self.memory
            .allocate(process.client(), process.areas(), core, kind, size, alignment)
    }

    /// 释放内存区
    pub fn free_memory(&self, process: &ProcessHandle, handle: MemHandle) -> CmResult<()> {
        self.memory.free(process.client(), process.areas(), handle)
    }

    /// 查询内存区
    pub fn describe_memory(
        &self,
        process: &ProcessHandle,
        handle: MemHandle,
    ) -> CmResult<AreaInfo> {
        process.areas().describe(handle)
    }

    /// 为用户态映射预留内存区
    pub fn reserve_for_mapping(
        &self,
        process: &ProcessHandle,
        physical: usize,
        task: TaskId,
    ) -> CmResult<()> {
        self.memory.reserve(process.areas(), physical, task)
    }

    /// 取消预留
    pub fn cancel_reservation(
        &self,
        process: &ProcessHandle,
        physical: usize,
        task: TaskId,
    ) -> CmResult<()> {
        self.memory.cancel_reservation(process.areas(), physical, task)
    }

    /// 建立用户态映射
    pub fn map(&self, process: &ProcessHandle, physical: usize, task: TaskId) -> CmResult<usize> {
        self.memory.map(process.client(), process.areas(), physical, task)
    }

    /// 按页偏移建立用户态映射
    pub fn map_offset(
        &self,
        process: &ProcessHandle,
        page_offset: usize,
        length: usize,
        task: TaskId,
    ) -> CmResult<usize> {
        self.memory
            .map_offset(process.client(), process.areas(), page_offset, length, task)
    }

    /// 撤销一次用户态映射，返回剩余映射计数
    pub fn unmap(&self, process: &ProcessHandle, physical: usize) -> CmResult<u32> {
        self.memory.unmap(process.client(), process.areas(), physical)
    }

    /// 配置 DMA 中继循环链路
    pub fn configure_relink(
        &self,
        direction: RelinkDirection,
        memory_base: u64,
        peripheral_address: u64,
        segment_count: usize,
        segment_size: usize,
        start_slot: usize,
    ) -> CmResult<()> {
        self.relink.lock().configure_cyclic(
            direction,
            memory_base,
            peripheral_address,
            segment_count,
            segment_size,
            start_slot,
        )
    }

    /// 停止 DMA 中继链路
    pub fn stop_relink(&self) -> CmResult<()> {
        self.relink.lock().stop()
    }

    /// 是否有中继链路在运行
    pub fn relink_configured(&self) -> bool {
        self.relink.lock().is_configured()
    }

    /// 停止后台任务：事件消费线程、各核负载调节、中继链路
    ///
    /// 可重复调用。
    pub fn shutdown(&self) {
        self.worker.lock().stop();
        self.governor.shutdown();
        if let Err(e) = self.stop_relink() {
            warn!("cm: relink not stopped at shutdown: {}", e);
        }
    }
}

impl Drop for CmContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
