//! 进程登记
//!
//! 每个客户端（以 [`ClientId`] 区分）对应一个 [`ProcessEntry`]，由引用计数管理。
//! 第一次获取时创建，最后一个句柄释放时按固定顺序销毁：
//!
//! 1. 通过引擎销毁该客户端的全部组件
//! 2. 通过引擎销毁该客户端的全部内存域
//! 3. 移除该客户端的通道和绑定
//! 4. 释放该客户端的内存区
//!
//! 组件和内存域可能引用内存区，因此内存最后释放。销毁过程中的错误只记录
//! 日志，不会中断后续步骤。

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error, info};
use parking_lot::Mutex;
use uapi::DomainId;

use crate::channel::ChannelRegistry;
use crate::memory::{AreaList, MemoryRegistry, MemoryStats};
use crate::platform::{ClientId, EngineOps, PowerResource};
use crate::power::PowerDomains;

/// 一个客户端进程
pub struct ProcessEntry {
    client: ClientId,
    refs: AtomicUsize,
    areas: AreaList,
    /// 该进程创建的内存域，值表示是否持有 ESRAM 电源引用
    domains: Mutex<BTreeMap<DomainId, bool>>,
}

impl ProcessEntry {
    pub(crate) fn new(client: ClientId) -> Self {
        Self {
            client,
            refs: AtomicUsize::new(0),
            areas: AreaList::new(),
            domains: Mutex::new(BTreeMap::new()),
        }
    }

    /// 客户端标识
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// 当前句柄数
    pub fn refcount(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// 内存区列表
    pub fn areas(&self) -> &AreaList {
        &self.areas
    }

    /// 内存统计
    pub fn memory_stats(&self) -> MemoryStats {
        self.areas.stats()
    }

    /// 登记新建的内存域
    pub(crate) fn add_domain(&self, domain: DomainId, holds_esram: bool) {
        self.domains.lock().insert(domain, holds_esram);
    }

    /// 注销内存域，返回是否持有 ESRAM 引用；不属于该进程时返回 `None`
    pub(crate) fn remove_domain(&self, domain: DomainId) -> Option<bool> {
        self.domains.lock().remove(&domain)
    }

    /// 该进程是否拥有内存域
    pub fn owns_domain(&self, domain: DomainId) -> bool {
        self.domains.lock().contains_key(&domain)
    }
}

/// 进程句柄
///
/// 不可克隆，每个句柄对应一次引用，通过 [`ProcessRegistry::release`] 交还。
pub struct ProcessHandle {
    entry: Arc<ProcessEntry>,
}

impl ProcessHandle {
    /// 底层进程项
    pub fn entry(&self) -> &Arc<ProcessEntry> {
        &self.entry
    }
}

impl Deref for ProcessHandle {
    type Target = ProcessEntry;

    fn deref(&self) -> &ProcessEntry {
        &self.entry
    }
}

/// 进程登记表
pub struct ProcessRegistry {
    entries: Mutex<BTreeMap<ClientId, Arc<ProcessEntry>>>,
    engine: Arc<dyn EngineOps>,
    channels: Arc<ChannelRegistry>,
    memory: Arc<MemoryRegistry>,
    power: Arc<PowerDomains>,
}

impl ProcessRegistry {
    /// 创建登记表
    pub fn new(
        engine: Arc<dyn EngineOps>,
        channels: Arc<ChannelRegistry>,
        memory: Arc<MemoryRegistry>,
        power: Arc<PowerDomains>,
    ) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            engine,
            channels,
            memory,
            power,
        }
    }

    /// 获取（必要时创建）客户端的进程项
    pub fn acquire(&self, client: ClientId) -> ProcessHandle {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(client)
            .or_insert_with(|| {
                debug!("cm: {}: process created", client);
                Arc::new(ProcessEntry::new(client))
            })
            .clone();
        entry.refs.fetch_add(1, Ordering::AcqRel);
        ProcessHandle { entry }
    }

    /// 交还句柄，最后一个句柄交还时销毁进程项
    pub fn release(&self, handle: ProcessHandle) {
        let mut entries = self.entries.lock();
        let entry = handle.entry;
        if entry.refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        entries.remove(&entry.client);
        self.teardown(&entry);
    }

    fn teardown(&self, entry: &ProcessEntry) {
        let client = entry.client;
        if let Err(code) = self.engine.flush_components_for(client) {
            error!("cm: {}: leaking components ({})", client, code);
        }
        if let Err(code) = self.engine.flush_domains_for(client) {
            error!("cm: {}: leaking domains ({})", client, code);
        }
        let domains = core::mem::take(&mut *entry.domains.lock());
        for holds_esram in domains.into_values() {
            if holds_esram {
                self.power.release(PowerResource::Esram);
            }
        }
        let channels = self.channels.release_client(client);
        let areas = entry.areas.len();
        self.memory.free_all(client, &entry.areas);
        info!(
            "cm: {}: process released ({} channel(s), {} area(s))",
            client, channels, areas
        );
    }

    /// 登记的进程数
    pub fn process_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// 查找客户端的进程项
    pub fn lookup(&self, client: ClientId) -> Option<Arc<ProcessEntry>> {
        self.entries.lock().get(&client).cloned()
    }
}
