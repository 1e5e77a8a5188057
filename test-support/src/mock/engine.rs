//! CM 引擎的 Mock 实现
//!
//! 内存区按页粒度从物理地址 `0x1000` 开始顺序分配，内核逻辑地址为物理地址加固定偏移。

use std::collections::{BTreeMap, BTreeSet};

use hal::{ClientId, EngineCode, EngineOps, EngineResult, LoadCounters, MemoryAddresses};
use parking_lot::Mutex;
use uapi::{
    ComponentHandle, CoreId, DomainDesc, DomainId, DomainState, MemHandle, MemoryKind, Priority,
    SkeletonHandle,
};

/// Mock 引擎报告的版本号
pub const MOCK_ENGINE_VERSION: u32 = 0x0003_0200;

/// 第一个内存区的物理地址
const PHYS_BASE: usize = 0x1000;
const PAGE_SIZE: usize = 4096;
/// 内核逻辑地址相对物理地址的偏移
const KERNEL_OFFSET: usize = 0xc000_0000;
/// 注入失败时返回的错误码
pub const INJECTED_ERROR: EngineCode = EngineCode(-14);

/// 可以注入失败的引擎操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOp {
    /// 分配内存
    AllocMemory,
    /// 查询内存地址
    MemoryAddresses,
    /// 释放内存
    FreeMemory,
    /// DSP → 主机绑定
    BindToHost,
    /// 创建内存域
    CreateDomain,
    /// 销毁客户端组件
    FlushComponents,
    /// 销毁客户端内存域
    FlushDomains,
}

/// 引擎收到的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// 实例化组件
    Instantiate(ClientId, ComponentHandle),
    /// 绑定组件
    Bind(ClientId, ComponentHandle, ComponentHandle),
    /// 解除组件绑定
    Unbind(ClientId, ComponentHandle),
    /// 销毁组件
    Destroy(ClientId, ComponentHandle),
    /// DSP → 主机绑定
    BindToHost(ClientId, SkeletonHandle),
    /// 解除 DSP → 主机绑定
    UnbindFromHost(ClientId, SkeletonHandle),
    /// 分配内存
    AllocMemory(ClientId, MemHandle),
    /// 释放内存
    FreeMemory(MemHandle),
    /// 创建内存域
    CreateDomain(ClientId, DomainId),
    /// 销毁内存域
    DestroyDomain(ClientId, DomainId),
    /// 销毁客户端组件
    FlushComponents(ClientId),
    /// 销毁客户端内存域
    FlushDomains(ClientId),
    /// 设置模式
    SetMode(u32, i32),
}

struct Area {
    physical: usize,
}

#[derive(Default)]
struct State {
    next_handle: u32,
    next_physical: usize,
    areas: BTreeMap<MemHandle, Area>,
    domains: BTreeMap<DomainId, (ClientId, CoreId)>,
    components: BTreeMap<ComponentHandle, (ClientId, DomainId)>,
    counters: BTreeMap<CoreId, LoadCounters>,
    failures: Vec<EngineOp>,
    calls: Vec<EngineCall>,
}

/// Mock 引擎
pub struct MockEngine {
    state: Mutex<State>,
}

impl MockEngine {
    /// 创建空引擎
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_physical: PHYS_BASE,
                ..State::default()
            }),
        }
    }

    /// 让下一次 `op` 失败
    pub fn fail_next(&self, op: EngineOp) {
        self.state.lock().failures.push(op);
    }

    /// 设置某个核的负载计数器；未设置时读取失败
    pub fn set_load_counters(&self, core: CoreId, load: u32, total: u32) {
        self.state
            .lock()
            .counters
            .insert(core, LoadCounters { load, total });
    }

    /// 清除某个核的负载计数器，之后读取失败
    pub fn clear_load_counters(&self, core: CoreId) {
        self.state.lock().counters.remove(&core);
    }

    /// 已记录的调用
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// 清空调用记录
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// 引擎侧仍存活的内存区数量
    pub fn live_areas(&self) -> usize {
        self.state.lock().areas.len()
    }

    /// 引擎侧仍存活的内存区句柄
    pub fn area_handles(&self) -> BTreeSet<MemHandle> {
        self.state.lock().areas.keys().copied().collect()
    }

    /// 引擎侧仍存活的组件数量
    pub fn live_components(&self) -> usize {
        self.state.lock().components.len()
    }

    /// 引擎侧仍存活的内存域数量
    pub fn live_domains(&self) -> usize {
        self.state.lock().domains.len()
    }

    fn check(state: &mut State, op: EngineOp) -> EngineResult<()> {
        match state.failures.iter().position(|&f| f == op) {
            Some(index) => {
                state.failures.remove(index);
                Err(INJECTED_ERROR)
            }
            None => Ok(()),
        }
    }

    fn next_handle(state: &mut State) -> u32 {
        state.next_handle += 1;
        state.next_handle
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineOps for MockEngine {
    fn version(&self) -> u32 {
        MOCK_ENGINE_VERSION
    }

    fn instantiate(
        &self,
        client: ClientId,
        domain: DomainId,
        _template: &str,
        _local_name: &str,
        _priority: Priority,
    ) -> EngineResult<ComponentHandle> {
        let mut state = self.state.lock();
        match state.domains.get(&domain) {
            Some((owner, _)) if *owner == client => {}
            _ => return Err(EngineCode(-2)),
        }
        let component = ComponentHandle(Self::next_handle(&mut state));
        state.components.insert(component, (client, domain));
        state.calls.push(EngineCall::Instantiate(client, component));
        Ok(component)
    }

    fn bind(
        &self,
        client: ClientId,
        client_component: ComponentHandle,
        _required_itf: &str,
        server_component: ComponentHandle,
        _provided_itf: &str,
    ) -> EngineResult<()> {
        self.state.lock().calls.push(EngineCall::Bind(
            client,
            client_component,
            server_component,
        ));
        Ok(())
    }

    fn unbind(
        &self,
        client: ClientId,
        client_component: ComponentHandle,
        _required_itf: &str,
    ) -> EngineResult<()> {
        self.state
            .lock()
            .calls
            .push(EngineCall::Unbind(client, client_component));
        Ok(())
    }

    fn destroy(&self, client: ClientId, component: ComponentHandle) -> EngineResult<()> {
        let mut state = self.state.lock();
        match state.components.get(&component) {
            Some((owner, _)) if *owner == client => {}
            _ => return Err(EngineCode(-2)),
        }
        state.components.remove(&component);
        state.calls.push(EngineCall::Destroy(client, component));
        Ok(())
    }

    fn bind_to_host(
        &self,
        client: ClientId,
        _component: ComponentHandle,
        _required_itf: &str,
        skeleton: SkeletonHandle,
    ) -> EngineResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, EngineOp::BindToHost)?;
        state.calls.push(EngineCall::BindToHost(client, skeleton));
        Ok(())
    }

    fn unbind_from_host(&self, client: ClientId, skeleton: SkeletonHandle) -> EngineResult<()> {
        self.state
            .lock()
            .calls
            .push(EngineCall::UnbindFromHost(client, skeleton));
        Ok(())
    }

    fn alloc_memory(
        &self,
        client: ClientId,
        _core: CoreId,
        _kind: MemoryKind,
        size: usize,
        alignment: usize,
    ) -> EngineResult<MemHandle> {
        let mut state = self.state.lock();
        Self::check(&mut state, EngineOp::AllocMemory)?;
        let align = alignment.max(PAGE_SIZE);
        let physical = (state.next_physical + align - 1) & !(align - 1);
        state.next_physical = physical + ((size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1));
        let handle = MemHandle(Self::next_handle(&mut state));
        state.areas.insert(handle, Area { physical });
        state.calls.push(EngineCall::AllocMemory(client, handle));
        Ok(handle)
    }

    fn memory_addresses(&self, handle: MemHandle) -> EngineResult<MemoryAddresses> {
        let mut state = self.state.lock();
        Self::check(&mut state, EngineOp::MemoryAddresses)?;
        let area = state.areas.get(&handle).ok_or(EngineCode(-2))?;
        Ok(MemoryAddresses {
            physical: area.physical,
            kernel_logical: area.physical + KERNEL_OFFSET,
        })
    }

    fn free_memory(&self, handle: MemHandle) -> EngineResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, EngineOp::FreeMemory)?;
        state.areas.remove(&handle).ok_or(EngineCode(-2))?;
        state.calls.push(EngineCall::FreeMemory(handle));
        Ok(())
    }

    fn create_domain(&self, client: ClientId, desc: &DomainDesc) -> EngineResult<DomainId> {
        let mut state = self.state.lock();
        Self::check(&mut state, EngineOp::CreateDomain)?;
        let domain = DomainId(Self::next_handle(&mut state));
        state.domains.insert(domain, (client, desc.core));
        state.calls.push(EngineCall::CreateDomain(client, domain));
        Ok(domain)
    }

    fn destroy_domain(&self, client: ClientId, domain: DomainId) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.components.values().any(|(_, d)| *d == domain) {
            return Err(EngineCode(-16));
        }
        state.domains.remove(&domain).ok_or(EngineCode(-2))?;
        state.calls.push(EngineCall::DestroyDomain(client, domain));
        Ok(())
    }

    fn domain_state(&self, _client: ClientId, domain: DomainId) -> EngineResult<DomainState> {
        let state = self.state.lock();
        let (_, core) = state.domains.get(&domain).ok_or(EngineCode(-2))?;
        let components = state
            .components
            .values()
            .filter(|(_, d)| *d == domain)
            .count() as u32;
        Ok(DomainState {
            core: *core,
            components,
        })
    }

    fn flush_components_for(&self, client: ClientId) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::FlushComponents(client));
        Self::check(&mut state, EngineOp::FlushComponents)?;
        state.components.retain(|_, (owner, _)| *owner != client);
        Ok(())
    }

    fn flush_domains_for(&self, client: ClientId) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::FlushDomains(client));
        Self::check(&mut state, EngineOp::FlushDomains)?;
        state.domains.retain(|_, (owner, _)| *owner != client);
        Ok(())
    }

    fn load_counters(&self, core: CoreId) -> EngineResult<LoadCounters> {
        self.state
            .lock()
            .counters
            .get(&core)
            .copied()
            .ok_or(EngineCode(-5))
    }

    fn set_mode(&self, mode: u32, param: i32) -> EngineResult<()> {
        self.state.lock().calls.push(EngineCall::SetMode(mode, param));
        Ok(())
    }
}
