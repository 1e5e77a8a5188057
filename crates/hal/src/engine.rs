//! CM 引擎接口

use core::fmt;

use uapi::{
    ComponentHandle, CoreId, DomainDesc, DomainId, DomainState, MemHandle, MemoryKind, Priority,
    SkeletonHandle,
};

use crate::ids::ClientId;

/// 引擎返回的不透明错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCode(pub i32);

impl fmt::Display for EngineCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 引擎调用结果
pub type EngineResult<T> = Result<T, EngineCode>;

/// 内存区的地址视图（由引擎给出）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAddresses {
    /// 物理地址
    pub physical: usize,
    /// 主机内核逻辑地址
    pub kernel_logical: usize,
}

/// 一次负载计数器采样
///
/// 两个计数器都单调递增并可能回绕。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadCounters {
    /// DSP 忙碌周期数
    pub load: u32,
    /// 总周期数
    pub total: u32,
}

/// CM 引擎接口
pub trait EngineOps: Send + Sync {
    /// 引擎版本
    fn version(&self) -> u32;

    /// 在内存域中实例化组件
    fn instantiate(
        &self,
        client: ClientId,
        domain: DomainId,
        template: &str,
        local_name: &str,
        priority: Priority,
    ) -> EngineResult<ComponentHandle>;

    /// 将 `client` 组件的 required 接口绑定到 `server` 组件的 provided 接口
    fn bind(
        &self,
        client: ClientId,
        client_component: ComponentHandle,
        required_itf: &str,
        server_component: ComponentHandle,
        provided_itf: &str,
    ) -> EngineResult<()>;

    /// 解除 required 接口的绑定
    fn unbind(
        &self,
        client: ClientId,
        client_component: ComponentHandle,
        required_itf: &str,
    ) -> EngineResult<()>;

    /// 销毁组件
    fn destroy(&self, client: ClientId, component: ComponentHandle) -> EngineResult<()>;

    /// 将 DSP 组件的 required 接口绑定到主机侧 skeleton
    ///
    /// 之后该接口上的调用以 `skeleton` 为句柄作为异步事件上报。
    fn bind_to_host(
        &self,
        client: ClientId,
        component: ComponentHandle,
        required_itf: &str,
        skeleton: SkeletonHandle,
    ) -> EngineResult<()>;

    /// 解除 DSP → 主机绑定
    fn unbind_from_host(&self, client: ClientId, skeleton: SkeletonHandle) -> EngineResult<()>;

    /// 分配 DSP 可见内存
    fn alloc_memory(
        &self,
        client: ClientId,
        core: CoreId,
        kind: MemoryKind,
        size: usize,
        alignment: usize,
    ) -> EngineResult<MemHandle>;

    /// 查询内存区的物理地址和内核逻辑地址
    fn memory_addresses(&self, handle: MemHandle) -> EngineResult<MemoryAddresses>;

    /// 释放内存区
    fn free_memory(&self, handle: MemHandle) -> EngineResult<()>;

    /// 创建内存域
    fn create_domain(&self, client: ClientId, desc: &DomainDesc) -> EngineResult<DomainId>;

    /// 销毁内存域
    fn destroy_domain(&self, client: ClientId, domain: DomainId) -> EngineResult<()>;

    /// 查询内存域状态
    fn domain_state(&self, client: ClientId, domain: DomainId) -> EngineResult<DomainState>;

    /// 销毁某客户端拥有的全部组件
    fn flush_components_for(&self, client: ClientId) -> EngineResult<()>;

    /// 销毁某客户端拥有的全部内存域
    fn flush_domains_for(&self, client: ClientId) -> EngineResult<()>;

    /// 读取某个核的负载计数器
    fn load_counters(&self, core: CoreId) -> EngineResult<LoadCounters>;

    /// 设置引擎模式
    fn set_mode(&self, mode: u32, param: i32) -> EngineResult<()>;
}
