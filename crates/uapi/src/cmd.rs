//! 控制命令
//!
//! 每条命令有一个固定编号（[`CmdNo`]）、一个定长输入结构体和一个定长输出结构体。
//! 名字类字段使用以 NUL 结尾的定长字节数组 [`Name`]，运行时在转发给引擎之前
//! 校验其长度和编码。

use bitflags::bitflags;

use crate::types::{
    ChannelId, ComponentHandle, CoreId, DomainDesc, DomainId, DomainState, MemHandle,
    SkeletonHandle,
};

/// 名字字段的最大长度（含结尾 NUL）
pub const NAME_MAX: usize = 128;

/// 定长名字字段
pub type Name = [u8; NAME_MAX];

/// 把字符串编码为定长名字字段
///
/// 字符串（不含 NUL）长度必须小于 [`NAME_MAX`]，且自身不能包含 NUL。
pub fn encode_name(s: &str) -> Option<Name> {
    let bytes = s.as_bytes();
    if bytes.len() >= NAME_MAX || bytes.contains(&0) {
        return None;
    }
    let mut name = [0u8; NAME_MAX];
    name[..bytes.len()].copy_from_slice(bytes);
    Some(name)
}

/// 解析定长名字字段
///
/// 数组中必须存在结尾 NUL，且 NUL 之前的内容为非空 UTF-8。
pub fn decode_name(name: &Name) -> Option<&str> {
    let len = name.iter().position(|&b| b == 0)?;
    if len == 0 {
        return None;
    }
    core::str::from_utf8(&name[..len]).ok()
}

/// 命令编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CmdNo {
    /// 查询版本
    GetVersion = 0x00,

    /// 实例化组件
    InstantiateComponent = 0x10,
    /// 绑定两个组件
    BindComponent = 0x11,
    /// 解除组件绑定
    UnbindComponent = 0x12,
    /// 销毁组件
    DestroyComponent = 0x13,
    /// 将 DSP 组件的接口绑定到主机侧通道
    BindComponentToHost = 0x14,
    /// 解除 DSP → 主机绑定
    UnbindComponentToHost = 0x15,

    /// 分配 DSP 可见内存
    AllocMemory = 0x20,
    /// 释放内存
    FreeMemory = 0x21,
    /// 为用户态映射预留内存区
    ReserveMemory = 0x22,
    /// 取消预留
    CancelReservation = 0x23,
    /// 查询内存区描述
    DescribeMemory = 0x24,
    /// 查询进程内存统计
    GetMemoryStatus = 0x25,

    /// 创建内存域
    CreateDomain = 0x30,
    /// 销毁内存域
    DestroyDomain = 0x31,
    /// 查询内存域状态
    GetDomainState = 0x32,

    /// 设置模式/调试参数
    SetMode = 0x40,

    /// 配置循环 DMA 中继链路
    ConfigureRelink = 0x50,
    /// 停止 DMA 中继链路
    StopRelink = 0x51,

    /// 冲刷通道（一次性唤醒读者）
    FlushChannel = 0x60,
}

impl CmdNo {
    /// 从原始编号解析
    pub fn from_raw(raw: u32) -> Option<Self> {
        use CmdNo::*;
        Some(match raw {
            0x00 => GetVersion,
            0x10 => InstantiateComponent,
            0x11 => BindComponent,
            0x12 => UnbindComponent,
            0x13 => DestroyComponent,
            0x14 => BindComponentToHost,
            0x15 => UnbindComponentToHost,
            0x20 => AllocMemory,
            0x21 => FreeMemory,
            0x22 => ReserveMemory,
            0x23 => CancelReservation,
            0x24 => DescribeMemory,
            0x25 => GetMemoryStatus,
            0x30 => CreateDomain,
            0x31 => DestroyDomain,
            0x32 => GetDomainState,
            0x40 => SetMode,
            0x50 => ConfigureRelink,
            0x51 => StopRelink,
            0x60 => FlushChannel,
            _ => return None,
        })
    }
}

bitflags! {
    /// 通道打开标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelFlags: u32 {
        /// 读取时不阻塞
        const NONBLOCK = 1 << 0;
    }
}

/// 运行时自身处理的模式编号，其余模式原样转发给引擎
pub mod mode {
    /// 把某个核的性能档位固定为 `param`（见 [`crate::PerfLevel`]）
    pub const FORCE_PERF_LEVEL: u32 = 0x100;
    /// 解除固定档位，恢复负载调节
    pub const RELEASE_PERF_LEVEL: u32 = 0x101;
}

/// [`CmdNo::InstantiateComponent`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InstantiateIn {
    pub domain: DomainId,
    pub priority: u32,
    pub template: Name,
    pub local_name: Name,
}

/// [`CmdNo::InstantiateComponent`] 的输出
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstantiateOut {
    pub component: ComponentHandle,
}

/// [`CmdNo::BindComponent`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BindIn {
    pub client: ComponentHandle,
    pub required_itf: Name,
    pub server: ComponentHandle,
    pub provided_itf: Name,
}

/// [`CmdNo::UnbindComponent`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UnbindIn {
    pub client: ComponentHandle,
    pub required_itf: Name,
}

/// [`CmdNo::DestroyComponent`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyIn {
    pub component: ComponentHandle,
}

/// [`CmdNo::BindComponentToHost`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BindToHostIn {
    /// 接收回调消息的通道
    pub channel: ChannelId,
    /// 发起调用的 DSP 组件
    pub component: ComponentHandle,
    /// DSP 组件的 required 接口名
    pub required_itf: Name,
    /// 回调消息的优先级
    pub priority: u32,
    /// 用户自定义的回调上下文，原样随消息返回
    pub context: u64,
}

/// [`CmdNo::BindComponentToHost`] 的输出
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindToHostOut {
    pub skeleton: SkeletonHandle,
}

/// [`CmdNo::UnbindComponentToHost`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnbindToHostIn {
    pub skeleton: SkeletonHandle,
}

/// [`CmdNo::UnbindComponentToHost`] 的输出
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnbindToHostOut {
    /// 绑定时登记的回调上下文
    pub context: u64,
}

/// [`CmdNo::AllocMemory`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocMemoryIn {
    pub core: CoreId,
    /// [`crate::MemoryKind`] 的原始编号
    pub kind: u32,
    pub size: u32,
    /// 对齐要求，必须是 2 的幂
    pub alignment: u32,
}

/// [`CmdNo::AllocMemory`] 的输出
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocMemoryOut {
    pub handle: MemHandle,
    pub physical: u64,
    pub kernel_logical: u64,
}

/// 以句柄指定内存区的输入（释放/描述）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemHandleIn {
    pub handle: MemHandle,
}

/// 以物理地址指定内存区的输入（预留/取消预留）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalIn {
    pub physical: u64,
}

/// [`CmdNo::DescribeMemory`] 的输出
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescribeMemoryOut {
    pub physical: u64,
    pub kernel_logical: u64,
    /// 用户态映射地址，未映射时为 0
    pub user_logical: u64,
    pub size: u32,
    pub kind: u32,
    pub core: CoreId,
    /// 当前映射引用计数
    pub map_count: u32,
}

/// [`CmdNo::GetMemoryStatus`] 的输出
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStatusOut {
    pub areas: u32,
    pub allocated_bytes: u64,
    pub mapped_bytes: u64,
}

/// [`CmdNo::CreateDomain`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateDomainIn {
    pub desc: DomainDesc,
}

/// 以编号指定内存域的输入（创建结果/销毁/查询）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainIn {
    pub domain: DomainId,
}

/// [`CmdNo::SetMode`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetModeIn {
    pub mode: u32,
    pub core: CoreId,
    pub param: i32,
}

/// [`CmdNo::ConfigureRelink`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureRelinkIn {
    /// [`crate::RelinkDirection`] 的原始编号
    pub direction: u32,
    pub memory_base: u64,
    pub peripheral_address: u64,
    pub segment_count: u32,
    pub segment_size: u32,
    pub start_slot: u32,
}

/// [`CmdNo::FlushChannel`] 的输入
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelIn {
    pub channel: ChannelId,
}

/// [`CmdNo::GetVersion`] 的输出
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionOut {
    /// 运行时 ABI 版本
    pub abi: u32,
    /// 引擎版本
    pub engine: u32,
}

/// 一条完整的命令请求
#[derive(Debug, Clone, Copy)]
pub enum Request {
    GetVersion,
    Instantiate(InstantiateIn),
    Bind(BindIn),
    Unbind(UnbindIn),
    Destroy(DestroyIn),
    BindToHost(BindToHostIn),
    UnbindToHost(UnbindToHostIn),
    AllocMemory(AllocMemoryIn),
    FreeMemory(MemHandleIn),
    ReserveMemory(PhysicalIn),
    CancelReservation(PhysicalIn),
    DescribeMemory(MemHandleIn),
    GetMemoryStatus,
    CreateDomain(CreateDomainIn),
    DestroyDomain(DomainIn),
    GetDomainState(DomainIn),
    SetMode(SetModeIn),
    ConfigureRelink(ConfigureRelinkIn),
    StopRelink,
    FlushChannel(ChannelIn),
}

impl Request {
    /// 请求对应的命令编号
    pub fn cmd_no(&self) -> CmdNo {
        match self {
            Request::GetVersion => CmdNo::GetVersion,
            Request::Instantiate(_) => CmdNo::InstantiateComponent,
            Request::Bind(_) => CmdNo::BindComponent,
            Request::Unbind(_) => CmdNo::UnbindComponent,
            Request::Destroy(_) => CmdNo::DestroyComponent,
            Request::BindToHost(_) => CmdNo::BindComponentToHost,
            Request::UnbindToHost(_) => CmdNo::UnbindComponentToHost,
            Request::AllocMemory(_) => CmdNo::AllocMemory,
            Request::FreeMemory(_) => CmdNo::FreeMemory,
            Request::ReserveMemory(_) => CmdNo::ReserveMemory,
            Request::CancelReservation(_) => CmdNo::CancelReservation,
            Request::DescribeMemory(_) => CmdNo::DescribeMemory,
            Request::GetMemoryStatus => CmdNo::GetMemoryStatus,
            Request::CreateDomain(_) => CmdNo::CreateDomain,
            Request::DestroyDomain(_) => CmdNo::DestroyDomain,
            Request::GetDomainState(_) => CmdNo::GetDomainState,
            Request::SetMode(_) => CmdNo::SetMode,
            Request::ConfigureRelink(_) => CmdNo::ConfigureRelink,
            Request::StopRelink => CmdNo::StopRelink,
            Request::FlushChannel(_) => CmdNo::FlushChannel,
        }
    }
}

/// 命令的输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// 命令没有输出结构体
    None,
    Version(VersionOut),
    Instantiate(InstantiateOut),
    BindToHost(BindToHostOut),
    UnbindToHost(UnbindToHostOut),
    AllocMemory(AllocMemoryOut),
    DescribeMemory(DescribeMemoryOut),
    MemoryStatus(MemoryStatusOut),
    Domain(DomainIn),
    DomainState(DomainState),
}
