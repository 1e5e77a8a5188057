//! 跨越客户端边界的基础类型

/// DSP 核编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CoreId(pub u8);

/// 引擎分配的组件句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ComponentHandle(pub u32);

/// 引擎分配的内存域编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DomainId(pub u32);

/// 引擎分配的内存区句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct MemHandle(pub u32);

/// DSP 侧回调句柄，对应一个 skeleton 绑定
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SkeletonHandle(pub u64);

/// 消息通道编号
///
/// 按打开顺序单调递增，编号越小的通道越早打开。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ChannelId(pub u64);

/// DSP 可见内存的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum MemoryKind {
    /// DSP 内部 X 存储（24 位字）
    InternalX = 0,
    /// DSP 内部 Y 存储（24 位字）
    InternalY = 1,
    /// 外部 SDRAM 代码段
    Code = 2,
    /// 外部 SDRAM 数据段
    Data = 3,
    /// 片上 ESRAM 代码段
    EsramCode = 4,
    /// 片上 ESRAM 数据段
    EsramData = 5,
}

impl MemoryKind {
    /// 从原始编号解析
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => MemoryKind::InternalX,
            1 => MemoryKind::InternalY,
            2 => MemoryKind::Code,
            3 => MemoryKind::Data,
            4 => MemoryKind::EsramCode,
            5 => MemoryKind::EsramData,
            _ => return None,
        })
    }

    /// 该种类是否位于 ESRAM（需要 ESRAM 电源域保持上电）
    pub fn is_esram(self) -> bool {
        matches!(self, MemoryKind::EsramCode | MemoryKind::EsramData)
    }
}

/// 组件/回调优先级
///
/// 数值越大越先被读出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum Priority {
    /// 后台
    Background = 0,
    /// 普通
    Normal = 1,
    /// 紧急
    Urgent = 2,
}

impl Priority {
    /// 优先级档数
    pub const LEVELS: usize = 3;

    /// 从原始编号解析
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Priority::Background,
            1 => Priority::Normal,
            2 => Priority::Urgent,
            _ => return None,
        })
    }

    /// 作为队列下标使用
    pub fn index(self) -> usize {
        self as usize
    }
}

/// 内存域中的一段区域（相对所属内存的偏移和大小）
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    /// 起始偏移，单位为字节
    pub offset: u32,
    /// 大小，单位为字节
    pub size: u32,
}

/// 内存域描述
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainDesc {
    /// 内存域所属的 DSP 核
    pub core: CoreId,
    /// SDRAM 代码区
    pub sdram_code: Region,
    /// SDRAM 数据区
    pub sdram_data: Region,
    /// ESRAM 代码区
    pub esram_code: Region,
    /// ESRAM 数据区
    pub esram_data: Region,
}

impl DomainDesc {
    /// 内存域是否使用 ESRAM
    pub fn uses_esram(&self) -> bool {
        self.esram_code.size != 0 || self.esram_data.size != 0
    }
}

/// 内存域状态
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainState {
    /// 内存域所属的 DSP 核
    pub core: CoreId,
    /// 引用该内存域的组件数量
    pub components: u32,
}

/// DMA 中继链路的传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RelinkDirection {
    /// 内存 → 外设
    MemToPeriph = 0,
    /// 外设 → 内存
    PeriphToMem = 1,
}

impl RelinkDirection {
    /// 从原始编号解析
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(RelinkDirection::MemToPeriph),
            1 => Some(RelinkDirection::PeriphToMem),
            _ => None,
        }
    }
}

/// 性能档位请求
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum PerfLevel {
    /// 不再投票（释放请求）
    Released = 0,
    /// 低档（约 50% 运行点）
    Low = 1,
    /// 高档（100% 运行点）
    High = 2,
}

impl PerfLevel {
    /// 从原始编号解析
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(PerfLevel::Released),
            1 => Some(PerfLevel::Low),
            2 => Some(PerfLevel::High),
            _ => None,
        }
    }
}
