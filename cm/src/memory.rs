//! 内存区登记
//!
//! 每个进程持有一个 [`AreaList`]，记录它通过引擎分配的 DSP 可见内存区。
//! 一个内存区有三个地址视图：物理地址、主机内核逻辑地址和用户态地址。
//!
//! # 预留/映射握手
//!
//! 分配和用户态映射发生在两个不同的特权上下文中，因此用户态映射分两步完成：
//!
//! ```text
//! Free --reserve(task)--> Reserved(task) --map(task)--> Mapped --unmap--> Unmapped
//!                              |
//!                              +--cancel(task)--> Free
//! ```
//!
//! 用户态视图只会被填充一次，`Unmapped` 是终态，之后不能再次映射。
//! 映射计数不为零时拒绝释放。

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use uapi::{CoreId, MemHandle, MemoryKind};

use crate::error::{CmError, CmResult};
use crate::platform::{ClientId, EngineOps, PowerResource, TaskId, UserMapper};
use crate::power::PowerDomains;

/// 向下对齐到 `align`（2 的幂）
#[inline]
pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// 向上对齐到 `align`（2 的幂）
#[inline]
pub const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// 用户态映射状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingState {
    /// 未预留
    Free,
    /// 已被某个任务预留，等待映射
    Reserved(TaskId),
    /// 用户态视图有效
    Mapped,
    /// 用户态视图已撤销，不能再映射
    Unmapped,
}

/// 一个 DSP 可见内存区
#[derive(Debug, Clone)]
pub struct MemoryArea {
    handle: MemHandle,
    core: CoreId,
    kind: MemoryKind,
    size: usize,
    physical: usize,
    kernel_logical: usize,
    user_logical: Option<usize>,
    state: MappingState,
    map_count: u32,
}

impl MemoryArea {
    /// 是否需要 ESRAM 电源
    fn holds_esram(&self) -> bool {
        self.kind.is_esram()
    }

    /// 物理地址所在页起始到区域末尾所在页结束的跨度
    fn page_span(&self, page_size: usize) -> usize {
        align_up(self.physical + self.size, page_size) - align_down(self.physical, page_size)
    }
}

/// 内存区的只读描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaInfo {
    /// 引擎句柄
    pub handle: MemHandle,
    /// 所属核
    pub core: CoreId,
    /// 内存种类
    pub kind: MemoryKind,
    /// 大小（字节）
    pub size: usize,
    /// 物理地址
    pub physical: usize,
    /// 主机内核逻辑地址
    pub kernel_logical: usize,
    /// 用户态地址
    pub user_logical: Option<usize>,
    /// 映射状态
    pub state: MappingState,
    /// 映射引用计数
    pub map_count: u32,
}

impl From<&MemoryArea> for AreaInfo {
    fn from(area: &MemoryArea) -> Self {
        Self {
            handle: area.handle,
            core: area.core,
            kind: area.kind,
            size: area.size,
            physical: area.physical,
            kernel_logical: area.kernel_logical,
            user_logical: area.user_logical,
            state: area.state,
            map_count: area.map_count,
        }
    }
}

/// 进程内存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// 内存区数量
    pub areas: usize,
    /// 已分配字节数
    pub allocated_bytes: usize,
    /// 当前映射到用户态的字节数
    pub mapped_bytes: usize,
}

/// 一个进程的内存区列表
///
/// 列表只在持有自身锁时修改。
#[derive(Default)]
pub struct AreaList {
    areas: Mutex<Vec<MemoryArea>>,
}

impl AreaList {
    /// 创建空列表
    pub fn new() -> Self {
        Self::default()
    }

    /// 内存区数量
    pub fn len(&self) -> usize {
        self.areas.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.areas.lock().is_empty()
    }

    /// 内存统计
    pub fn stats(&self) -> MemoryStats {
        let areas = self.areas.lock();
        areas.iter().fold(
            MemoryStats {
                areas: areas.len(),
                ..MemoryStats::default()
            },
            |mut stats, area| {
                stats.allocated_bytes += area.size;
                if area.state == MappingState::Mapped {
                    stats.mapped_bytes += area.size;
                }
                stats
            },
        )
    }

    /// 按句柄查询
    pub fn describe(&self, handle: MemHandle) -> CmResult<AreaInfo> {
        self.areas
            .lock()
            .iter()
            .find(|a| a.handle == handle)
            .map(AreaInfo::from)
            .ok_or(CmError::UnknownHandle)
    }

    /// 按物理地址查询
    pub fn find_physical(&self, physical: usize) -> Option<AreaInfo> {
        self.areas
            .lock()
            .iter()
            .find(|a| a.physical == physical)
            .map(AreaInfo::from)
    }
}

/// 内存区操作
///
/// 持有引擎、映射器和电源资源，作用于调用者给出的 [`AreaList`]。
pub struct MemoryRegistry {
    engine: Arc<dyn EngineOps>,
    mapper: Arc<dyn UserMapper>,
    power: Arc<PowerDomains>,
    page_size: usize,
}

impl MemoryRegistry {
    /// 创建内存区操作集合
    pub fn new(
        engine: Arc<dyn EngineOps>,
        mapper: Arc<dyn UserMapper>,
        power: Arc<PowerDomains>,
        page_size: usize,
    ) -> Self {
        Self {
            engine,
            mapper,
            power,
            page_size,
        }
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 分配一个内存区并登记到 `list`
    ///
    /// ESRAM 种类先获取 ESRAM 电源引用。引擎分配成功后的任何失败都会先释放
    /// 引擎句柄和电源引用再返回错误。
    pub fn allocate(
        &self,
        client: ClientId,
        list: &AreaList,
        core: CoreId,
        kind: MemoryKind,
        size: usize,
        alignment: usize,
    ) -> CmResult<MemHandle> {
        if size == 0 || (alignment != 0 && !alignment.is_power_of_two()) {
            return Err(CmError::InvalidParameter);
        }
        let alignment = alignment.max(1);

        if kind.is_esram() {
            self.power.acquire(PowerResource::Esram)?;
        }
        let release_power = || {
            if kind.is_esram() {
                self.power.release(PowerResource::Esram);
            }
        };

        let handle = match self.engine.alloc_memory(client, core, kind, size, alignment) {
            Ok(handle) => handle,
            Err(code) => {
                release_power();
                return Err(code.into());
            }
        };
        let addresses = match self.engine.memory_addresses(handle) {
            Ok(addresses) => addresses,
            Err(code) => {
                if let Err(free_err) = self.engine.free_memory(handle) {
                    warn!(
                        "cm: {}: leaking {:?} after address query failure ({})",
                        client, handle, free_err
                    );
                }
                release_power();
                return Err(code.into());
            }
        };

        list.areas.lock().push(MemoryArea {
            handle,
            core,
            kind,
            size,
            physical: addresses.physical,
            kernel_logical: addresses.kernel_logical,
            user_logical: None,
            state: MappingState::Free,
            map_count: 0,
        });
        debug!(
            "cm: {}: allocated {:?} {:?} {} bytes at {:#x}",
            client, handle, kind, size, addresses.physical
        );
        Ok(handle)
    }

    /// 释放内存区
    ///
    /// 映射计数不为零时返回 [`CmError::ResourceBusy`]。引擎释放失败时内存区保留。
    pub fn free(&self, client: ClientId, list: &AreaList, handle: MemHandle) -> CmResult<()> {
        let mut areas = list.areas.lock();
        let index = areas
            .iter()
            .position(|a| a.handle == handle)
            .ok_or(CmError::UnknownHandle)?;
        if areas[index].map_count > 0 {
            return Err(CmError::ResourceBusy);
        }
        self.engine.free_memory(handle)?;
        let area = areas.remove(index);
        drop(areas);

        if area.holds_esram() {
            self.power.release(PowerResource::Esram);
        }
        debug!("cm: {}: freed {:?}", client, handle);
        Ok(())
    }

    /// 为用户态映射预留物理地址为 `physical` 的内存区
    pub fn reserve(&self, list: &AreaList, physical: usize, task: TaskId) -> CmResult<()> {
        let mut areas = list.areas.lock();
        let area = areas
            .iter_mut()
            .find(|a| a.physical == physical)
            .ok_or(CmError::UnknownHandle)?;
        match area.state {
            MappingState::Free => {
                area.state = MappingState::Reserved(task);
                Ok(())
            }
            MappingState::Reserved(_) => Err(CmError::AlreadyReserved),
            MappingState::Mapped | MappingState::Unmapped => Err(CmError::AlreadyMapped),
        }
    }

    /// 取消 `task` 的预留
    pub fn cancel_reservation(
        &self,
        list: &AreaList,
        physical: usize,
        task: TaskId,
    ) -> CmResult<()> {
        let mut areas = list.areas.lock();
        let area = areas
            .iter_mut()
            .find(|a| a.physical == physical)
            .ok_or(CmError::UnknownHandle)?;
        match area.state {
            MappingState::Reserved(owner) if owner == task => {
                area.state = MappingState::Free;
                Ok(())
            }
            _ => Err(CmError::NotReserved),
        }
    }

    /// 建立用户态映射，返回用户态地址
    ///
    /// 要求该内存区已被同一个任务预留。映射器失败时预留保持不变。
    pub fn map(
        &self,
        client: ClientId,
        list: &AreaList,
        physical: usize,
        task: TaskId,
    ) -> CmResult<usize> {
        let mut areas = list.areas.lock();
        let area = areas
            .iter_mut()
            .find(|a| a.physical == physical)
            .ok_or(CmError::UnknownHandle)?;
        self.map_area(client, area, task)
    }

    /// 按页偏移建立用户态映射
    ///
    /// `page_offset` 必须等于某个内存区物理地址向下取整到页后的页号，
    /// `length` 不能超过该内存区覆盖的页跨度。
    pub fn map_offset(
        &self,
        client: ClientId,
        list: &AreaList,
        page_offset: usize,
        length: usize,
        task: TaskId,
    ) -> CmResult<usize> {
        let page_size = self.page_size;
        let mut areas = list.areas.lock();
        let mut candidates = areas
            .iter_mut()
            .filter(|a| align_down(a.physical, page_size) / page_size == page_offset)
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return Err(CmError::UnknownHandle);
        }
        // 同一页上可能有多个内存区，优先选调用者预留的那个
        let index = candidates
            .iter()
            .position(|a| a.state == MappingState::Reserved(task))
            .unwrap_or(0);
        let area = &mut *candidates[index];
        if length == 0 || length > area.page_span(page_size) {
            return Err(CmError::InvalidParameter);
        }
        self.map_area(client, area, task)
    }

    fn map_area(&self, client: ClientId, area: &mut MemoryArea, task: TaskId) -> CmResult<usize> {
        match area.state {
            MappingState::Mapped | MappingState::Unmapped => return Err(CmError::AlreadyMapped),
            MappingState::Reserved(owner) if owner == task => {}
            _ => return Err(CmError::NotReserved),
        }
        let user = self.mapper.map_user(client, area.physical, area.size)?;
        area.user_logical = Some(user);
        area.map_count += 1;
        area.state = MappingState::Mapped;
        debug!(
            "cm: {}: mapped {:?} at user {:#x}",
            client, area.handle, user
        );
        Ok(user)
    }

    /// 撤销一次用户态映射
    ///
    /// 计数降为零时撤销用户态视图，内存区进入 `Unmapped`。
    pub fn unmap(&self, client: ClientId, list: &AreaList, physical: usize) -> CmResult<u32> {
        let mut areas = list.areas.lock();
        let area = areas
            .iter_mut()
            .find(|a| a.physical == physical)
            .ok_or(CmError::UnknownHandle)?;
        if area.map_count == 0 {
            return Err(CmError::InvalidParameter);
        }
        area.map_count -= 1;
        if area.map_count == 0 {
            if let Some(user) = area.user_logical {
                self.mapper.unmap_user(client, user, area.size);
            }
            area.state = MappingState::Unmapped;
        }
        Ok(area.map_count)
    }

    /// 释放列表中的全部内存区（进程销毁时调用）
    ///
    /// 尽力而为：仍在映射的内存区先撤销映射，引擎错误只记录日志。
    pub fn free_all(&self, client: ClientId, list: &AreaList) {
        let areas = core::mem::take(&mut *list.areas.lock());
        for area in areas {
            if area.map_count > 0 {
                warn!(
                    "cm: {}: {:?} still mapped {} time(s) at teardown",
                    client, area.handle, area.map_count
                );
                if let Some(user) = area.user_logical {
                    self.mapper.unmap_user(client, user, area.size);
                }
            }
            if let Err(code) = self.engine.free_memory(area.handle) {
                warn!("cm: {}: leaking {:?} ({})", client, area.handle, code);
            }
            if area.holds_esram() {
                self.power.release(PowerResource::Esram);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::mock::{EngineOp, MockEngine, MockMapper, MockPower};

    const CLIENT: ClientId = ClientId(7);
    const T1: TaskId = TaskId(1);
    const T2: TaskId = TaskId(2);

    struct Fixture {
        engine: Arc<MockEngine>,
        mapper: Arc<MockMapper>,
        power: Arc<MockPower>,
        registry: MemoryRegistry,
        list: AreaList,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(MockEngine::new());
        let mapper = Arc::new(MockMapper::new());
        let power = Arc::new(MockPower::new());
        let domains = Arc::new(PowerDomains::new(power.clone()));
        let registry = MemoryRegistry::new(engine.clone(), mapper.clone(), domains, 4096);
        Fixture {
            engine,
            mapper,
            power,
            registry,
            list: AreaList::new(),
        }
    }

    fn alloc(f: &Fixture, kind: MemoryKind, size: usize) -> MemHandle {
        f.registry
            .allocate(CLIENT, &f.list, CoreId(0), kind, size, 4)
            .unwrap()
    }

    #[test]
    fn test_align_helpers() {
        assert_eq!(align_down(0x1234, 0x1000), 0x1000);
        assert_eq!(align_up(0x1234, 0x1000), 0x2000);
        assert_eq!(align_up(0x2000, 0x1000), 0x2000);
    }

    #[test]
    fn test_reserve_map_free_handshake() {
        let f = fixture();
        let handle = alloc(&f, MemoryKind::Code, 4096);
        let physical = f.list.describe(handle).unwrap().physical;

        f.registry.reserve(&f.list, physical, T1).unwrap();
        assert_eq!(
            f.registry.reserve(&f.list, physical, T2),
            Err(CmError::AlreadyReserved)
        );
        assert_eq!(
            f.registry.map(CLIENT, &f.list, physical, T2),
            Err(CmError::NotReserved)
        );
        f.registry.map(CLIENT, &f.list, physical, T1).unwrap();
        assert_eq!(f.list.describe(handle).unwrap().map_count, 1);

        assert_eq!(
            f.registry.free(CLIENT, &f.list, handle),
            Err(CmError::ResourceBusy)
        );
        assert_eq!(f.registry.unmap(CLIENT, &f.list, physical), Ok(0));
        f.registry.free(CLIENT, &f.list, handle).unwrap();
        assert!(f.list.is_empty());
        assert_eq!(f.mapper.live(), 0);
    }

    #[test]
    fn test_user_view_is_single_use() {
        let f = fixture();
        let handle = alloc(&f, MemoryKind::Data, 512);
        let physical = f.list.describe(handle).unwrap().physical;

        f.registry.reserve(&f.list, physical, T1).unwrap();
        f.registry.map(CLIENT, &f.list, physical, T1).unwrap();
        assert_eq!(
            f.registry.reserve(&f.list, physical, T1),
            Err(CmError::AlreadyMapped)
        );
        f.registry.unmap(CLIENT, &f.list, physical).unwrap();
        assert_eq!(
            f.registry.reserve(&f.list, physical, T1),
            Err(CmError::AlreadyMapped)
        );
        assert_eq!(
            f.list.describe(handle).unwrap().state,
            MappingState::Unmapped
        );
    }

    #[test]
    fn test_cancel_reservation_requires_owner() {
        let f = fixture();
        let handle = alloc(&f, MemoryKind::Data, 512);
        let physical = f.list.describe(handle).unwrap().physical;

        f.registry.reserve(&f.list, physical, T1).unwrap();
        assert_eq!(
            f.registry.cancel_reservation(&f.list, physical, T2),
            Err(CmError::NotReserved)
        );
        f.registry.cancel_reservation(&f.list, physical, T1).unwrap();
        f.registry.reserve(&f.list, physical, T2).unwrap();
    }

    #[test]
    fn test_failed_mapping_keeps_reservation() {
        let f = fixture();
        let handle = alloc(&f, MemoryKind::Code, 4096);
        let physical = f.list.describe(handle).unwrap().physical;
        f.registry.reserve(&f.list, physical, T1).unwrap();

        f.mapper.fail_next();
        assert!(f.registry.map(CLIENT, &f.list, physical, T1).is_err());
        assert_eq!(
            f.list.describe(handle).unwrap().state,
            MappingState::Reserved(T1)
        );
        f.registry.map(CLIENT, &f.list, physical, T1).unwrap();
    }

    #[test]
    fn test_map_offset_checks_page_and_length() {
        let f = fixture();
        let handle = alloc(&f, MemoryKind::Code, 4096);
        let physical = f.list.describe(handle).unwrap().physical;
        let page = physical / 4096;
        f.registry.reserve(&f.list, physical, T1).unwrap();

        assert_eq!(
            f.registry.map_offset(CLIENT, &f.list, page + 1, 4096, T1),
            Err(CmError::UnknownHandle)
        );
        assert_eq!(
            f.registry.map_offset(CLIENT, &f.list, page, 8192, T1),
            Err(CmError::InvalidParameter)
        );
        f.registry
            .map_offset(CLIENT, &f.list, page, 4096, T1)
            .unwrap();
    }

    #[test]
    fn test_address_failure_frees_engine_handle() {
        let f = fixture();
        f.engine.fail_next(EngineOp::MemoryAddresses);
        assert!(
            f.registry
                .allocate(CLIENT, &f.list, CoreId(0), MemoryKind::EsramData, 256, 4)
                .is_err()
        );
        assert_eq!(f.engine.live_areas(), 0);
        assert!(f.list.is_empty());
        assert!(!f.power.is_on(PowerResource::Esram));
    }

    #[test]
    fn test_esram_areas_hold_power() {
        let f = fixture();
        let a = alloc(&f, MemoryKind::EsramCode, 256);
        let b = alloc(&f, MemoryKind::EsramData, 256);
        assert!(f.power.is_on(PowerResource::Esram));
        f.registry.free(CLIENT, &f.list, a).unwrap();
        assert!(f.power.is_on(PowerResource::Esram));
        f.registry.free(CLIENT, &f.list, b).unwrap();
        assert!(!f.power.is_on(PowerResource::Esram));
    }

    #[test]
    fn test_free_all_unmaps_and_frees() {
        let f = fixture();
        let handle = alloc(&f, MemoryKind::Code, 4096);
        alloc(&f, MemoryKind::EsramData, 128);
        let physical = f.list.describe(handle).unwrap().physical;
        f.registry.reserve(&f.list, physical, T1).unwrap();
        f.registry.map(CLIENT, &f.list, physical, T1).unwrap();

        f.registry.free_all(CLIENT, &f.list);
        assert!(f.list.is_empty());
        assert_eq!(f.engine.live_areas(), 0);
        assert_eq!(f.mapper.live(), 0);
        assert!(!f.power.is_on(PowerResource::Esram));
    }

    #[test]
    fn test_stats() {
        let f = fixture();
        let handle = alloc(&f, MemoryKind::Code, 4096);
        alloc(&f, MemoryKind::Data, 100);
        let physical = f.list.describe(handle).unwrap().physical;
        f.registry.reserve(&f.list, physical, T1).unwrap();
        f.registry.map(CLIENT, &f.list, physical, T1).unwrap();

        assert_eq!(
            f.list.stats(),
            MemoryStats {
                areas: 2,
                allocated_bytes: 4196,
                mapped_bytes: 4096,
            }
        );
    }
}
