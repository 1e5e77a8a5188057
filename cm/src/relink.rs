//! DMA 中继描述符构建
//!
//! 为外设与内存之间的连续流式传输构建循环描述符链表（relink ring）。
//!
//! # 描述符布局
//!
//! 每个分段占用两个相邻槽位：源端记录和目的端记录。第 `i` 个分段位于
//! `start_slot + 2*i`（源）和 `start_slot + 2*i + 1`（目的），
//! 两条记录的 `next_slot` 指向下一个分段的对应槽位；最后一个分段回指
//! `start_slot`，从而形成环。
//!
//! 两个方向的控制位模板互为镜像：内存一侧地址递增，外设一侧由外设请求线
//! 控制流量且地址固定。分段结束中断总是挂在目的端记录上。

use std::hint;
use std::sync::Arc;

use log::{debug, warn};
use uapi::RelinkDirection;

use crate::error::{CmError, CmResult};
use crate::platform::{DescriptorRecord, LinkControl, LinkEnd, RelinkRegisters};

/// 每个元素的字节数（32 位传输）
pub const ELEMENT_BYTES: usize = 4;

/// 单条记录可描述的最大元素数
pub const MAX_ELEMENTS: usize = 0xffff;

const MEMORY_SIDE: LinkControl = LinkControl::ADDR_INCREMENT
    .union(LinkControl::MEMORY_PORT)
    .union(LinkControl::ELEMENT_32)
    .union(LinkControl::LINK_VALID);

const PERIPH_SIDE: LinkControl = LinkControl::PERIPH_FLOW
    .union(LinkControl::ELEMENT_32)
    .union(LinkControl::LINK_VALID);

/// 已配置的循环链路参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelinkRing {
    /// 传输方向
    pub direction: RelinkDirection,
    /// 内存缓冲区起始地址
    pub memory_base: u64,
    /// 外设数据寄存器地址
    pub peripheral_address: u64,
    /// 分段数
    pub segment_count: usize,
    /// 每段字节数
    pub segment_size: usize,
    /// 第一个分段的源端槽位
    pub start_slot: usize,
}

impl RelinkRing {
    /// 第 `index` 个分段的 (源, 目的) 记录
    fn segment_records(&self, index: usize) -> (DescriptorRecord, DescriptorRecord) {
        let slot = self.start_slot + 2 * index;
        let next = if index + 1 < self.segment_count {
            slot + 2
        } else {
            self.start_slot
        };
        let memory = self.memory_base + (index * self.segment_size) as u64;
        let element_count = (self.segment_size / ELEMENT_BYTES) as u32;

        let (src_addr, src_ctrl, dst_addr, dst_ctrl) = match self.direction {
            RelinkDirection::MemToPeriph => (
                memory,
                MEMORY_SIDE,
                self.peripheral_address,
                PERIPH_SIDE | LinkControl::TERMINAL_IRQ,
            ),
            RelinkDirection::PeriphToMem => (
                self.peripheral_address,
                PERIPH_SIDE,
                memory,
                MEMORY_SIDE | LinkControl::TERMINAL_IRQ,
            ),
        };

        (
            DescriptorRecord {
                address: src_addr,
                element_count,
                control: src_ctrl,
                next_slot: next as u32,
            },
            DescriptorRecord {
                address: dst_addr,
                element_count,
                control: dst_ctrl,
                next_slot: (next + 1) as u32,
            },
        )
    }
}

/// 中继链路构建器
pub struct RelinkBuilder {
    regs: Arc<dyn RelinkRegisters>,
    stop_spins: u32,
    ring: Option<RelinkRing>,
}

impl RelinkBuilder {
    /// 创建构建器，`stop_spins` 为停止时轮询硬件的上限
    pub fn new(regs: Arc<dyn RelinkRegisters>, stop_spins: u32) -> Self {
        Self {
            regs,
            stop_spins,
            ring: None,
        }
    }

    /// 是否已有链路在配置中
    pub fn is_configured(&self) -> bool {
        self.ring.is_some()
    }

    /// 当前配置的链路
    pub fn configured_ring(&self) -> Option<RelinkRing> {
        self.ring
    }

    /// 配置并启动循环链路
    ///
    /// 已有链路时返回 [`CmError::ResourceBusy`]，需要先 [`stop`](Self::stop)。
    pub fn configure_cyclic(
        &mut self,
        direction: RelinkDirection,
        memory_base: u64,
        peripheral_address: u64,
        segment_count: usize,
        segment_size: usize,
        start_slot: usize,
    ) -> CmResult<()> {
        if self.ring.is_some() {
            return Err(CmError::ResourceBusy);
        }
        if segment_count == 0
            || segment_size == 0
            || segment_size % ELEMENT_BYTES != 0
            || segment_size / ELEMENT_BYTES > MAX_ELEMENTS
            || memory_base % ELEMENT_BYTES as u64 != 0
            || peripheral_address % ELEMENT_BYTES as u64 != 0
        {
            return Err(CmError::InvalidParameter);
        }
        let slots = segment_count
            .checked_mul(2)
            .and_then(|n| n.checked_add(start_slot))
            .ok_or(CmError::InvalidParameter)?;
        if slots > self.regs.table_capacity() {
            return Err(CmError::InvalidParameter);
        }
        let span = (segment_count as u64)
            .checked_mul(segment_size as u64)
            .and_then(|n| n.checked_add(memory_base));
        if span.is_none() {
            return Err(CmError::InvalidParameter);
        }

        let ring = RelinkRing {
            direction,
            memory_base,
            peripheral_address,
            segment_count,
            segment_size,
            start_slot,
        };
        for index in 0..segment_count {
            let (src, dst) = ring.segment_records(index);
            let slot = start_slot + 2 * index;
            self.regs.write_record(slot, src);
            self.regs.write_record(slot + 1, dst);
        }
        self.regs.set_link(LinkEnd::Source, start_slot);
        self.regs.set_link(LinkEnd::Destination, start_slot + 1);
        debug!(
            "relink: {:?} ring of {} x {} bytes at slot {}",
            direction, segment_count, segment_size, start_slot
        );
        self.ring = Some(ring);
        Ok(())
    }

    /// 停止链路
    ///
    /// 未配置链路时直接返回成功。否则清除两端的链路控制寄存器并等待硬件
    /// 报告空闲；超过轮询上限返回 [`CmError::Timeout`]，此时链路仍视为已配置，
    /// 可以再次调用本函数。
    pub fn stop(&mut self) -> CmResult<()> {
        let Some(ring) = self.ring else {
            return Ok(());
        };
        if self.regs.link_active() {
            warn!(
                "relink: link still running at stop (slot {}), forcing it down",
                ring.start_slot
            );
        }
        self.regs.clear_link(LinkEnd::Source);
        self.regs.clear_link(LinkEnd::Destination);

        let mut spins = 0;
        while self.regs.link_active() {
            if spins >= self.stop_spins {
                return Err(CmError::Timeout);
            }
            spins += 1;
            hint::spin_loop();
        }
        self.ring = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use sync::SpinLock;

    struct FakeRegs {
        table: SpinLock<Vec<Option<DescriptorRecord>>>,
        running: AtomicBool,
        /// 清除后还需多少次轮询才变为空闲，`u32::MAX` 表示永不空闲
        drain_polls: AtomicU32,
        clears: AtomicU32,
    }

    impl FakeRegs {
        fn new(capacity: usize) -> Arc<Self> {
            Arc::new(Self {
                table: SpinLock::new(vec![None; capacity]),
                running: AtomicBool::new(false),
                drain_polls: AtomicU32::new(0),
                clears: AtomicU32::new(0),
            })
        }

        fn record(&self, slot: usize) -> DescriptorRecord {
            self.table.lock()[slot].unwrap()
        }
    }

    impl RelinkRegisters for FakeRegs {
        fn table_capacity(&self) -> usize {
            self.table.lock().len()
        }

        fn write_record(&self, slot: usize, record: DescriptorRecord) {
            self.table.lock()[slot] = Some(record);
        }

        fn set_link(&self, _end: LinkEnd, _slot: usize) {
            self.running.store(true, Ordering::SeqCst);
        }

        fn clear_link(&self, _end: LinkEnd) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }

        fn link_active(&self) -> bool {
            if !self.running.load(Ordering::SeqCst) {
                return false;
            }
            if self.clears.load(Ordering::SeqCst) < 2 {
                return true;
            }
            match self.drain_polls.load(Ordering::SeqCst) {
                0 => {
                    self.running.store(false, Ordering::SeqCst);
                    false
                }
                u32::MAX => true,
                n => {
                    self.drain_polls.store(n - 1, Ordering::SeqCst);
                    true
                }
            }
        }
    }

    #[test]
    fn test_stop_without_ring_is_noop() {
        let regs = FakeRegs::new(16);
        let mut builder = RelinkBuilder::new(regs.clone(), 10);
        assert_eq!(builder.stop(), Ok(()));
        assert_eq!(builder.stop(), Ok(()));
        assert_eq!(regs.clears.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ring_links_back_to_start() {
        let regs = FakeRegs::new(32);
        let mut builder = RelinkBuilder::new(regs.clone(), 10);
        builder
            .configure_cyclic(RelinkDirection::MemToPeriph, 0x8000, 0x4000_0010, 3, 256, 4)
            .unwrap();

        assert_eq!(regs.record(4).next_slot, 6);
        assert_eq!(regs.record(5).next_slot, 7);
        assert_eq!(regs.record(8).next_slot, 4);
        assert_eq!(regs.record(9).next_slot, 5);
        assert_eq!(regs.record(6).address, 0x8100);
        assert_eq!(regs.record(7).address, 0x4000_0010);
        assert_eq!(regs.record(4).element_count, 64);
    }

    #[test]
    fn test_directions_swap_templates() {
        let regs = FakeRegs::new(8);
        let mut builder = RelinkBuilder::new(regs.clone(), 10);
        builder
            .configure_cyclic(RelinkDirection::MemToPeriph, 0x1000, 0x2000, 1, 64, 0)
            .unwrap();
        let (m2p_src, m2p_dst) = (regs.record(0), regs.record(1));
        builder.stop().unwrap();

        builder
            .configure_cyclic(RelinkDirection::PeriphToMem, 0x1000, 0x2000, 1, 64, 0)
            .unwrap();
        let (p2m_src, p2m_dst) = (regs.record(0), regs.record(1));

        assert!(m2p_src.control.contains(LinkControl::ADDR_INCREMENT));
        assert!(m2p_dst.control.contains(LinkControl::PERIPH_FLOW));
        assert!(p2m_src.control.contains(LinkControl::PERIPH_FLOW));
        assert!(p2m_dst.control.contains(LinkControl::ADDR_INCREMENT));
        assert_eq!(m2p_src.address, p2m_dst.address);
        assert_eq!(m2p_dst.address, p2m_src.address);
        assert!(m2p_dst.control.contains(LinkControl::TERMINAL_IRQ));
        assert!(p2m_dst.control.contains(LinkControl::TERMINAL_IRQ));
    }

    #[test]
    fn test_configure_rejects_bad_parameters() {
        let regs = FakeRegs::new(8);
        let mut builder = RelinkBuilder::new(regs, 10);
        let dir = RelinkDirection::MemToPeriph;
        assert_eq!(
            builder.configure_cyclic(dir, 0x1000, 0x2000, 0, 64, 0),
            Err(CmError::InvalidParameter)
        );
        assert_eq!(
            builder.configure_cyclic(dir, 0x1000, 0x2000, 2, 66, 0),
            Err(CmError::InvalidParameter)
        );
        // 5 个分段需要 10 个槽位
        assert_eq!(
            builder.configure_cyclic(dir, 0x1000, 0x2000, 5, 64, 0),
            Err(CmError::InvalidParameter)
        );
        assert!(!builder.is_configured());
    }

    #[test]
    fn test_configure_twice_is_busy() {
        let regs = FakeRegs::new(8);
        let mut builder = RelinkBuilder::new(regs, 10);
        let dir = RelinkDirection::PeriphToMem;
        builder.configure_cyclic(dir, 0x1000, 0x2000, 2, 64, 0).unwrap();
        assert_eq!(
            builder.configure_cyclic(dir, 0x1000, 0x2000, 2, 64, 0),
            Err(CmError::ResourceBusy)
        );
    }

    #[test]
    fn test_stop_waits_for_idle() {
        let regs = FakeRegs::new(8);
        regs.drain_polls.store(3, Ordering::SeqCst);
        let mut builder = RelinkBuilder::new(regs.clone(), 10);
        builder
            .configure_cyclic(RelinkDirection::MemToPeriph, 0x1000, 0x2000, 2, 64, 0)
            .unwrap();
        assert_eq!(builder.stop(), Ok(()));
        assert!(!builder.is_configured());
        assert_eq!(regs.clears.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stop_timeout_keeps_ring() {
        let regs = FakeRegs::new(8);
        regs.drain_polls.store(u32::MAX, Ordering::SeqCst);
        let mut builder = RelinkBuilder::new(regs, 5);
        builder
            .configure_cyclic(RelinkDirection::MemToPeriph, 0x1000, 0x2000, 2, 64, 0)
            .unwrap();
        assert_eq!(builder.stop(), Err(CmError::Timeout));
        assert!(builder.is_configured());
    }
}
