//! DMA 中继硬件接口
//!
//! 描述符表由若干槽位组成，每个槽位存放一条 [`DescriptorRecord`]；
//! 链路的源端和目的端各有一个控制寄存器，指向当前运行的槽位。

use bitflags::bitflags;

bitflags! {
    /// 描述符记录中的控制位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LinkControl: u32 {
        /// 每传输一个元素地址递增
        const ADDR_INCREMENT = 1 << 0;
        /// 由外设请求线控制流量
        const PERIPH_FLOW = 1 << 1;
        /// 使用内存侧主端口
        const MEMORY_PORT = 1 << 2;
        /// 记录传输完成时产生中断
        const TERMINAL_IRQ = 1 << 3;
        /// `next_slot` 有效
        const LINK_VALID = 1 << 4;
        /// 元素宽度为 32 位
        const ELEMENT_32 = 1 << 5;
    }
}

/// 描述符表中的一条记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRecord {
    /// 本端地址
    pub address: u64,
    /// 元素个数
    pub element_count: u32,
    /// 控制位
    pub control: LinkControl,
    /// 下一条同端记录所在槽位
    pub next_slot: u32,
}

/// 链路的一端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEnd {
    /// 源端
    Source,
    /// 目的端
    Destination,
}

/// DMA 中继硬件接口
pub trait RelinkRegisters: Send + Sync {
    /// 描述符表的槽位数
    fn table_capacity(&self) -> usize;

    /// 写入一个描述符槽位
    fn write_record(&self, slot: usize, record: DescriptorRecord);

    /// 让链路的一端从 `slot` 开始运行
    fn set_link(&self, end: LinkEnd, slot: usize);

    /// 清除链路一端的控制寄存器
    fn clear_link(&self, end: LinkEnd);

    /// 硬件是否报告链路仍在运行
    fn link_active(&self) -> bool;
}
