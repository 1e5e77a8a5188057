//! DMA 中继寄存器的 Mock 实现
//!
//! 设置链路后硬件视为运行中；两端都清除后在 `drain_polls` 次轮询内变为空闲。
//! 设为卡死时永远报告运行中。

use hal::{DescriptorRecord, LinkEnd, RelinkRegisters};
use parking_lot::Mutex;

struct State {
    table: Vec<Option<DescriptorRecord>>,
    links: [Option<usize>; 2],
    drain_polls: u32,
    remaining_polls: u32,
    stuck: bool,
    writes: usize,
}

/// Mock 中继寄存器
pub struct MockRelinkRegisters {
    state: Mutex<State>,
}

fn end_index(end: LinkEnd) -> usize {
    match end {
        LinkEnd::Source => 0,
        LinkEnd::Destination => 1,
    }
}

impl MockRelinkRegisters {
    /// 创建有 `capacity` 个槽位的描述符表
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                table: vec![None; capacity],
                links: [None; 2],
                drain_polls: 0,
                remaining_polls: 0,
                stuck: false,
                writes: 0,
            }),
        }
    }

    /// 读取一个槽位
    pub fn record(&self, slot: usize) -> Option<DescriptorRecord> {
        self.state.lock().table.get(slot).copied().flatten()
    }

    /// 链路一端当前指向的槽位
    pub fn link(&self, end: LinkEnd) -> Option<usize> {
        self.state.lock().links[end_index(end)]
    }

    /// 写入次数
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }

    /// 清除链路后还需要多少次轮询才空闲
    pub fn set_drain_polls(&self, polls: u32) {
        self.state.lock().drain_polls = polls;
    }

    /// 让硬件永远报告运行中
    pub fn set_stuck(&self, stuck: bool) {
        self.state.lock().stuck = stuck;
    }
}

impl RelinkRegisters for MockRelinkRegisters {
    fn table_capacity(&self) -> usize {
        self.state.lock().table.len()
    }

    fn write_record(&self, slot: usize, record: DescriptorRecord) {
        let mut state = self.state.lock();
        state.table[slot] = Some(record);
        state.writes += 1;
    }

    fn set_link(&self, end: LinkEnd, slot: usize) {
        let mut state = self.state.lock();
        state.links[end_index(end)] = Some(slot);
        state.remaining_polls = state.drain_polls;
    }

    fn clear_link(&self, end: LinkEnd) {
        self.state.lock().links[end_index(end)] = None;
    }

    fn link_active(&self) -> bool {
        let mut state = self.state.lock();
        if state.stuck || state.links.iter().any(Option::is_some) {
            return true;
        }
        if state.remaining_polls > 0 {
            state.remaining_polls -= 1;
            return true;
        }
        false
    }
}
