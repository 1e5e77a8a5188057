//! 运行时配置
//!
//! 默认值以常量给出，[`CmConfig`] 在创建 [`crate::CmContext`] 时传入。

use core::time::Duration;

/// 默认页大小
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// 默认 DSP 核数量
pub const DEFAULT_CORE_COUNT: u8 = 2;

/// 单个通道最多缓存的消息数
pub const DEFAULT_CHANNEL_QUEUE_LIMIT: usize = 256;

/// 异步事件队列容量（生产者写满后丢弃新事件）
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

/// 负载采样周期
pub const DEFAULT_GOVERNOR_PERIOD: Duration = Duration::from_millis(1000);

/// 负载高于该百分比时升到高档
pub const DEFAULT_HIGH_THRESHOLD: u32 = 85;

/// 负载低于该百分比时降到低档
pub const DEFAULT_LOW_THRESHOLD: u32 = 35;

/// 停止中继链路时等待硬件空闲的最大轮询次数
pub const DEFAULT_RELINK_STOP_SPINS: u32 = 100_000;

/// 运行时配置
#[derive(Debug, Clone)]
pub struct CmConfig {
    /// 页大小，映射偏移以页为单位
    pub page_size: usize,
    /// DSP 核数量，核编号必须小于该值
    pub core_count: u8,
    /// 单个通道最多缓存的消息数
    pub channel_queue_limit: usize,
    /// 异步事件队列容量
    pub event_queue_capacity: usize,
    /// 负载采样周期
    pub governor_period: Duration,
    /// 升档阈值（百分比，严格大于时升档）
    pub high_threshold: u32,
    /// 降档阈值（百分比，严格小于时降档）
    pub low_threshold: u32,
    /// 停止中继链路时的最大轮询次数
    pub relink_stop_spins: u32,
}

impl Default for CmConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            core_count: DEFAULT_CORE_COUNT,
            channel_queue_limit: DEFAULT_CHANNEL_QUEUE_LIMIT,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            governor_period: DEFAULT_GOVERNOR_PERIOD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            relink_stop_spins: DEFAULT_RELINK_STOP_SPINS,
        }
    }
}

impl CmConfig {
    /// 检查配置自身是否一致
    pub fn is_valid(&self) -> bool {
        self.page_size.is_power_of_two()
            && self.core_count > 0
            && self.channel_queue_limit > 0
            && self.event_queue_capacity > 0
            && !self.governor_period.is_zero()
            && self.low_threshold < self.high_threshold
            && self.high_threshold <= 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CmConfig::default().is_valid());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = CmConfig {
            low_threshold: 90,
            high_threshold: 80,
            ..CmConfig::default()
        };
        assert!(!config.is_valid());
    }
}
