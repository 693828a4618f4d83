//! CPU 侧计时统计
//!
//! - `CpuTimingStatistics`：每个队列本帧提交命令列表的耗时，以及 present 的总耗时
//! - `FramePacingMetrics`：帧数与帧节流等待时间

use std::time::Duration;

/// 单个队列的提交耗时
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatistics {
    pub name: String,
    pub execute_duration: Duration,
}

/// 一帧的 CPU 计时统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuTimingStatistics {
    pub queue_statistics: Vec<QueueStatistics>,
    pub present_duration: Duration,
}

impl CpuTimingStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.queue_statistics.clear();
        self.present_duration = Duration::ZERO;
    }

    /// 所有队列的提交耗时之和
    pub fn total_execute_duration(&self) -> Duration {
        self.queue_statistics.iter().map(|q| q.execute_duration).sum()
    }
}

/// 帧节流统计
#[derive(Debug, Clone, Default)]
pub struct FramePacingMetrics {
    frames: u64,
    last_wait: Duration,
    total_wait: Duration,
}

impl FramePacingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一帧及其在帧节流等待中阻塞的时间
    pub fn record_frame(&mut self, wait: Duration) {
        self.frames += 1;
        self.last_wait = wait;
        self.total_wait += wait;
    }

    /// 已结束的帧数
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// 最近一帧的帧节流等待
    pub fn last_wait(&self) -> Duration {
        self.last_wait
    }

    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }
}
