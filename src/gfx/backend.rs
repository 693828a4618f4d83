//! 设备后端的统一抽象接口
//!
//! 本模块定义了所有设备后端都必须实现的能力接口。队列上下文只依赖这些 trait，
//! 从不直接引用具体的后端类型。
//!
//! # 接口划分
//!
//! - `GpuDevice`：创建 Fence、队列与交换链，报告设备移除
//! - `GpuFence`：GPU 可见的计数器
//! - `GpuQueue`：一个硬件队列的执行时间线
//! - `GpuSwapChain`：可 present 的交换链

use std::sync::Arc;
use std::time::Instant;

use crate::core::error::Result;
use crate::renderer::command::{CommandList, CommandQueueDescriptor};
use crate::renderer::sync::FenceEvent;

/// 设备接口
pub trait GpuDevice: Send + Sync {
    /// 后端名称，用于日志输出
    fn backend_name(&self) -> &str;

    /// 创建初始值为 `initial_value` 的 Fence
    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn GpuFence>>;

    /// 创建硬件队列
    fn create_queue(&self, descriptor: &CommandQueueDescriptor) -> Result<Arc<dyn GpuQueue>>;

    /// 创建交换链
    fn create_swap_chain(&self, name: &str) -> Result<Arc<dyn GpuSwapChain>>;

    /// 设备已被移除时返回原因
    fn removed_reason(&self) -> Option<String>;
}

/// GPU 可见的 Fence
///
/// 设备被移除后 `completed_value` 返回 [`crate::renderer::sync::DEVICE_REMOVED_VALUE`]，
/// 并且所有已注册的事件都会被置位。
pub trait GpuFence: Send + Sync {
    /// GPU 已完成的值
    fn completed_value(&self) -> u64;

    /// 从 CPU 侧写入新值
    fn signal(&self, value: u64);

    /// Fence 到达 `value` 时置位 `event`；已到达时立即置位
    fn set_event_on_completion(&self, value: u64, event: &FenceEvent);
}

/// 一个硬件队列的执行时间线
///
/// 所有方法都只是把操作排入队列，立即返回。同一队列上的操作按提交顺序执行。
pub trait GpuQueue: Send + Sync {
    /// 执行命令列表
    fn execute_command_lists(&self, command_lists: Vec<CommandList>) -> Result<()>;

    /// 在 GPU 上等待 `fence` 到达 `value` 后再执行后续操作
    fn wait(&self, fence: &Arc<dyn GpuFence>, value: u64) -> Result<()>;

    /// 前面的操作全部完成后，将 `fence` 写为 `value`
    fn signal(&self, fence: &Arc<dyn GpuFence>, value: u64) -> Result<()>;

    /// 时间戳频率（ticks / 秒）
    fn timestamp_frequency(&self) -> u64;

    /// 同时采样 GPU 时间戳与 CPU 时间
    fn clock_calibration(&self) -> Result<ClockCalibration>;
}

/// 交换链
pub trait GpuSwapChain: Send + Sync {
    fn name(&self) -> &str;

    /// 呈现当前图像，可能阻塞（例如垂直同步）
    fn present(&self) -> Result<()>;
}

/// 一对同时采样的 GPU / CPU 时间戳
#[derive(Debug, Clone, Copy)]
pub struct ClockCalibration {
    /// GPU 时间戳（ticks）
    pub gpu_timestamp: u64,
    /// 同一时刻的 CPU 时间
    pub cpu_timestamp: Instant,
}
