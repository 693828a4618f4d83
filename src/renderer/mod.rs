//! 队列同步核心
//!
//! 本模块实现多硬件队列的工作提交与多帧 Fence 同步，只依赖 `gfx::backend` 中的
//! 能力接口，从不引用具体的设备后端。
//!
//! # 模块组织
//!
//! - `command`：队列类别、命令列表与提交请求
//! - `sync`：`Fence`、`FenceSet`、`FenceEvent`
//! - `command_queue`：单个硬件队列的提交线程与计时
//! - `context`：帧环与 compiled fence，驱动每帧的 begin / execute / end
//! - `statistics`：CPU 计时统计与帧节流指标

pub mod command;
pub mod command_queue;
pub mod context;
pub mod statistics;
pub mod sync;

pub use command::{
    CommandEncoder, CommandList, CommandQueueDescriptor, ExecuteWorkRequest, GpuCommand,
    HardwareQueueClass, HardwareQueueSubclass, PerQueue,
};
pub use command_queue::CommandQueue;
pub use context::{CommandQueueContext, CommandQueueContextDescriptor, QueueThreadObserver};
pub use statistics::{CpuTimingStatistics, FramePacingMetrics, QueueStatistics};
pub use sync::{Fence, FenceEvent, FenceSet, FenceSignal, FenceState, FenceValueSet};
