//! DistQueue - GPU 命令队列与多帧同步核心
//!
//! 把每帧的 GPU 工作提交到图形、计算、拷贝三个硬件队列，并保证 CPU 复用帧资源时
//! 不会跑到 GPU 完成进度的前面。
//!
//! # 模块结构
//!
//! - `core`: 日志、配置、错误处理
//! - `gfx`: 设备后端抽象与软件参考设备
//! - `renderer`: Fence、命令队列与命令队列上下文
//!
//! # 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use dist_queue::core::config::SoftwareDeviceConfig;
//! use dist_queue::gfx::SoftwareDevice;
//! use dist_queue::renderer::{
//!     CommandEncoder, CommandQueueContext, ExecuteWorkRequest, HardwareQueueClass,
//! };
//!
//! # fn main() -> dist_queue::core::Result<()> {
//! let device = SoftwareDevice::new(&SoftwareDeviceConfig::default())?;
//! let mut context = CommandQueueContext::default();
//! context.init(Arc::new(device))?;
//!
//! for _ in 0..3 {
//!     context.begin()?;
//!     let mut encoder = CommandEncoder::new(HardwareQueueClass::Graphics, "Frame");
//!     encoder.begin()?;
//!     encoder.nop()?;
//!     let request = ExecuteWorkRequest::new(vec![encoder.finish()?]);
//!     context.execute_work(HardwareQueueClass::Graphics, request)?;
//!     context.end()?;
//! }
//!
//! context.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod gfx;
pub mod renderer;
