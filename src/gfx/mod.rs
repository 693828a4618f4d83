//! 设备后端模块
//!
//! - `backend`：所有后端都要实现的能力接口
//! - `software`：CPU 上的软件参考设备，每个硬件队列一个 GPU 时间线线程
//!
//! 队列同步核心只通过 `GpuDevice` 等 trait 访问设备。

pub mod backend;
pub mod software;

pub use backend::{ClockCalibration, GpuDevice, GpuFence, GpuQueue, GpuSwapChain};
pub use software::SoftwareDevice;
