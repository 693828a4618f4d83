//! 软件参考后端
//!
//! 不依赖任何图形 API，在 CPU 线程上模拟硬件队列的执行时间线。

mod device;
mod fence;
mod queue;
mod swap_chain;

pub use device::{SoftwareDevice, TraceEntry};
pub use fence::SoftwareFence;
pub use queue::SoftwareQueue;
pub use swap_chain::SoftwareSwapChain;
