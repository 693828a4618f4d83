use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::device::DeviceShared;
use crate::core::error::Result;
use crate::gfx::backend::GpuSwapChain;

/// 软件交换链，present 占用固定的 CPU 时间
pub struct SoftwareSwapChain {
    name: String,
    device: Arc<DeviceShared>,
    present_count: AtomicU64,
}

impl SoftwareSwapChain {
    pub(crate) fn new(name: &str, device: Arc<DeviceShared>) -> Self {
        Self {
            name: name.to_string(),
            device,
            present_count: AtomicU64::new(0),
        }
    }

    /// 已成功 present 的帧数
    pub fn presented_frames(&self) -> u64 {
        self.present_count.load(Ordering::Acquire)
    }
}

impl GpuSwapChain for SoftwareSwapChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn present(&self) -> Result<()> {
        if !self.device.busy(self.device.present_cost) {
            return Err(self.device.device_lost_error().into());
        }
        let count = self.present_count.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(swap_chain = %self.name, count, "Presented");
        Ok(())
    }
}
