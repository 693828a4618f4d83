//! 软件设备的 Fence
//!
//! 已完成值由 GPU 时间线线程（或 CPU signal）写入。等待者以 (阈值, 事件) 的形式挂起，
//! 写入新值时唤醒所有阈值已满足的等待者。

use std::sync::Arc;

use parking_lot::Mutex;

use super::device::DeviceShared;
use crate::gfx::backend::GpuFence;
use crate::renderer::sync::{FenceEvent, DEVICE_REMOVED_VALUE};

struct Waiter {
    threshold: u64,
    event: FenceEvent,
}

struct FenceInner {
    value: u64,
    waiters: Vec<Waiter>,
}

pub struct SoftwareFence {
    device: Arc<DeviceShared>,
    inner: Mutex<FenceInner>,
}

impl SoftwareFence {
    pub(crate) fn new(device: Arc<DeviceShared>, initial_value: u64) -> Self {
        Self {
            device,
            inner: Mutex::new(FenceInner {
                value: initial_value,
                waiters: Vec::new(),
            }),
        }
    }

    /// 尚未被唤醒的等待者数量
    pub fn pending_waiters(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// 设备移除时唤醒全部等待者
    pub(crate) fn wake_all(&self) {
        let waiters = std::mem::take(&mut self.inner.lock().waiters);
        for waiter in waiters {
            waiter.event.set();
        }
    }
}

impl GpuFence for SoftwareFence {
    fn completed_value(&self) -> u64 {
        if self.device.is_removed() {
            return DEVICE_REMOVED_VALUE;
        }
        self.inner.lock().value
    }

    fn signal(&self, value: u64) {
        let mut inner = self.inner.lock();
        inner.value = value;
        inner.waiters.retain(|w| {
            if w.threshold <= value {
                w.event.set();
                false
            } else {
                true
            }
        });
    }

    fn set_event_on_completion(&self, value: u64, event: &FenceEvent) {
        let mut inner = self.inner.lock();
        // 先检查移除标记再挂起，移除路径会在之后获取同一把锁
        if self.device.is_removed() || inner.value >= value {
            event.set();
            return;
        }
        inner.waiters.push(Waiter {
            threshold: value,
            event: event.clone(),
        });
    }
}
