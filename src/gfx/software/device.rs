//! 软件参考设备
//!
//! 在 CPU 上模拟一块带有多个独立硬件队列的 GPU：
//! - 每个硬件队列一个 GPU 时间线线程，按提交顺序执行命令
//! - Fence 写入与事件唤醒和真实驱动的语义一致
//! - 记录每条命令在时间线上的开始 / 结束时间，便于验证执行顺序（只保留最近的若干条）
//! - 支持注入设备移除，用于验证致命错误路径

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use super::fence::SoftwareFence;
use super::queue::SoftwareQueue;
use super::swap_chain::SoftwareSwapChain;
use crate::core::config::SoftwareDeviceConfig;
use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{GpuDevice, GpuFence, GpuQueue, GpuSwapChain};
use crate::renderer::command::{CommandQueueDescriptor, HardwareQueueClass};

/// GPU 时间线上的一条执行记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub queue_class: HardwareQueueClass,
    pub label: String,
    pub begin: Instant,
    pub end: Instant,
}

/// 设备内部共享状态，被队列、Fence 和交换链共同持有
pub(crate) struct DeviceShared {
    epoch: Instant,
    timestamp_frequency: u64,
    clock_drift_ppm: f64,
    pub(crate) present_cost: Duration,
    fence_limit: Option<usize>,
    fence_count: AtomicUsize,
    removed_flag: AtomicBool,
    removed: Mutex<Option<String>>,
    removed_cv: Condvar,
    fences: Mutex<Vec<Weak<SoftwareFence>>>,
    trace_capacity: usize,
    trace: Mutex<VecDeque<TraceEntry>>,
}

impl DeviceShared {
    pub(crate) fn is_removed(&self) -> bool {
        self.removed_flag.load(Ordering::Acquire)
    }

    pub(crate) fn removed_reason(&self) -> Option<String> {
        self.removed.lock().clone()
    }

    fn remove(&self, reason: &str) {
        {
            let mut removed = self.removed.lock();
            if removed.is_some() {
                return;
            }
            *removed = Some(reason.to_string());
            self.removed_flag.store(true, Ordering::Release);
            self.removed_cv.notify_all();
        }

        // 唤醒所有等待中的 Fence 事件
        for fence in self.live_fences() {
            fence.wake_all();
        }
    }

    /// 占用时间线 `duration`，设备被移除时提前返回 `false`
    pub(crate) fn busy(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_removed();
        }
        let deadline = Instant::now() + duration;
        let mut removed = self.removed.lock();
        while removed.is_none() {
            if self.removed_cv.wait_until(&mut removed, deadline).timed_out() {
                return removed.is_none();
            }
        }
        false
    }

    /// `at` 时刻对应的 GPU 时间戳（包含时钟漂移）
    pub(crate) fn gpu_timestamp(&self, at: Instant) -> u64 {
        let elapsed = at.saturating_duration_since(self.epoch).as_secs_f64();
        let rate = self.timestamp_frequency as f64 * (1.0 + self.clock_drift_ppm * 1e-6);
        (elapsed * rate) as u64
    }

    pub(crate) fn timestamp_frequency(&self) -> u64 {
        self.timestamp_frequency
    }

    pub(crate) fn record(&self, entry: TraceEntry) {
        if self.trace_capacity == 0 {
            return;
        }
        let mut trace = self.trace.lock();
        if trace.len() == self.trace_capacity {
            trace.pop_front();
        }
        trace.push_back(entry);
    }

    fn live_fences(&self) -> Vec<Arc<SoftwareFence>> {
        let mut fences = self.fences.lock();
        fences.retain(|f| f.strong_count() > 0);
        fences.iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn device_lost_error(&self) -> GraphicsError {
        GraphicsError::DeviceLost {
            queue_class: None,
            fence_value: 0,
            reason: self.removed_reason().unwrap_or_else(|| "device removed".to_string()),
        }
    }
}

/// 软件参考设备
#[derive(Clone)]
pub struct SoftwareDevice {
    shared: Arc<DeviceShared>,
}

impl SoftwareDevice {
    /// 创建软件设备
    pub fn new(config: &SoftwareDeviceConfig) -> Result<Self> {
        if config.timestamp_frequency == 0 {
            return Err(GraphicsError::DeviceCreation(
                "timestamp frequency must be greater than 0".to_string(),
            )
            .into());
        }

        info!(
            timestamp_frequency = config.timestamp_frequency,
            clock_drift_ppm = config.clock_drift_ppm,
            "Software device created"
        );

        Ok(Self {
            shared: Arc::new(DeviceShared {
                epoch: Instant::now(),
                timestamp_frequency: config.timestamp_frequency,
                clock_drift_ppm: config.clock_drift_ppm,
                present_cost: Duration::from_micros(config.present_cost_us),
                fence_limit: config.fence_limit,
                fence_count: AtomicUsize::new(0),
                removed_flag: AtomicBool::new(false),
                removed: Mutex::new(None),
                removed_cv: Condvar::new(),
                fences: Mutex::new(Vec::new()),
                trace_capacity: config.trace_capacity,
                trace: Mutex::new(VecDeque::new()),
            }),
        })
    }

    /// 模拟设备移除（TDR / 驱动崩溃）
    pub fn remove_device(&self, reason: &str) {
        crate::rhi_error!(reason, "Software device removed");
        self.shared.remove(reason);
    }

    /// 时间线执行记录的快照
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.shared.trace.lock().iter().cloned().collect()
    }

    /// 按标签查找第一条执行记录
    pub fn find_trace(&self, label: &str) -> Option<TraceEntry> {
        self.shared.trace.lock().iter().find(|e| e.label == label).cloned()
    }

    pub fn clear_trace(&self) {
        self.shared.trace.lock().clear();
    }

    /// 已创建的 Fence 数量
    pub fn fence_count(&self) -> usize {
        self.shared.fence_count.load(Ordering::Acquire)
    }

    /// 所有存活 Fence 上挂起的事件等待者总数
    pub fn pending_waiters(&self) -> usize {
        self.shared
            .live_fences()
            .iter()
            .map(|f| f.pending_waiters())
            .sum()
    }

    /// 创建可查询 present 次数的交换链
    pub fn create_software_swap_chain(&self, name: &str) -> Arc<SoftwareSwapChain> {
        Arc::new(SoftwareSwapChain::new(name, Arc::clone(&self.shared)))
    }
}

impl GpuDevice for SoftwareDevice {
    fn backend_name(&self) -> &str {
        "Software"
    }

    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn GpuFence>> {
        let count = self.shared.fence_count.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(limit) = self.shared.fence_limit {
            if count > limit {
                self.shared.fence_count.fetch_sub(1, Ordering::AcqRel);
                return Err(GraphicsError::ResourceCreation(format!(
                    "fence limit of {} reached",
                    limit
                ))
                .into());
            }
        }

        let fence = Arc::new(SoftwareFence::new(Arc::clone(&self.shared), initial_value));
        self.shared.fences.lock().push(Arc::downgrade(&fence));
        debug!(initial_value, "Software fence created");
        Ok(fence)
    }

    fn create_queue(&self, descriptor: &CommandQueueDescriptor) -> Result<Arc<dyn GpuQueue>> {
        let queue = SoftwareQueue::new(Arc::clone(&self.shared), descriptor)?;
        Ok(Arc::new(queue))
    }

    fn create_swap_chain(&self, name: &str) -> Result<Arc<dyn GpuSwapChain>> {
        Ok(self.create_software_swap_chain(name))
    }

    fn removed_reason(&self) -> Option<String> {
        self.shared.removed_reason()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::sync::DEVICE_REMOVED_VALUE;

    #[test]
    fn test_zero_frequency_rejected() {
        let config = SoftwareDeviceConfig {
            timestamp_frequency: 0,
            ..Default::default()
        };
        assert!(SoftwareDevice::new(&config).is_err());
    }

    #[test]
    fn test_fence_limit() {
        let config = SoftwareDeviceConfig {
            fence_limit: Some(2),
            ..Default::default()
        };
        let device = SoftwareDevice::new(&config).unwrap();
        assert!(device.create_fence(0).is_ok());
        assert!(device.create_fence(0).is_ok());
        assert!(device.create_fence(0).is_err());
        assert_eq!(device.fence_count(), 2);
    }

    #[test]
    fn test_removal_reports_max_value() {
        let device = SoftwareDevice::new(&SoftwareDeviceConfig::default()).unwrap();
        let fence = device.create_fence(5).unwrap();
        assert_eq!(fence.completed_value(), 5);
        assert!(device.removed_reason().is_none());

        device.remove_device("hang detected");
        device.remove_device("second removal is ignored");
        assert_eq!(fence.completed_value(), DEVICE_REMOVED_VALUE);
        assert_eq!(device.removed_reason().as_deref(), Some("hang detected"));
    }

    #[test]
    fn test_trace_keeps_most_recent_entries() {
        let config = SoftwareDeviceConfig {
            trace_capacity: 16,
            ..Default::default()
        };
        let device = SoftwareDevice::new(&config).unwrap();
        let now = Instant::now();
        for i in 0..100 {
            device.shared.record(TraceEntry {
                queue_class: HardwareQueueClass::Graphics,
                label: format!("marker-{}", i),
                begin: now,
                end: now,
            });
        }

        let trace = device.trace();
        assert_eq!(trace.len(), 16);
        assert_eq!(trace[0].label, "marker-84");
        assert_eq!(trace[15].label, "marker-99");
        assert!(device.find_trace("marker-0").is_none());
    }

    #[test]
    fn test_zero_trace_capacity_disables_trace() {
        let config = SoftwareDeviceConfig {
            trace_capacity: 0,
            ..Default::default()
        };
        let device = SoftwareDevice::new(&config).unwrap();
        let now = Instant::now();
        device.shared.record(TraceEntry {
            queue_class: HardwareQueueClass::Copy,
            label: "ignored".to_string(),
            begin: now,
            end: now,
        });
        assert!(device.trace().is_empty());
    }

    #[test]
    fn test_busy_interrupted_by_removal() {
        let device = SoftwareDevice::new(&SoftwareDeviceConfig::default()).unwrap();
        let remover = device.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remover.remove_device("interrupt");
        });

        let start = Instant::now();
        assert!(!device.shared.busy(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_gpu_timestamp_drift() {
        let config = SoftwareDeviceConfig {
            timestamp_frequency: 1_000_000,
            clock_drift_ppm: 1000.0,
            ..Default::default()
        };
        let device = SoftwareDevice::new(&config).unwrap();
        let at = device.shared.epoch + Duration::from_secs(1);
        // 1 秒 * 1 MHz * (1 + 0.001)
        let ticks = device.shared.gpu_timestamp(at);
        assert!((1_000_990..=1_001_010).contains(&ticks));
    }
}
