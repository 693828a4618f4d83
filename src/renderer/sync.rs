//! GPU 同步机制模块
//!
//! 提供 CPU-GPU 同步原语：`Fence`、`FenceSet`、`FenceEvent`。
//!
//! # 设计原则
//!
//! - **Fence**：单调递增的计数器。CPU 侧维护待达到的目标值（pending value），
//!   GPU 侧在队列执行到 signal 命令时写入已完成值（completed value）
//! - **FenceSet**：每个硬件队列类别一个 Fence，表示"所有队列都至少到达这一点"
//! - **FenceEvent**：等待时使用的事件对象，由设备在 Fence 到达目标值时置位，不做忙等
//!
//! 设备被移除后，设备 Fence 的已完成值固定为 [`DEVICE_REMOVED_VALUE`]。

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{GpuDevice, GpuFence};
use crate::renderer::command::{HardwareQueueClass, PerQueue};

/// 设备移除后 Fence 报告的已完成值
pub const DEVICE_REMOVED_VALUE: u64 = u64::MAX;

/// 每个硬件队列类别一个 Fence 值
pub type FenceValueSet = PerQueue<u64>;

/// Fence 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    /// 尚未到达目标值
    Reset,
    /// 已到达目标值
    Signaled,
}

struct EventInner {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

/// Fence 等待事件
///
/// 自动复位事件：一次 `wait` 消耗一次 `set`。
#[derive(Clone)]
pub struct FenceEvent {
    name: Arc<str>,
    hang_warning: Option<Duration>,
    inner: Arc<EventInner>,
}

impl FenceEvent {
    /// 创建新的事件
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            hang_warning: None,
            inner: Arc::new(EventInner {
                signaled: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    /// 等待超过阈值时输出一次挂起警告
    pub fn with_hang_warning(mut self, threshold: Option<Duration>) -> Self {
        self.hang_warning = threshold;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hang_warning(&self) -> Option<Duration> {
        self.hang_warning
    }

    /// 置位事件，唤醒等待者
    pub fn set(&self) {
        let mut signaled = self.inner.signaled.lock();
        *signaled = true;
        self.inner.condvar.notify_all();
    }

    /// 阻塞直到事件被置位
    pub fn wait(&self) {
        let mut signaled = self.inner.signaled.lock();
        while !*signaled {
            self.inner.condvar.wait(&mut signaled);
        }
        *signaled = false;
    }

    /// 带超时的等待，超时返回 `false`
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.inner.signaled.lock();
        while !*signaled {
            if self.inner.condvar.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *signaled, false)
    }
}

impl fmt::Debug for FenceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceEvent").field("name", &self.name).finish()
    }
}

/// 值语义的 signal 句柄：设备 Fence + 目标值
#[derive(Clone)]
pub struct FenceSignal {
    pub fence: Arc<dyn GpuFence>,
    pub value: u64,
}

impl fmt::Debug for FenceSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceSignal").field("value", &self.value).finish()
    }
}

/// CPU/GPU 共享的单调计数器
#[derive(Default)]
pub struct Fence {
    fence: Option<Arc<dyn GpuFence>>,
    pending_value: u64,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建设备 Fence
    ///
    /// `Signaled` 状态下目标值为 0，第一次等待立即返回；`Reset` 状态下目标值为 1。
    pub fn init(&mut self, device: &dyn GpuDevice, state: FenceState) -> Result<()> {
        self.pending_value = match state {
            FenceState::Signaled => 0,
            FenceState::Reset => 1,
        };
        self.fence = Some(device.create_fence(0)?);
        Ok(())
    }

    /// 释放设备 Fence，可重复调用
    pub fn shutdown(&mut self) {
        self.fence = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.fence.is_some()
    }

    /// 递增并返回新的目标值
    pub fn increment(&mut self) -> u64 {
        self.pending_value += 1;
        self.pending_value
    }

    /// 开始新一轮使用：下一次 signal 的目标值尚未被 GPU 到达
    pub fn reset(&mut self) {
        debug_assert!(
            self.fence.is_none() || self.state() == FenceState::Signaled,
            "fence reset before its previous value was reached"
        );
        self.pending_value += 1;
    }

    pub fn pending_value(&self) -> u64 {
        self.pending_value
    }

    /// GPU 已完成的值，未初始化时为 0
    pub fn completed_value(&self) -> u64 {
        self.fence.as_ref().map_or(0, |f| f.completed_value())
    }

    pub fn state(&self) -> FenceState {
        if self.fence.is_some() && self.completed_value() >= self.pending_value {
            FenceState::Signaled
        } else {
            FenceState::Reset
        }
    }

    /// 设备 Fence 句柄
    pub fn device_fence(&self) -> Result<&Arc<dyn GpuFence>> {
        self.fence
            .as_ref()
            .ok_or_else(|| GraphicsError::NotInitialized("fence").into())
    }

    /// 当前目标值的 signal 句柄
    pub fn pending_signal(&self) -> Result<FenceSignal> {
        Ok(FenceSignal {
            fence: Arc::clone(self.device_fence()?),
            value: self.pending_value,
        })
    }

    /// 在 CPU 侧直接 signal 当前目标值
    pub fn signal(&self) -> Result<()> {
        self.device_fence()?.signal(self.pending_value);
        Ok(())
    }

    /// 等待当前目标值
    pub fn wait(&self, event: &FenceEvent) -> Result<()> {
        self.wait_for_value(event, self.pending_value)
    }

    /// 等待 GPU 到达指定值
    pub fn wait_for_value(&self, event: &FenceEvent, value: u64) -> Result<()> {
        let fence = self.device_fence()?;
        let start = Instant::now();
        let mut warned = false;
        let mut registered = false;

        loop {
            let completed = fence.completed_value();
            if completed == DEVICE_REMOVED_VALUE {
                return Err(GraphicsError::DeviceLost {
                    queue_class: None,
                    fence_value: value,
                    reason: format!("device removed during '{}' wait", event.name()),
                }
                .into());
            }
            if completed >= value {
                return Ok(());
            }

            // 等待者在事件置位时才被移除，超时后不重复注册
            if !registered {
                fence.set_event_on_completion(value, event);
                registered = true;
            }
            match event.hang_warning() {
                Some(threshold) if !warned => {
                    if event.wait_timeout(threshold) {
                        registered = false;
                    } else {
                        warned = true;
                        crate::rhi_warn!(
                            event = event.name(),
                            fence_value = value,
                            completed,
                            waited_ms = start.elapsed().as_millis() as u64,
                            "GPU fence wait exceeded hang threshold"
                        );
                    }
                }
                _ => {
                    event.wait();
                    registered = false;
                }
            }
        }
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("initialized", &self.fence.is_some())
            .field("pending_value", &self.pending_value)
            .field("completed_value", &self.completed_value())
            .finish()
    }
}

/// 每个硬件队列类别一个 Fence
#[derive(Debug, Default)]
pub struct FenceSet {
    fences: [Fence; HardwareQueueClass::COUNT],
}

impl FenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, device: &dyn GpuDevice, initial_state: FenceState) -> Result<()> {
        for fence in &mut self.fences {
            fence.init(device, initial_state)?;
        }
        Ok(())
    }

    pub fn shutdown(&mut self) {
        for fence in &mut self.fences {
            fence.shutdown();
        }
    }

    pub fn fence(&self, class: HardwareQueueClass) -> &Fence {
        &self.fences[class.index()]
    }

    pub fn fence_mut(&mut self, class: HardwareQueueClass) -> &mut Fence {
        &mut self.fences[class.index()]
    }

    /// 依次等待所有成员 Fence
    pub fn wait(&self, event: &FenceEvent) -> Result<()> {
        for class in HardwareQueueClass::ALL {
            self.fence(class)
                .wait(event)
                .map_err(|e| e.with_queue_class(class))?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for fence in &mut self.fences {
            fence.reset();
        }
    }

    pub fn pending_values(&self) -> FenceValueSet {
        PerQueue(std::array::from_fn(|i| self.fences[i].pending_value()))
    }
}
