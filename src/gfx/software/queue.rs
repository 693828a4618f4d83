//! 软件设备的硬件队列
//!
//! 每个队列拥有一个 GPU 时间线线程，按 FIFO 顺序处理执行、等待和 signal 操作。
//! 设备被移除后，时间线丢弃所有后续操作。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::device::{DeviceShared, TraceEntry};
use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{ClockCalibration, GpuFence, GpuQueue};
use crate::renderer::command::{CommandList, CommandQueueDescriptor, GpuCommand, HardwareQueueClass};
use crate::renderer::sync::FenceEvent;

/// GPU 侧等待时检查队列关闭的间隔
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

enum GpuOp {
    Execute(Vec<CommandList>),
    Wait(Arc<dyn GpuFence>, u64),
    Signal(Arc<dyn GpuFence>, u64),
}

pub struct SoftwareQueue {
    name: String,
    device: Arc<DeviceShared>,
    sender: Mutex<Option<mpsc::Sender<GpuOp>>>,
    closed: Arc<AtomicBool>,
    timeline: Mutex<Option<JoinHandle<()>>>,
}

impl SoftwareQueue {
    pub(crate) fn new(device: Arc<DeviceShared>, descriptor: &CommandQueueDescriptor) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let class = descriptor.hardware_queue_class;

        let timeline = {
            let device = Arc::clone(&device);
            let closed = Arc::clone(&closed);
            thread::Builder::new()
                .name(format!("{} (GPU)", descriptor.name))
                .spawn(move || run_timeline(class, receiver, device, closed))?
        };

        debug!(queue = %descriptor.name, class = %class, "Software queue timeline started");

        Ok(Self {
            name: descriptor.name.clone(),
            device,
            sender: Mutex::new(Some(sender)),
            closed,
            timeline: Mutex::new(Some(timeline)),
        })
    }

    fn send(&self, op: GpuOp) -> Result<()> {
        let sender = self.sender.lock();
        let sent = match sender.as_ref() {
            Some(sender) => sender.send(op).is_ok(),
            None => false,
        };
        if sent {
            Ok(())
        } else {
            Err(GraphicsError::CommandExecution(format!(
                "GPU timeline of '{}' has stopped",
                self.name
            ))
            .into())
        }
    }
}

impl GpuQueue for SoftwareQueue {
    fn execute_command_lists(&self, command_lists: Vec<CommandList>) -> Result<()> {
        self.send(GpuOp::Execute(command_lists))
    }

    fn wait(&self, fence: &Arc<dyn GpuFence>, value: u64) -> Result<()> {
        self.send(GpuOp::Wait(Arc::clone(fence), value))
    }

    fn signal(&self, fence: &Arc<dyn GpuFence>, value: u64) -> Result<()> {
        self.send(GpuOp::Signal(Arc::clone(fence), value))
    }

    fn timestamp_frequency(&self) -> u64 {
        self.device.timestamp_frequency()
    }

    fn clock_calibration(&self) -> Result<ClockCalibration> {
        if self.device.is_removed() {
            return Err(self.device.device_lost_error().into());
        }
        let cpu_timestamp = Instant::now();
        Ok(ClockCalibration {
            gpu_timestamp: self.device.gpu_timestamp(cpu_timestamp),
            cpu_timestamp,
        })
    }
}

impl Drop for SoftwareQueue {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.sender.lock().take();
        if let Some(handle) = self.timeline.lock().take() {
            if handle.join().is_err() {
                crate::rhi_error!(queue = %self.name, "GPU timeline thread panicked");
            }
        }
    }
}

fn run_timeline(
    class: HardwareQueueClass,
    receiver: mpsc::Receiver<GpuOp>,
    device: Arc<DeviceShared>,
    closed: Arc<AtomicBool>,
) {
    while let Ok(op) = receiver.recv() {
        if device.is_removed() {
            continue;
        }
        match op {
            GpuOp::Execute(command_lists) => execute(class, &command_lists, &device),
            GpuOp::Wait(fence, value) => wait_on_gpu(fence.as_ref(), value, &closed),
            GpuOp::Signal(fence, value) => {
                trace!(class = %class, value, "GPU signal");
                fence.signal(value);
            }
        }
    }
}

fn execute(class: HardwareQueueClass, command_lists: &[CommandList], device: &DeviceShared) {
    for list in command_lists {
        for command in list.commands() {
            match command {
                GpuCommand::Nop => {}
                GpuCommand::Execute { label, duration } => {
                    let begin = Instant::now();
                    if !device.busy(*duration) {
                        return;
                    }
                    device.record(TraceEntry {
                        queue_class: class,
                        label: label.clone(),
                        begin,
                        end: Instant::now(),
                    });
                }
                GpuCommand::Marker(label) => {
                    let now = Instant::now();
                    device.record(TraceEntry {
                        queue_class: class,
                        label: label.clone(),
                        begin: now,
                        end: now,
                    });
                }
            }
        }
    }
}

fn wait_on_gpu(fence: &dyn GpuFence, value: u64, closed: &AtomicBool) {
    let event = FenceEvent::new("GpuQueueWait");
    let mut registered = false;
    // 设备移除后 completed_value 为最大值，等待自然结束
    while fence.completed_value() < value {
        if closed.load(Ordering::Acquire) {
            return;
        }
        // 等待者只在事件置位时被移除，超时后沿用同一个等待者
        if !registered {
            fence.set_event_on_completion(value, &event);
            registered = true;
        }
        if event.wait_timeout(WAIT_POLL_INTERVAL) {
            registered = false;
        }
    }
}
