//! 命令队列
//!
//! 每个硬件队列类别一个 `CommandQueue`。所有提交都以闭包形式排入该队列专属的
//! 命令线程，由命令线程按 FIFO 顺序交给设备队列。
//!
//! - `flush_commands`：等待命令线程把已排队的闭包全部交给设备（不等待 GPU）
//! - `wait_for_idle`：在此基础上再等待 GPU 执行完毕

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::core::error::{DistQueueError, GraphicsError, Result};
use crate::gfx::backend::{ClockCalibration, GpuDevice, GpuFence, GpuQueue};
use crate::renderer::command::{CommandQueueDescriptor, ExecuteWorkRequest, HardwareQueueClass};
use crate::renderer::sync::{Fence, FenceEvent, FenceSet, FenceState};

type QueuedCommand = Box<dyn FnOnce(&dyn GpuQueue) -> Result<()> + Send>;

/// 命令线程与提交方共享的状态
#[derive(Default)]
struct SubmitState {
    /// 已排队但尚未执行完的闭包数
    pending: Mutex<usize>,
    drained: Condvar,
    /// 命令线程上第一次失败的设备调用
    failure: Mutex<Option<DistQueueError>>,
    execute_nanos: AtomicU64,
    present_nanos: AtomicU64,
}

impl SubmitState {
    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn record_failure(&self, error: DistQueueError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(error);
        }
    }
}

/// 闭包结束（包括 panic）时递减待处理计数
struct FinishGuard<'a>(&'a SubmitState);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_one();
    }
}

fn add_duration(counter: &AtomicU64, duration: Duration) {
    counter.fetch_add(duration.as_nanos() as u64, Ordering::AcqRel);
}

pub struct CommandQueue {
    descriptor: CommandQueueDescriptor,
    queue: Option<Arc<dyn GpuQueue>>,
    sender: Option<mpsc::Sender<QueuedCommand>>,
    thread: Option<JoinHandle<()>>,
    state: Arc<SubmitState>,
    idle_fence: Fence,
    hang_warning: Option<Duration>,
    calibration: Option<ClockCalibration>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            descriptor: CommandQueueDescriptor::new(HardwareQueueClass::Graphics, ""),
            queue: None,
            sender: None,
            thread: None,
            state: Arc::new(SubmitState::default()),
            idle_fence: Fence::new(),
            hang_warning: None,
            calibration: None,
        }
    }

    /// 创建设备队列、空闲 Fence 与命令线程
    pub fn init(&mut self, device: &dyn GpuDevice, descriptor: CommandQueueDescriptor) -> Result<()> {
        if self.is_initialized() {
            return Err(GraphicsError::CommandExecution(format!(
                "command queue '{}' is already initialized",
                self.descriptor.name
            ))
            .into());
        }

        let queue = device.create_queue(&descriptor)?;
        self.idle_fence.init(device, FenceState::Signaled)?;

        let (sender, receiver) = mpsc::channel::<QueuedCommand>();
        let thread = {
            let queue = Arc::clone(&queue);
            let state = Arc::clone(&self.state);
            let name = descriptor.name.clone();
            thread::Builder::new()
                .name(descriptor.name.clone())
                .spawn(move || run_command_thread(&name, queue, receiver, state))
        };
        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                self.idle_fence.shutdown();
                return Err(e.into());
            }
        };

        debug!(
            queue = %descriptor.name,
            class = %descriptor.hardware_queue_class,
            subclass = ?descriptor.hardware_queue_subclass,
            "Command queue initialized"
        );

        self.descriptor = descriptor;
        self.queue = Some(queue);
        self.sender = Some(sender);
        self.thread = Some(thread);
        Ok(())
    }

    /// Fence 等待超过阈值时输出警告
    pub fn set_hang_warning(&mut self, threshold: Option<Duration>) {
        self.hang_warning = threshold;
    }

    pub fn is_initialized(&self) -> bool {
        self.queue.is_some()
    }

    pub fn descriptor(&self) -> &CommandQueueDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn hardware_queue_class(&self) -> HardwareQueueClass {
        self.descriptor.hardware_queue_class
    }

    /// 命令线程的 ID，未初始化时为 `None`
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread.as_ref().map(|t| t.thread().id())
    }

    fn submit<F>(&self, command: F) -> Result<()>
    where
        F: FnOnce(&dyn GpuQueue) -> Result<()> + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or(GraphicsError::NotInitialized("command queue"))?;

        *self.state.pending.lock() += 1;
        if sender.send(Box::new(command)).is_err() {
            self.state.finish_one();
            return Err(GraphicsError::CommandExecution(format!(
                "command thread of '{}' has exited",
                self.descriptor.name
            ))
            .into());
        }
        Ok(())
    }

    /// 排入一次 GPU signal，值为 `fence` 当前的目标值
    pub fn queue_gpu_signal(&self, fence: &Fence) -> Result<()> {
        let signal = fence.pending_signal()?;
        self.submit(move |queue| queue.signal(&signal.fence, signal.value))
    }

    /// 异步提交一次工作
    ///
    /// 需要等待的 compiled fence 与本类别的 signal fence 在调用时解析，
    /// 之后由命令线程按请求中的顺序处理。
    pub fn execute_work(&self, request: ExecuteWorkRequest, compiled_fences: &FenceSet) -> Result<()> {
        let class = self.hardware_queue_class();
        if let Some(list) = request.command_lists.iter().find(|l| l.queue_class() != class) {
            return Err(GraphicsError::CommandExecution(format!(
                "command list '{}' was recorded for the {} queue but submitted to '{}'",
                list.name(),
                list.queue_class(),
                self.descriptor.name
            ))
            .into());
        }

        let mut waits: Vec<(Arc<dyn GpuFence>, u64)> = Vec::new();
        for class in HardwareQueueClass::ALL {
            let value = request.wait_fences[class];
            if value > 0 {
                waits.push((Arc::clone(compiled_fences.fence(class).device_fence()?), value));
            }
        }

        let own_signal = if request.signal_fence > 0 {
            let fence = compiled_fences.fence(class).device_fence()?;
            Some((Arc::clone(fence), request.signal_fence))
        } else {
            None
        };

        trace!(queue = %self.descriptor.name, request = ?request, "Queue execute_work");

        let state = Arc::clone(&self.state);
        let ExecuteWorkRequest {
            command_lists,
            user_fences_to_signal,
            swap_chains_to_present,
            ..
        } = request;

        self.submit(move |queue| {
            for (fence, value) in &waits {
                queue.wait(fence, *value)?;
            }

            if !command_lists.is_empty() {
                let start = Instant::now();
                queue.execute_command_lists(command_lists)?;
                add_duration(&state.execute_nanos, start.elapsed());
            }

            if let Some((fence, value)) = &own_signal {
                queue.signal(fence, *value)?;
            }

            for signal in &user_fences_to_signal {
                queue.signal(&signal.fence, signal.value)?;
            }

            if !swap_chains_to_present.is_empty() {
                let start = Instant::now();
                for swap_chain in &swap_chains_to_present {
                    swap_chain.present()?;
                }
                add_duration(&state.present_nanos, start.elapsed());
            }
            Ok(())
        })
    }

    /// 阻塞直到命令线程处理完所有已排队的闭包
    ///
    /// 返回命令线程上记录的第一个设备调用错误。
    pub fn flush_commands(&self) -> Result<()> {
        {
            let mut pending = self.state.pending.lock();
            while *pending > 0 {
                self.state.drained.wait(&mut pending);
            }
        }
        match self.state.failure.lock().take() {
            Some(error) => Err(error.with_queue_class(self.hardware_queue_class())),
            None => Ok(()),
        }
    }

    /// 等待本队列上已提交的全部工作在 GPU 上完成
    pub fn wait_for_idle(&mut self) -> Result<()> {
        self.idle_fence.increment();
        self.queue_gpu_signal(&self.idle_fence)?;
        self.flush_commands()?;

        let event = FenceEvent::new("WaitForIdle").with_hang_warning(self.hang_warning);
        self.idle_fence
            .wait(&event)
            .map_err(|e| e.with_queue_class(self.hardware_queue_class()))
    }

    /// 重新采样 GPU / CPU 时钟对
    pub fn calibrate_clock(&mut self) -> Result<()> {
        let queue = self
            .queue
            .as_ref()
            .ok_or(GraphicsError::NotInitialized("command queue"))?;
        let calibration = queue
            .clock_calibration()
            .map_err(|e| e.with_queue_class(self.hardware_queue_class()))?;
        self.calibration = Some(calibration);
        Ok(())
    }

    pub fn clock_calibration(&self) -> Option<ClockCalibration> {
        self.calibration
    }

    /// 用最近一次校准把 GPU 时间戳换算为 CPU 时间
    pub fn gpu_timestamp_to_cpu(&self, gpu_timestamp: u64) -> Option<Instant> {
        let calibration = self.calibration?;
        let frequency = self.queue.as_ref()?.timestamp_frequency();
        if frequency == 0 {
            return None;
        }

        let to_duration =
            |ticks: u64| Duration::from_nanos((ticks as u128 * 1_000_000_000 / frequency as u128) as u64);
        if gpu_timestamp >= calibration.gpu_timestamp {
            calibration
                .cpu_timestamp
                .checked_add(to_duration(gpu_timestamp - calibration.gpu_timestamp))
        } else {
            calibration
                .cpu_timestamp
                .checked_sub(to_duration(calibration.gpu_timestamp - gpu_timestamp))
        }
    }

    pub fn clear_timers(&self) {
        self.state.execute_nanos.store(0, Ordering::Release);
        self.state.present_nanos.store(0, Ordering::Release);
    }

    /// 自上次 `clear_timers` 以来提交命令列表的累计耗时
    pub fn last_execute_duration(&self) -> Duration {
        Duration::from_nanos(self.state.execute_nanos.load(Ordering::Acquire))
    }

    /// 自上次 `clear_timers` 以来 present 的累计耗时
    pub fn last_present_duration(&self) -> Duration {
        Duration::from_nanos(self.state.present_nanos.load(Ordering::Acquire))
    }

    /// 排空命令线程并释放设备对象，可重复调用
    pub fn shutdown(&mut self) {
        if self.sender.is_some() {
            if let Err(e) = self.flush_commands() {
                crate::rhi_error!(queue = %self.descriptor.name, error = %e, "Flush failed during shutdown");
            }
        }

        self.sender = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                crate::rhi_error!(queue = %self.descriptor.name, "Command thread panicked");
            }
        }

        self.idle_fence.shutdown();
        self.calibration = None;
        if self.queue.take().is_some() {
            debug!(queue = %self.descriptor.name, "Command queue shut down");
        }
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_command_thread(
    name: &str,
    queue: Arc<dyn GpuQueue>,
    receiver: mpsc::Receiver<QueuedCommand>,
    state: Arc<SubmitState>,
) {
    trace!(queue = name, "Command thread started");
    while let Ok(command) = receiver.recv() {
        let _finished = FinishGuard(&state);
        let result = panic::catch_unwind(AssertUnwindSafe(|| command(queue.as_ref())))
            .unwrap_or_else(|_| {
                Err(GraphicsError::CommandExecution(format!("queued command on '{}' panicked", name)).into())
            });
        if let Err(e) = result {
            crate::rhi_error!(queue = name, error = %e, "Queued command failed");
            state.record_failure(e);
        }
    }
    trace!(queue = name, "Command thread exited");
}
