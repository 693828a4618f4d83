//! 命令队列上下文
//!
//! 持有三个硬件队列、一个按帧轮转的 FenceSet 环以及一组长期存在的 compiled fence。
//!
//! # 每帧流程
//!
//! 1. `begin`：清空各队列的计时器
//! 2. `execute_work`：任意次数，按类别提交到对应队列
//! 3. `end`：为当前槽位排入 GPU signal，flush 全部队列，前进到下一个槽位，
//!    等待该槽位上一次使用时的 signal 完成并复位，最后重新校准时钟
//!
//! 环的长度为 `frames_in_flight - 1`，因此 CPU 领先 GPU 的帧数有上界。

use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::core::config::{Config, QueueNames, FRAME_COUNT_MAX};
use crate::core::error::{ConfigError, DistQueueError, GraphicsError, Result};
use crate::gfx::backend::GpuDevice;
use crate::renderer::command::{
    CommandQueueDescriptor, ExecuteWorkRequest, HardwareQueueClass, HardwareQueueSubclass, PerQueue,
};
use crate::renderer::command_queue::CommandQueue;
use crate::renderer::statistics::{CpuTimingStatistics, FramePacingMetrics, QueueStatistics};
use crate::renderer::sync::{FenceEvent, FenceSet, FenceState};

/// 队列命令线程创建后的通知回调：(类别, 队列名, 线程 ID)
pub type QueueThreadObserver = Box<dyn Fn(HardwareQueueClass, &str, ThreadId) + Send + Sync>;

/// 上下文的创建参数
#[derive(Debug, Clone)]
pub struct CommandQueueContextDescriptor {
    /// 同时在飞的帧数，范围 2..=FRAME_COUNT_MAX
    pub frames_in_flight: u32,
    /// 每次 execute_work 后等待所有队列空闲（调试 GPU 错误用）
    pub force_flush: bool,
    pub hang_warning: Option<Duration>,
    pub queue_names: QueueNames,
}

impl Default for CommandQueueContextDescriptor {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            force_flush: false,
            hang_warning: None,
            queue_names: QueueNames::default(),
        }
    }
}

impl From<&Config> for CommandQueueContextDescriptor {
    fn from(config: &Config) -> Self {
        Self {
            frames_in_flight: config.device.frames_in_flight,
            force_flush: config.device.force_flush,
            hang_warning: config.device.hang_warning(),
            queue_names: config.queues.clone(),
        }
    }
}

impl CommandQueueContextDescriptor {
    fn validate(&self) -> Result<()> {
        if self.frames_in_flight < 2 || self.frames_in_flight > FRAME_COUNT_MAX {
            return Err(ConfigError::InvalidValue {
                field: "device.frames_in_flight".to_string(),
                reason: format!(
                    "must be between 2 and {}, got {}",
                    FRAME_COUNT_MAX, self.frames_in_flight
                ),
            }
            .into());
        }
        Ok(())
    }
}

pub struct CommandQueueContext {
    descriptor: CommandQueueContextDescriptor,
    device: Option<Arc<dyn GpuDevice>>,
    queues: PerQueue<CommandQueue>,
    frame_fences: Vec<FenceSet>,
    compiled_fences: FenceSet,
    current_frame_index: usize,
    frame_number: u64,
    frame_active: bool,
    thread_observer: Option<QueueThreadObserver>,
    pacing: FramePacingMetrics,
}

impl CommandQueueContext {
    pub fn new(descriptor: CommandQueueContextDescriptor) -> Self {
        Self {
            descriptor,
            device: None,
            queues: PerQueue::default(),
            frame_fences: Vec::new(),
            compiled_fences: FenceSet::new(),
            current_frame_index: 0,
            frame_number: 0,
            frame_active: false,
            thread_observer: None,
            pacing: FramePacingMetrics::new(),
        }
    }

    /// 设置队列线程的命名回调，需在 `init` 之前调用
    pub fn set_queue_thread_observer(&mut self, observer: QueueThreadObserver) {
        if self.is_initialized() {
            crate::rhi_warn!("Queue thread observer set after init, it applies from the next init");
        }
        self.thread_observer = Some(observer);
    }

    pub fn is_initialized(&self) -> bool {
        self.device.is_some()
    }

    /// 创建 Fence 环、compiled fence 与三个硬件队列
    ///
    /// 失败时释放已创建的部分，上下文保持未初始化状态，`shutdown` 仍然安全。
    pub fn init(&mut self, device: Arc<dyn GpuDevice>) -> Result<()> {
        if self.is_initialized() {
            return Err(GraphicsError::CommandExecution(
                "command queue context is already initialized".to_string(),
            )
            .into());
        }
        self.descriptor.validate()?;

        if let Err(e) = self.create_objects(device.as_ref()) {
            crate::rhi_error!(error = %e, "Command queue context init failed");
            self.shutdown();
            return Err(e);
        }

        self.current_frame_index = 0;
        self.frame_number = 0;
        self.frame_active = false;
        self.pacing = FramePacingMetrics::new();

        info!(
            backend = device.backend_name(),
            frames_in_flight = self.descriptor.frames_in_flight,
            frame_fences = self.frame_fences.len(),
            force_flush = self.descriptor.force_flush,
            "Command queue context initialized"
        );
        self.device = Some(device);

        if let Err(e) = self.calibrate_clocks() {
            let e = self.report(e);
            self.shutdown();
            return Err(e);
        }
        Ok(())
    }

    fn create_objects(&mut self, device: &dyn GpuDevice) -> Result<()> {
        let ring_size = (self.descriptor.frames_in_flight - 1) as usize;
        self.frame_fences = (0..ring_size).map(|_| FenceSet::new()).collect();
        for fences in &mut self.frame_fences {
            fences.init(device, FenceState::Signaled)?;
        }
        self.compiled_fences.init(device, FenceState::Reset)?;

        for class in HardwareQueueClass::ALL {
            let name = self.descriptor.queue_names.name(class).to_string();
            let descriptor = CommandQueueDescriptor::new(class, name)
                .with_subclass(HardwareQueueSubclass::Primary);

            let queue = &mut self.queues[class];
            queue.set_hang_warning(self.descriptor.hang_warning);
            queue.init(device, descriptor)?;

            if let Some(thread_id) = queue.thread_id() {
                match &self.thread_observer {
                    Some(observer) => observer(class, queue.name(), thread_id),
                    None => crate::rhi_info!(
                        class = %class,
                        queue = queue.name(),
                        thread = ?thread_id,
                        "Queue thread started"
                    ),
                }
            }
        }
        Ok(())
    }

    /// 等待全部工作完成后释放所有对象，可重复调用，也可在 `init` 之前或失败后调用
    pub fn shutdown(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.wait_for_idle() {
                crate::rhi_error!(error = %e, "Wait for idle failed during shutdown");
            }
        }

        self.compiled_fences.shutdown();
        for fences in &mut self.frame_fences {
            fences.shutdown();
        }
        self.frame_fences.clear();

        for class in HardwareQueueClass::ALL {
            self.queues[class].shutdown();
        }

        self.frame_active = false;
        if self.device.take().is_some() {
            info!(frames = self.frame_number, "Command queue context shut down");
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(GraphicsError::NotInitialized("command queue context").into())
        }
    }

    /// 开始新的一帧
    pub fn begin(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.frame_active {
            return Err(GraphicsError::FrameAlreadyActive(self.frame_number).into());
        }

        for class in HardwareQueueClass::ALL {
            self.queues[class].clear_timers();
        }
        self.frame_active = true;
        Ok(())
    }

    /// 向指定类别的队列提交工作
    pub fn execute_work(&mut self, class: HardwareQueueClass, request: ExecuteWorkRequest) -> Result<()> {
        self.ensure_initialized()?;
        if !self.frame_active {
            return Err(GraphicsError::FrameNotActive("execute_work").into());
        }

        self.queues[class]
            .execute_work(request, &self.compiled_fences)
            .map_err(|e| self.report(e))?;

        if self.descriptor.force_flush {
            self.wait_for_idle()?;
        }
        Ok(())
    }

    /// 结束当前帧，并在需要时阻塞以限制 CPU 领先的帧数
    pub fn end(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if !self.frame_active {
            return Err(GraphicsError::FrameNotActive("end").into());
        }
        self.frame_active = false;

        let current = &self.frame_fences[self.current_frame_index];
        for class in HardwareQueueClass::ALL {
            self.queues[class]
                .queue_gpu_signal(current.fence(class))
                .map_err(|e| self.report(e))?;
        }
        for class in HardwareQueueClass::ALL {
            self.queues[class].flush_commands().map_err(|e| self.report(e))?;
        }

        self.current_frame_index = (self.current_frame_index + 1) % self.frame_fences.len();

        let start = Instant::now();
        let event = FenceEvent::new("FrameFence").with_hang_warning(self.descriptor.hang_warning);
        self.frame_fences[self.current_frame_index]
            .wait(&event)
            .map_err(|e| self.report(e))?;
        self.frame_fences[self.current_frame_index].reset();

        let waited = start.elapsed();
        self.pacing.record_frame(waited);
        self.frame_number += 1;
        debug!(
            frame = self.frame_number,
            slot = self.current_frame_index,
            waited_us = waited.as_micros() as u64,
            "Frame ended"
        );

        self.calibrate_clocks().map_err(|e| self.report(e))
    }

    fn calibrate_clocks(&mut self) -> Result<()> {
        for class in HardwareQueueClass::ALL {
            self.queues[class].calibrate_clock()?;
        }
        Ok(())
    }

    /// 等待所有队列空闲，仅用于关闭或显式同步
    pub fn wait_for_idle(&mut self) -> Result<()> {
        let mut result = Ok(());
        for class in HardwareQueueClass::ALL {
            let queue = &mut self.queues[class];
            if !queue.is_initialized() {
                continue;
            }
            if let Err(e) = queue.wait_for_idle() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result.map_err(|e| self.report(e))
    }

    /// 递增指定类别的 compiled fence，返回新的目标值
    pub fn increment_fence(&mut self, class: HardwareQueueClass) -> u64 {
        self.compiled_fences.fence_mut(class).increment()
    }

    pub fn compiled_fences(&self) -> &FenceSet {
        &self.compiled_fences
    }

    pub fn command_queue(&self, class: HardwareQueueClass) -> &CommandQueue {
        &self.queues[class]
    }

    /// 按下标获取队列，下标越界时返回错误
    pub fn command_queue_by_index(&self, index: usize) -> Result<&CommandQueue> {
        let class = HardwareQueueClass::from_index(index)?;
        Ok(&self.queues[class])
    }

    /// 用本帧各队列的计时结果覆盖 `statistics`
    pub fn update_cpu_timing_statistics(&self, statistics: &mut CpuTimingStatistics) {
        statistics.reset();

        let mut present_duration = Duration::ZERO;
        for class in HardwareQueueClass::ALL {
            let queue = &self.queues[class];
            statistics.queue_statistics.push(QueueStatistics {
                name: queue.name().to_string(),
                execute_duration: queue.last_execute_duration(),
            });
            present_duration += queue.last_present_duration();
        }
        statistics.present_duration = present_duration;
    }

    pub fn current_frame_index(&self) -> usize {
        self.current_frame_index
    }

    /// 帧 Fence 环的长度
    pub fn frame_fence_count(&self) -> usize {
        self.frame_fences.len()
    }

    /// 已结束的帧数
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn is_frame_active(&self) -> bool {
        self.frame_active
    }

    pub fn pacing_metrics(&self) -> &FramePacingMetrics {
        &self.pacing
    }

    pub fn descriptor(&self) -> &CommandQueueContextDescriptor {
        &self.descriptor
    }

    /// 用设备给出的移除原因补充设备丢失错误，并输出错误日志
    fn report(&self, error: DistQueueError) -> DistQueueError {
        match error {
            DistQueueError::Graphics(GraphicsError::DeviceLost {
                queue_class,
                fence_value,
                reason,
            }) => {
                let reason = match self.device.as_ref().and_then(|d| d.removed_reason()) {
                    Some(removed) if !reason.contains(&removed) => format!("{} ({})", removed, reason),
                    _ => reason,
                };
                crate::rhi_error!(
                    queue = ?queue_class,
                    fence_value,
                    reason = %reason,
                    frame = self.frame_number,
                    "GPU device lost"
                );
                GraphicsError::DeviceLost {
                    queue_class,
                    fence_value,
                    reason,
                }
                .into()
            }
            other => other,
        }
    }
}

impl Default for CommandQueueContext {
    fn default() -> Self {
        Self::new(CommandQueueContextDescriptor::default())
    }
}

impl fmt::Debug for CommandQueueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueueContext")
            .field("initialized", &self.is_initialized())
            .field("frames_in_flight", &self.descriptor.frames_in_flight)
            .field("current_frame_index", &self.current_frame_index)
            .field("frame_number", &self.frame_number)
            .field("frame_active", &self.frame_active)
            .finish()
    }
}

impl Drop for CommandQueueContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SoftwareDeviceConfig;
    use crate::gfx::software::SoftwareDevice;
    use crate::renderer::command::{CommandEncoder, CommandList};
    use std::sync::Mutex;

    fn context_with(frames_in_flight: u32) -> (CommandQueueContext, SoftwareDevice) {
        let device = SoftwareDevice::new(&SoftwareDeviceConfig::default()).unwrap();
        let mut context = CommandQueueContext::new(CommandQueueContextDescriptor {
            frames_in_flight,
            ..Default::default()
        });
        context.init(Arc::new(device.clone())).unwrap();
        (context, device)
    }

    fn nop(class: HardwareQueueClass) -> CommandList {
        let mut encoder = CommandEncoder::new(class, "nop");
        encoder.begin().unwrap();
        encoder.nop().unwrap();
        encoder.finish().unwrap()
    }

    fn work(class: HardwareQueueClass, label: &str, millis: u64) -> CommandList {
        let mut encoder = CommandEncoder::new(class, label);
        encoder.begin().unwrap();
        encoder.execute(label, Duration::from_millis(millis)).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_nop_frames_wrap_ring() {
        let (mut context, _device) = context_with(3);
        assert_eq!(context.frame_fence_count(), 2);

        for frame in 0..5 {
            context.begin().unwrap();
            context
                .execute_work(
                    HardwareQueueClass::Graphics,
                    ExecuteWorkRequest::new(vec![nop(HardwareQueueClass::Graphics)]),
                )
                .unwrap();
            context.end().unwrap();
            assert_eq!(context.current_frame_index(), (frame + 1) % 2);
        }
        assert_eq!(context.frame_number(), 5);
        assert_eq!(context.pacing_metrics().frames(), 5);
    }

    #[test]
    fn test_end_blocks_on_previous_slot() {
        let (mut context, device) = context_with(3);

        for frame in 0..5u64 {
            context.begin().unwrap();
            let label = format!("frame-{}", frame);
            context
                .execute_work(
                    HardwareQueueClass::Graphics,
                    ExecuteWorkRequest::new(vec![work(HardwareQueueClass::Graphics, &label, 40)]),
                )
                .unwrap();
            context.end().unwrap();

            if frame < 2 {
                // 环尚未转满一圈，end 不等待本帧的 GPU 工作
                assert!(device.find_trace(&label).is_none());
            } else {
                // 上一次使用该槽位的帧必定已经在 GPU 上完成
                let previous = format!("frame-{}", frame - 1);
                assert!(device.find_trace(&previous).is_some());
            }
        }
        assert!(context.pacing_metrics().total_wait() >= Duration::from_millis(30));
    }

    #[test]
    fn test_cpu_never_runs_ahead_of_frames_in_flight() {
        for frames_in_flight in 2..=FRAME_COUNT_MAX {
            let (mut context, device) = context_with(frames_in_flight);
            let ahead = frames_in_flight as u64;

            for frame in 0..8u64 {
                // frame 开始时，frame - F 必须已经完成
                if frame >= ahead {
                    let done = format!("f{}-{}", frames_in_flight, frame - ahead);
                    assert!(device.find_trace(&done).is_some(), "{} not complete", done);
                }

                context.begin().unwrap();
                let label = format!("f{}-{}", frames_in_flight, frame);
                context
                    .execute_work(
                        HardwareQueueClass::Compute,
                        ExecuteWorkRequest::new(vec![work(HardwareQueueClass::Compute, &label, 5)]),
                    )
                    .unwrap();
                context.end().unwrap();
            }
        }
    }

    #[test]
    fn test_increment_compiled_fence() {
        let (mut context, _device) = context_with(3);

        let first = context.increment_fence(HardwareQueueClass::Compute);
        let second = context.increment_fence(HardwareQueueClass::Compute);
        assert!(second > first);
        assert_eq!(
            context
                .compiled_fences()
                .fence(HardwareQueueClass::Compute)
                .pending_value(),
            second
        );
        // 其他类别不受影响
        assert_eq!(
            context
                .compiled_fences()
                .fence(HardwareQueueClass::Graphics)
                .pending_value(),
            1
        );
    }

    #[test]
    fn test_wait_for_idle_right_after_init() {
        let (mut context, _device) = context_with(3);
        let start = Instant::now();
        context.wait_for_idle().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_command_queues_are_distinct() {
        let (context, _device) = context_with(3);

        let names: Vec<&str> = HardwareQueueClass::ALL
            .iter()
            .map(|&class| {
                let queue = context.command_queue(class);
                assert!(queue.is_initialized());
                assert_eq!(queue.hardware_queue_class(), class);
                queue.name()
            })
            .collect();
        assert_eq!(names, vec!["Graphics Queue", "Compute Queue", "Copy Queue"]);

        let ids: Vec<_> = HardwareQueueClass::ALL
            .iter()
            .map(|&class| context.command_queue(class).thread_id().unwrap())
            .collect();
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);

        assert_eq!(context.command_queue_by_index(2).unwrap().name(), "Copy Queue");
        assert!(context.command_queue_by_index(3).is_err());
    }

    #[test]
    fn test_compute_isolated_from_graphics() {
        let (mut context, _device) = context_with(3);
        let value = context.increment_fence(HardwareQueueClass::Compute);

        context.begin().unwrap();
        context
            .execute_work(
                HardwareQueueClass::Compute,
                ExecuteWorkRequest::new(vec![nop(HardwareQueueClass::Compute)]).signal(value),
            )
            .unwrap();
        context.end().unwrap();
        context.wait_for_idle().unwrap();

        let fences = context.compiled_fences();
        assert_eq!(fences.fence(HardwareQueueClass::Compute).completed_value(), value);
        assert_eq!(fences.fence(HardwareQueueClass::Graphics).completed_value(), 0);
        assert_eq!(fences.fence(HardwareQueueClass::Graphics).state(), FenceState::Reset);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut never = CommandQueueContext::default();
        never.shutdown();
        never.shutdown();

        let (mut context, _device) = context_with(3);
        context.shutdown();
        context.shutdown();
        assert!(!context.is_initialized());
        assert!(context.begin().is_err());
    }

    #[test]
    fn test_frame_contract() {
        let (mut context, _device) = context_with(3);

        let err = context
            .execute_work(HardwareQueueClass::Graphics, ExecuteWorkRequest::default())
            .unwrap_err();
        assert!(matches!(err, DistQueueError::Graphics(GraphicsError::FrameNotActive(_))));
        assert!(context.end().is_err());

        context.begin().unwrap();
        assert!(context.is_frame_active());
        let err = context.begin().unwrap_err();
        assert!(matches!(err, DistQueueError::Graphics(GraphicsError::FrameAlreadyActive(0))));
        context.end().unwrap();
    }

    #[test]
    fn test_uninitialized_context() {
        let mut context = CommandQueueContext::default();
        assert!(context.begin().is_err());
        assert!(context.end().is_err());
        context.wait_for_idle().unwrap();
    }

    #[test]
    fn test_invalid_frames_in_flight() {
        let device: Arc<dyn GpuDevice> =
            Arc::new(SoftwareDevice::new(&SoftwareDeviceConfig::default()).unwrap());

        for frames_in_flight in [0, 1, FRAME_COUNT_MAX + 1] {
            let mut context = CommandQueueContext::new(CommandQueueContextDescriptor {
                frames_in_flight,
                ..Default::default()
            });
            let err = context.init(Arc::clone(&device)).unwrap_err();
            assert!(matches!(err, DistQueueError::Config(_)));
            assert!(!context.is_initialized());
        }
    }

    #[test]
    fn test_init_failure_leaves_context_unusable() {
        let config = SoftwareDeviceConfig {
            fence_limit: Some(4),
            ..Default::default()
        };
        let device = SoftwareDevice::new(&config).unwrap();
        let mut context = CommandQueueContext::default();

        let err = context.init(Arc::new(device)).unwrap_err();
        assert!(matches!(err, DistQueueError::Graphics(GraphicsError::ResourceCreation(_))));
        assert!(!context.is_initialized());
        assert_eq!(context.frame_fence_count(), 0);
        assert!(context.begin().is_err());
        context.shutdown();
        context.shutdown();
    }

    #[test]
    fn test_device_lost_during_end() {
        let (mut context, device) = context_with(2);

        context.begin().unwrap();
        context
            .execute_work(
                HardwareQueueClass::Graphics,
                ExecuteWorkRequest::new(vec![work(HardwareQueueClass::Graphics, "doomed", 20)]),
            )
            .unwrap();
        device.remove_device("GPU hang");

        let err = context.end().unwrap_err();
        assert!(err.is_device_lost());
        assert!(err.to_string().contains("GPU hang"));
        context.shutdown();
    }

    #[test]
    fn test_long_run_keeps_trace_bounded() {
        let device = SoftwareDevice::new(&SoftwareDeviceConfig {
            trace_capacity: 8,
            ..Default::default()
        })
        .unwrap();
        let mut context = CommandQueueContext::new(CommandQueueContextDescriptor::default());
        context.init(Arc::new(device.clone())).unwrap();

        for frame in 0..50u64 {
            let mut encoder = CommandEncoder::new(HardwareQueueClass::Graphics, "frame");
            encoder.begin().unwrap();
            encoder.marker(format!("frame-{}", frame)).unwrap();
            let list = encoder.finish().unwrap();

            context.begin().unwrap();
            context
                .execute_work(HardwareQueueClass::Graphics, ExecuteWorkRequest::new(vec![list]))
                .unwrap();
            context.end().unwrap();
        }
        context.wait_for_idle().unwrap();

        assert_eq!(device.trace().len(), 8);
        assert!(device.find_trace("frame-49").is_some());
        assert!(device.find_trace("frame-0").is_none());
        context.shutdown();
    }

    #[test]
    fn test_force_flush_waits_for_each_submission() {
        let device = SoftwareDevice::new(&SoftwareDeviceConfig::default()).unwrap();
        let mut context = CommandQueueContext::new(CommandQueueContextDescriptor {
            force_flush: true,
            ..Default::default()
        });
        context.init(Arc::new(device.clone())).unwrap();

        context.begin().unwrap();
        context
            .execute_work(
                HardwareQueueClass::Copy,
                ExecuteWorkRequest::new(vec![work(HardwareQueueClass::Copy, "flushed", 10)]),
            )
            .unwrap();
        // execute_work 返回时工作已经完成
        assert!(device.find_trace("flushed").is_some());
        context.end().unwrap();
    }

    #[test]
    fn test_cpu_timing_statistics() {
        let config = SoftwareDeviceConfig {
            present_cost_us: 1_000,
            ..Default::default()
        };
        let device = SoftwareDevice::new(&config).unwrap();
        let swap_chain = device.create_software_swap_chain("Main");
        let mut context = CommandQueueContext::default();
        context.init(Arc::new(device)).unwrap();

        context.begin().unwrap();
        context
            .execute_work(
                HardwareQueueClass::Graphics,
                ExecuteWorkRequest::new(vec![nop(HardwareQueueClass::Graphics)]).present(swap_chain),
            )
            .unwrap();
        context.end().unwrap();

        let mut statistics = CpuTimingStatistics::new();
        statistics.queue_statistics.push(QueueStatistics {
            name: "stale".to_string(),
            execute_duration: Duration::from_secs(1),
        });
        context.update_cpu_timing_statistics(&mut statistics);

        assert_eq!(statistics.queue_statistics.len(), 3);
        assert_eq!(statistics.queue_statistics[0].name, "Graphics Queue");
        assert!(statistics.present_duration >= Duration::from_millis(1));

        // begin 清空计时器
        context.begin().unwrap();
        context.update_cpu_timing_statistics(&mut statistics);
        assert_eq!(statistics.present_duration, Duration::ZERO);
        context.end().unwrap();
    }

    #[test]
    fn test_thread_observer_sees_every_queue() {
        let device = SoftwareDevice::new(&SoftwareDeviceConfig::default()).unwrap();
        let seen: Arc<Mutex<Vec<(HardwareQueueClass, String)>>> = Arc::default();

        let mut context = CommandQueueContext::default();
        let sink = Arc::clone(&seen);
        context.set_queue_thread_observer(Box::new(move |class, name, _thread| {
            sink.lock().unwrap().push((class, name.to_string()));
        }));
        context.init(Arc::new(device)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1], (HardwareQueueClass::Compute, "Compute Queue".to_string()));
    }

    #[test]
    fn test_descriptor_from_config() {
        let mut config = Config::default();
        config.device.frames_in_flight = 4;
        config.device.force_flush = true;
        config.queues.copy = "Upload".to_string();

        let descriptor = CommandQueueContextDescriptor::from(&config);
        assert_eq!(descriptor.frames_in_flight, 4);
        assert!(descriptor.force_flush);
        assert_eq!(descriptor.queue_names.name(HardwareQueueClass::Copy), "Upload");
    }
}
