//! DistQueue 演示程序
//!
//! 在软件参考设备上运行若干帧，每帧提交一条 拷贝 → 计算 → 图形 的依赖链，
//! 并输出每帧的 CPU 计时统计与帧节流等待。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 命令行覆盖
//! cargo run -- --frames-in-flight 2 --frames 16 --force-flush
//! ```
//!
//! # 依赖链
//!
//! ```text
//! Copy ──signal──▶ Compute ──signal──▶ Graphics ──▶ present
//! ```
//!
//! 三个队列之间只通过 compiled fence 建立顺序，同一队列内按提交顺序执行。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use dist_queue::core::config::DemoConfig;
use dist_queue::core::{log, Config, DistQueueError};
use dist_queue::gfx::{GpuDevice, GpuSwapChain, SoftwareDevice};
use dist_queue::renderer::{
    CommandEncoder, CommandList, CommandQueueContext, CommandQueueContextDescriptor,
    CpuTimingStatistics, ExecuteWorkRequest, HardwareQueueClass,
};
use dist_queue::{app_error, app_info, app_warn};

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（config.toml）
/// 2. 应用命令行参数覆盖
/// 3. 验证配置
/// 4. 初始化日志系统
/// 5. 创建设备与命令队列上下文，运行帧循环
fn main() {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");

    // 2. 应用命令行参数
    config.apply_args(std::env::args());

    // 3. 验证配置
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // 4. 初始化日志系统
    let log_file = if config.logging.file_output {
        Some(config.logging.log_file.as_str())
    } else {
        None
    };
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    app_info!(version = env!("CARGO_PKG_VERSION"), "DistQueue starting...");

    app_info!(
        backend = config.device.backend.name(),
        frames_in_flight = config.device.frames_in_flight,
        force_flush = config.device.force_flush,
        frames = config.demo.frame_count,
        "Device configuration"
    );
    if config.device.force_flush {
        app_warn!("force_flush is enabled, every submission waits for the GPU to go idle");
    }

    // 5. 运行
    if let Err(e) = run(&config) {
        let device_lost = e
            .downcast_ref::<DistQueueError>()
            .map_or(false, DistQueueError::is_device_lost);
        if device_lost {
            app_error!("GPU device lost, aborting: {:#}", e);
        } else {
            app_error!("DistQueue failed: {:#}", e);
        }
        eprintln!("DistQueue failed: {:#}", e);
        std::process::exit(1);
    }

    app_info!("DistQueue finished");
}

fn run(config: &Config) -> anyhow::Result<()> {
    let device = SoftwareDevice::new(&config.software).context("Failed to create software device")?;
    let swap_chain = device
        .create_swap_chain("Main")
        .context("Failed to create swap chain")?;

    let mut context = CommandQueueContext::new(CommandQueueContextDescriptor::from(config));
    context
        .init(Arc::new(device.clone()))
        .context("Failed to initialize command queue context")?;

    let mut statistics = CpuTimingStatistics::new();
    for frame in 0..config.demo.frame_count {
        render_frame(&mut context, &config.demo, &swap_chain, frame)
            .with_context(|| format!("Frame {} failed", frame))?;

        context.update_cpu_timing_statistics(&mut statistics);
        let pacing = context.pacing_metrics();
        app_info!(
            frame,
            slot = context.current_frame_index(),
            execute_us = statistics.total_execute_duration().as_micros() as u64,
            present_us = statistics.present_duration.as_micros() as u64,
            pacing_wait_us = pacing.last_wait().as_micros() as u64,
            "Frame complete"
        );
    }

    context.wait_for_idle().context("Failed to wait for idle")?;

    let pacing = context.pacing_metrics();
    app_info!(
        frames = pacing.frames(),
        total_wait_ms = pacing.total_wait().as_millis() as u64,
        gpu_commands = device.trace().len(),
        "Frame loop finished"
    );

    context.shutdown();
    Ok(())
}

/// 提交一帧：拷贝上传 → 计算 → 图形并 present
fn render_frame(
    context: &mut CommandQueueContext,
    demo: &DemoConfig,
    swap_chain: &Arc<dyn GpuSwapChain>,
    frame: u64,
) -> anyhow::Result<()> {
    context.begin()?;

    let copy_done = context.increment_fence(HardwareQueueClass::Copy);
    let upload = workload(HardwareQueueClass::Copy, "Upload", frame, demo.copy_work_us)?;
    context.execute_work(
        HardwareQueueClass::Copy,
        ExecuteWorkRequest::new(vec![upload]).signal(copy_done),
    )?;

    let compute_done = context.increment_fence(HardwareQueueClass::Compute);
    let simulate = workload(HardwareQueueClass::Compute, "Simulate", frame, demo.compute_work_us)?;
    context.execute_work(
        HardwareQueueClass::Compute,
        ExecuteWorkRequest::new(vec![simulate])
            .wait_for(HardwareQueueClass::Copy, copy_done)
            .signal(compute_done),
    )?;

    let draw = workload(HardwareQueueClass::Graphics, "Draw", frame, demo.graphics_work_us)?;
    context.execute_work(
        HardwareQueueClass::Graphics,
        ExecuteWorkRequest::new(vec![draw])
            .wait_for(HardwareQueueClass::Compute, compute_done)
            .present(Arc::clone(swap_chain)),
    )?;

    context.end()?;
    Ok(())
}

fn workload(
    class: HardwareQueueClass,
    pass: &str,
    frame: u64,
    micros: u64,
) -> dist_queue::core::Result<CommandList> {
    let label = format!("{} #{}", pass, frame);
    let mut encoder = CommandEncoder::new(class, label.clone());
    encoder.begin()?;
    encoder.marker(format!("{} begin", label))?;
    encoder.execute(label, Duration::from_micros(micros))?;
    encoder.finish()
}
