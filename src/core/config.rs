//! 配置管理模块
//!
//! 提供队列同步核心的配置加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [device]
//! backend = "software"
//! frames_in_flight = 3   # 2 ..= FRAME_COUNT_MAX
//! force_flush = false    # 每次提交后强制等待队列空闲（调试用）
//! hang_warning_ms = 2000
//!
//! [queues]
//! graphics = "Graphics Queue"
//! compute = "Compute Queue"
//! copy = "Copy Queue"
//!
//! [software]
//! timestamp_frequency = 1000000000
//! clock_drift_ppm = 0.0
//! present_cost_us = 0
//! trace_capacity = 4096  # 0 表示不记录 GPU 时间线
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::error::{ConfigError, Result};
use crate::renderer::command::HardwareQueueClass;

/// 同时在 GPU 上执行的最大帧数上限
///
/// 帧 Fence 环的大小为 `frames_in_flight - 1`，因此该常量同时限定了环的大小。
pub const FRAME_COUNT_MAX: u32 = 4;

/// 顶层配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// 设备配置
    #[serde(default)]
    pub device: DeviceConfig,

    /// 队列名称
    #[serde(default)]
    pub queues: QueueNames,

    /// 软件参考设备参数
    #[serde(default)]
    pub software: SoftwareDeviceConfig,

    /// 演示程序的工作负载
    #[serde(default)]
    pub demo: DemoConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 设备配置
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// 设备后端
    #[serde(default = "default_backend")]
    pub backend: DeviceBackend,

    /// 同时在飞的帧数
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: u32,

    /// 每次 execute_work 后强制等待所有队列空闲
    #[serde(default)]
    pub force_flush: bool,

    /// Fence 等待超过该时长时输出警告（0 表示不警告）
    #[serde(default = "default_hang_warning_ms")]
    pub hang_warning_ms: u64,
}

/// 设备后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackend {
    /// 软件参考设备（每个硬件队列一个 GPU 时间线线程）
    Software,
}

/// 三个硬件队列的诊断名称
#[derive(Debug, Clone, Deserialize)]
pub struct QueueNames {
    #[serde(default = "default_graphics_name")]
    pub graphics: String,
    #[serde(default = "default_compute_name")]
    pub compute: String,
    #[serde(default = "default_copy_name")]
    pub copy: String,
}

/// 软件参考设备配置
#[derive(Debug, Clone, Deserialize)]
pub struct SoftwareDeviceConfig {
    /// GPU 时间戳频率（ticks / 秒）
    #[serde(default = "default_timestamp_frequency")]
    pub timestamp_frequency: u64,

    /// GPU 时钟相对 CPU 时钟的漂移（百万分之一）
    #[serde(default)]
    pub clock_drift_ppm: f64,

    /// 每次 present 的模拟耗时（微秒）
    #[serde(default)]
    pub present_cost_us: u64,

    /// 允许创建的 Fence 数量上限，用于模拟资源耗尽
    #[serde(default)]
    pub fence_limit: Option<usize>,

    /// GPU 时间线执行记录的保留条数，超出后丢弃最旧的记录，0 表示不记录
    #[serde(default = "default_trace_capacity")]
    pub trace_capacity: usize,
}

/// 演示程序配置
#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    /// 运行的帧数
    #[serde(default = "default_frame_count")]
    pub frame_count: u64,

    /// 每帧图形队列的模拟工作量（微秒）
    #[serde(default = "default_graphics_work_us")]
    pub graphics_work_us: u64,

    /// 每帧计算队列的模拟工作量（微秒）
    #[serde(default = "default_compute_work_us")]
    pub compute_work_us: u64,

    /// 每帧拷贝队列的模拟工作量（微秒）
    #[serde(default = "default_copy_work_us")]
    pub copy_work_us: u64,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_backend() -> DeviceBackend { DeviceBackend::Software }
fn default_frames_in_flight() -> u32 { 3 }
fn default_hang_warning_ms() -> u64 { 2000 }
fn default_graphics_name() -> String { "Graphics Queue".to_string() }
fn default_compute_name() -> String { "Compute Queue".to_string() }
fn default_copy_name() -> String { "Copy Queue".to_string() }
fn default_timestamp_frequency() -> u64 { 1_000_000_000 }
fn default_trace_capacity() -> usize { 4096 }
fn default_frame_count() -> u64 { 8 }
fn default_graphics_work_us() -> u64 { 4000 }
fn default_compute_work_us() -> u64 { 2000 }
fn default_copy_work_us() -> u64 { 1000 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "dist_queue.log".to_string() }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            frames_in_flight: default_frames_in_flight(),
            force_flush: false,
            hang_warning_ms: default_hang_warning_ms(),
        }
    }
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            graphics: default_graphics_name(),
            compute: default_compute_name(),
            copy: default_copy_name(),
        }
    }
}

impl Default for SoftwareDeviceConfig {
    fn default() -> Self {
        Self {
            timestamp_frequency: default_timestamp_frequency(),
            clock_drift_ppm: 0.0,
            present_cost_us: 0,
            fence_limit: None,
            trace_capacity: default_trace_capacity(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frame_count: default_frame_count(),
            graphics_work_us: default_graphics_work_us(),
            compute_work_us: default_compute_work_us(),
            copy_work_us: default_copy_work_us(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl QueueNames {
    /// 按硬件队列类别取名称
    pub fn name(&self, class: HardwareQueueClass) -> &str {
        match class {
            HardwareQueueClass::Graphics => &self.graphics,
            HardwareQueueClass::Compute => &self.compute,
            HardwareQueueClass::Copy => &self.copy,
        }
    }
}

impl DeviceConfig {
    /// Fence 等待的挂起警告阈值
    pub fn hang_warning(&self) -> Option<Duration> {
        (self.hang_warning_ms > 0).then(|| Duration::from_millis(self.hang_warning_ms))
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.to_path_buf()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在或无法解析则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--frames-in-flight <value>`: 同时在飞的帧数
    /// - `--force-flush`: 每次提交后强制等待空闲
    /// - `--frames <value>`: 演示程序运行的帧数
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--force-flush") {
            self.device.force_flush = true;
        }

        if let Some(value) = arg_value(&args, "--frames-in-flight") {
            self.device.frames_in_flight = value;
        }

        if let Some(value) = arg_value(&args, "--frames") {
            self.demo.frame_count = value;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        let frames = self.device.frames_in_flight;
        if !(2..=FRAME_COUNT_MAX).contains(&frames) {
            return Err(ConfigError::InvalidValue {
                field: "device.frames_in_flight".to_string(),
                reason: format!("must be between 2 and {}, got {}", FRAME_COUNT_MAX, frames),
            }
            .into());
        }

        if self.software.timestamp_frequency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "software.timestamp_frequency".to_string(),
                reason: "Timestamp frequency must be greater than 0".to_string(),
            }
            .into());
        }

        for class in HardwareQueueClass::ALL {
            if self.queues.name(class).trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("queues.{}", class.name().to_lowercase()),
                    reason: "Queue name must not be empty".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

fn arg_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

impl DeviceBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            DeviceBackend::Software => "Software",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.frames_in_flight, 3);
        assert_eq!(config.device.backend, DeviceBackend::Software);
        assert!(!config.device.force_flush);
        assert_eq!(config.queues.name(HardwareQueueClass::Copy), "Copy Queue");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.device.frames_in_flight = 1;
        assert!(config.validate().is_err());

        config.device.frames_in_flight = FRAME_COUNT_MAX + 1;
        assert!(config.validate().is_err());

        config.device.frames_in_flight = 2;
        assert!(config.validate().is_ok());

        config.queues.compute = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [device]
            frames_in_flight = 2
            force_flush = true

            [queues]
            graphics = "Main"
            "#,
        )
        .unwrap();

        assert_eq!(config.device.frames_in_flight, 2);
        assert!(config.device.force_flush);
        assert_eq!(config.queues.graphics, "Main");
        assert_eq!(config.queues.compute, "Compute Queue");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.software.trace_capacity, 4096);
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(["dist_queue", "--force-flush", "--frames-in-flight", "2", "--frames", "30"]);

        assert!(config.device.force_flush);
        assert_eq!(config.device.frames_in_flight, 2);
        assert_eq!(config.demo.frame_count, 30);

        // 无法解析的值保持原样
        config.apply_args(["--frames", "many"]);
        assert_eq!(config.demo.frame_count, 30);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("does/not/exist.toml").unwrap_err();
        assert!(err.to_string().contains("exist.toml"));
        assert_eq!(Config::from_file_or_default("does/not/exist.toml").device.frames_in_flight, 3);
    }
}
