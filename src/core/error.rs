//! 错误处理模块
//!
//! 定义了队列同步核心中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - **设备丢失**：GPU 设备被移除或 Fence 等待失败，不可重试，必须终止渲染循环
//! - **契约违反**：未初始化就使用、在帧外提交工作、无效的队列类别索引
//! - **资源耗尽**：初始化阶段创建 Fence 或队列失败

use std::path::PathBuf;

use thiserror::Error;

use crate::renderer::command::HardwareQueueClass;

/// 统一的 Result 类型
///
/// 所有可能返回错误的函数都应该使用这个类型。
pub type Result<T> = std::result::Result<T, DistQueueError>;

/// 顶层错误类型
#[derive(Debug, Error)]
pub enum DistQueueError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 图形设备 / 队列错误
    #[error("Graphics error: {0}")]
    Graphics(#[from] GraphicsError),

    /// IO 错误（例如无法创建提交线程）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 图形设备与队列相关的错误
#[derive(Debug, Error)]
pub enum GraphicsError {
    /// 设备创建失败
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// Fence / 队列 / 交换链创建失败
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// 设备丢失，不可恢复
    #[error(
        "Device lost while waiting on {} fence value {fence_value}: {reason}",
        describe_queue(.queue_class)
    )]
    DeviceLost {
        queue_class: Option<HardwareQueueClass>,
        fence_value: u64,
        reason: String,
    },

    /// 对象尚未初始化（或已经关闭）
    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    /// 在 begin/end 之外调用了帧内操作
    #[error("{0} called outside of a begin/end frame")]
    FrameNotActive(&'static str),

    /// 上一帧尚未 end 就再次 begin
    #[error("begin called while frame {0} is still open")]
    FrameAlreadyActive(u64),

    /// 无效的硬件队列类别索引
    #[error("Invalid hardware queue class index {0}")]
    InvalidQueueClass(usize),

    /// 命令提交失败
    #[error("Command execution failed: {0}")]
    CommandExecution(String),
}

fn describe_queue(queue_class: &Option<HardwareQueueClass>) -> String {
    match queue_class {
        Some(class) => format!("{} queue", class),
        None => "unknown queue".to_string(),
    }
}

impl DistQueueError {
    /// 是否为设备丢失错误
    pub fn is_device_lost(&self) -> bool {
        matches!(self, DistQueueError::Graphics(GraphicsError::DeviceLost { .. }))
    }
}

impl GraphicsError {
    /// 为设备丢失错误补充队列类别
    pub(crate) fn with_queue_class(self, class: HardwareQueueClass) -> Self {
        match self {
            GraphicsError::DeviceLost {
                queue_class: None,
                fence_value,
                reason,
            } => GraphicsError::DeviceLost {
                queue_class: Some(class),
                fence_value,
                reason,
            },
            other => other,
        }
    }
}

impl DistQueueError {
    pub(crate) fn with_queue_class(self, class: HardwareQueueClass) -> Self {
        match self {
            DistQueueError::Graphics(e) => DistQueueError::Graphics(e.with_queue_class(class)),
            other => other,
        }
    }
}
