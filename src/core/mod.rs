//! 核心功能模块
//!
//! 本模块提供日志系统、配置管理和错误处理。
//! 这些模块独立于具体的设备后端，可以被任何子系统使用。
//!
//! # 模块组织
//!
//! - `log`：日志系统，基于 tracing 的结构化日志
//! - `config`：配置管理，支持从 TOML 文件加载设备与队列设置
//! - `error`：错误处理，定义统一的错误类型

pub mod log;
pub mod config;
pub mod error;

pub use error::{Result, DistQueueError, GraphicsError, ConfigError};
pub use config::{Config, FRAME_COUNT_MAX};
