//! 命令列表与提交请求模块
//!
//! 定义硬件队列类别、队列描述符、命令列表的记录方式，以及一次 `execute_work`
//! 提交所携带的全部信息。
//!
//! # 硬件队列类别
//!
//! - **Graphics**: 图形命令（同时支持计算和传输）
//! - **Compute**: 计算命令
//! - **Copy**: 传输专用命令
//!
//! 队列类别是一个固定的小枚举，在所有地方都作为稠密下标使用。

use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::GpuSwapChain;
use crate::renderer::sync::{FenceSignal, FenceValueSet};

/// 硬件队列类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum HardwareQueueClass {
    /// 图形队列
    #[default]
    Graphics = 0,
    /// 计算队列
    Compute = 1,
    /// 拷贝队列
    Copy = 2,
}

impl HardwareQueueClass {
    /// 类别数量
    pub const COUNT: usize = 3;

    /// 按下标顺序排列的全部类别
    pub const ALL: [HardwareQueueClass; HardwareQueueClass::COUNT] = [
        HardwareQueueClass::Graphics,
        HardwareQueueClass::Compute,
        HardwareQueueClass::Copy,
    ];

    /// 稠密下标
    pub fn index(self) -> usize {
        self as usize
    }

    /// 从下标转换，越界时返回错误
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| GraphicsError::InvalidQueueClass(index).into())
    }

    pub fn name(self) -> &'static str {
        match self {
            HardwareQueueClass::Graphics => "Graphics",
            HardwareQueueClass::Compute => "Compute",
            HardwareQueueClass::Copy => "Copy",
        }
    }
}

impl fmt::Display for HardwareQueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 以硬件队列类别为下标的定长数组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerQueue<T>(pub [T; HardwareQueueClass::COUNT]);

impl<T> Index<HardwareQueueClass> for PerQueue<T> {
    type Output = T;

    fn index(&self, class: HardwareQueueClass) -> &T {
        &self.0[class.index()]
    }
}

impl<T> IndexMut<HardwareQueueClass> for PerQueue<T> {
    fn index_mut(&mut self, class: HardwareQueueClass) -> &mut T {
        &mut self.0[class.index()]
    }
}

/// 同一类别下的队列子类（主队列 / 次队列）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareQueueSubclass {
    #[default]
    Primary,
    Secondary,
}

/// 命令队列描述符
#[derive(Debug, Clone)]
pub struct CommandQueueDescriptor {
    /// 硬件队列类别
    pub hardware_queue_class: HardwareQueueClass,
    /// 子类
    pub hardware_queue_subclass: HardwareQueueSubclass,
    /// 诊断名称（同时用作提交线程的名称）
    pub name: String,
}

impl CommandQueueDescriptor {
    /// 创建主队列描述符
    pub fn new(class: HardwareQueueClass, name: impl Into<String>) -> Self {
        Self {
            hardware_queue_class: class,
            hardware_queue_subclass: HardwareQueueSubclass::Primary,
            name: name.into(),
        }
    }

    /// 设置子类
    pub fn with_subclass(mut self, subclass: HardwareQueueSubclass) -> Self {
        self.hardware_queue_subclass = subclass;
        self
    }
}

/// GPU 命令
///
/// 着色器、资源与管线状态都不在本核心范围内，这里只描述执行时间线上可观察的行为。
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// 空操作
    Nop,
    /// 占用队列一段时间的工作
    Execute { label: String, duration: Duration },
    /// 执行到此处时写入时间线标记
    Marker(String),
}

/// 已完成记录的命令列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    name: String,
    queue_class: HardwareQueueClass,
    commands: Vec<GpuCommand>,
}

impl CommandList {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 记录时面向的队列类别，只能提交到同类别的队列
    pub fn queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// 命令列表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// 初始状态
    Initial,
    /// 正在记录
    Recording,
    /// 已完成记录
    Executable,
}

/// 命令编码器
///
/// 提供类型安全的命令记录接口：`begin` → 记录命令 → `finish`。
pub struct CommandEncoder {
    state: CommandListState,
    list: CommandList,
}

impl CommandEncoder {
    /// 创建新的命令编码器
    pub fn new(queue_class: HardwareQueueClass, name: impl Into<String>) -> Self {
        Self {
            state: CommandListState::Initial,
            list: CommandList {
                name: name.into(),
                queue_class,
                commands: Vec::new(),
            },
        }
    }

    /// 开始记录命令
    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            CommandListState::Initial => {
                self.state = CommandListState::Recording;
                Ok(())
            }
            _ => Err(GraphicsError::CommandExecution(format!(
                "Invalid state {:?} for begin on '{}'",
                self.state, self.list.name
            ))
            .into()),
        }
    }

    /// 记录空操作
    pub fn nop(&mut self) -> Result<()> {
        self.record(GpuCommand::Nop)
    }

    /// 记录一段模拟的执行工作
    pub fn execute(&mut self, label: impl Into<String>, duration: Duration) -> Result<()> {
        self.record(GpuCommand::Execute {
            label: label.into(),
            duration,
        })
    }

    /// 记录时间线标记
    pub fn marker(&mut self, label: impl Into<String>) -> Result<()> {
        self.record(GpuCommand::Marker(label.into()))
    }

    fn record(&mut self, command: GpuCommand) -> Result<()> {
        if self.state != CommandListState::Recording {
            return Err(GraphicsError::CommandExecution(format!(
                "Must be in recording state to record into '{}'",
                self.list.name
            ))
            .into());
        }
        self.list.commands.push(command);
        Ok(())
    }

    /// 结束记录并返回命令列表
    pub fn finish(mut self) -> Result<CommandList> {
        match self.state {
            CommandListState::Recording => {
                self.state = CommandListState::Executable;
                Ok(self.list)
            }
            _ => Err(GraphicsError::CommandExecution(format!(
                "Invalid state {:?} for finish on '{}'",
                self.state, self.list.name
            ))
            .into()),
        }
    }

    /// 获取当前状态
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// 编码器面向的队列类别
    pub fn queue_class(&self) -> HardwareQueueClass {
        self.list.queue_class
    }
}

/// 一次 `execute_work` 提交
///
/// 在命令线程上按以下顺序处理：
/// 1. 对 `wait_fences` 中每个非零值，在 GPU 上等待对应类别的 compiled fence
/// 2. 执行 `command_lists`
/// 3. `signal_fence` 非零时，signal 本队列类别的 compiled fence
/// 4. signal `user_fences_to_signal`
/// 5. present `swap_chains_to_present`
#[derive(Default)]
pub struct ExecuteWorkRequest {
    pub command_lists: Vec<CommandList>,
    pub wait_fences: FenceValueSet,
    pub signal_fence: u64,
    pub user_fences_to_signal: Vec<FenceSignal>,
    pub swap_chains_to_present: Vec<Arc<dyn GpuSwapChain>>,
}

impl ExecuteWorkRequest {
    /// 只包含命令列表的提交
    pub fn new(command_lists: Vec<CommandList>) -> Self {
        Self {
            command_lists,
            ..Default::default()
        }
    }

    /// 在执行前等待另一个队列的 compiled fence 值
    pub fn wait_for(mut self, class: HardwareQueueClass, value: u64) -> Self {
        let slot = &mut self.wait_fences[class];
        *slot = (*slot).max(value);
        self
    }

    /// 执行后 signal 本队列的 compiled fence
    pub fn signal(mut self, value: u64) -> Self {
        self.signal_fence = value;
        self
    }

    /// 执行后 signal 一个用户 fence
    pub fn signal_user_fence(mut self, signal: FenceSignal) -> Self {
        self.user_fences_to_signal.push(signal);
        self
    }

    /// 执行后 present 交换链
    pub fn present(mut self, swap_chain: Arc<dyn GpuSwapChain>) -> Self {
        self.swap_chains_to_present.push(swap_chain);
        self
    }
}

impl fmt::Debug for ExecuteWorkRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteWorkRequest")
            .field("command_lists", &self.command_lists.len())
            .field("wait_fences", &self.wait_fences)
            .field("signal_fence", &self.signal_fence)
            .field("user_fences_to_signal", &self.user_fences_to_signal.len())
            .field("swap_chains_to_present", &self.swap_chains_to_present.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_class_indexing() {
        for (i, class) in HardwareQueueClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
            assert_eq!(HardwareQueueClass::from_index(i).unwrap(), *class);
        }
        assert!(HardwareQueueClass::from_index(HardwareQueueClass::COUNT).is_err());
        assert_eq!(HardwareQueueClass::Compute.to_string(), "Compute");
    }

    #[test]
    fn test_per_queue_index() {
        let mut values = PerQueue([0u32; HardwareQueueClass::COUNT]);
        values[HardwareQueueClass::Copy] = 7;
        assert_eq!(values.0, [0, 0, 7]);
        assert_eq!(values[HardwareQueueClass::Graphics], 0);
    }

    #[test]
    fn test_command_encoder_state_machine() {
        let mut encoder = CommandEncoder::new(HardwareQueueClass::Graphics, "frame");
        assert_eq!(encoder.state(), CommandListState::Initial);

        // 未开始记录时不能写命令
        assert!(encoder.nop().is_err());

        encoder.begin().unwrap();
        assert_eq!(encoder.state(), CommandListState::Recording);

        // 不能重复开始
        assert!(encoder.begin().is_err());

        encoder.execute("draw", Duration::from_millis(1)).unwrap();
        encoder.marker("done").unwrap();

        let list = encoder.finish().unwrap();
        assert_eq!(list.name(), "frame");
        assert_eq!(list.queue_class(), HardwareQueueClass::Graphics);
        assert_eq!(list.len(), 2);
        assert_eq!(list.commands()[1], GpuCommand::Marker("done".to_string()));
    }

    #[test]
    fn test_finish_without_begin() {
        let encoder = CommandEncoder::new(HardwareQueueClass::Copy, "upload");
        assert_eq!(encoder.queue_class(), HardwareQueueClass::Copy);
        assert!(encoder.finish().is_err());
    }

    #[test]
    fn test_execute_work_request_builder() {
        let request = ExecuteWorkRequest::new(vec![CommandList::default()])
            .wait_for(HardwareQueueClass::Copy, 4)
            .wait_for(HardwareQueueClass::Copy, 2)
            .signal(9);

        assert_eq!(request.wait_fences[HardwareQueueClass::Copy], 4);
        assert_eq!(request.wait_fences[HardwareQueueClass::Graphics], 0);
        assert_eq!(request.signal_fence, 9);
        assert!(request.user_fences_to_signal.is_empty());
    }

    #[test]
    fn test_descriptor() {
        let desc = CommandQueueDescriptor::new(HardwareQueueClass::Compute, "Async Compute")
            .with_subclass(HardwareQueueSubclass::Secondary);
        assert_eq!(desc.hardware_queue_class, HardwareQueueClass::Compute);
        assert_eq!(desc.hardware_queue_subclass, HardwareQueueSubclass::Secondary);
        assert_eq!(desc.name, "Async Compute");
    }
}
