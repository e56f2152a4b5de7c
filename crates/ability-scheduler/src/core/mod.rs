//! 能力栈管理器及其驱动：状态机、超时与任务循环。

pub mod service;
pub mod stack_manager;
pub mod timeout;

pub use service::{ManagerCommand, ManagerHandle, ManagerService};
pub use stack_manager::{AbilityStackManager, ManagerSnapshot, StackKind};
pub use timeout::{ArmedTimeout, ManualTimeouts, TimeoutScheduler, TokioTimeouts};
