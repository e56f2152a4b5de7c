//! # ability-scheduler
//!
//! ## 定位与职责（Why）
//! - 能力生命周期调度器：负责拉起、跟踪并切换系统 UI 与普通应用能力，同时与进程外的进程管理器协作；
//! - 由两部分紧密协作：[`AppScheduler`] 是通往进程管理器的唯一网关，
//!   [`AbilityStackManager`] 持有驻留记录、FIFO 等待队列与每条记录的生命周期状态机。
//!
//! ## 架构嵌入（Where）
//! - `app_scheduler`：网关、粗粒度状态投影与观察者注册；
//! - `core::stack_manager`：准入控制、状态机、超时与死亡恢复；
//! - `core::timeout`：以事件编号为键的超时调度；
//! - `core::service`：单消费者命令循环与调用方句柄；
//! - `context`：进程级上下文与运行时装配；
//! - `observability`：`tracing-subscriber` 安装入口。
//!
//! ## 并发模型（How）
//! - 管理器的全部修改都在一个 tokio 任务上串行执行，外部通过 [`ManagerHandle`] 投递命令并等待应答；
//! - 网关内部的共享状态由 `parking_lot` 锁保护，临界区内不跨越远端调用。

pub mod app_scheduler;
pub mod context;
pub mod core;
pub mod observability;

pub use app_scheduler::{AppScheduler, ObserverRegistration};
pub use context::{AbilityRuntime, SchedulerContext};
pub use crate::core::{
    AbilityStackManager, ArmedTimeout, ManagerCommand, ManagerHandle, ManagerService,
    ManagerSnapshot, ManualTimeouts, StackKind, TimeoutScheduler, TokioTimeouts,
};
pub use observability::ObservabilityError;
