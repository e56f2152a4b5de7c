//! 单消费者任务循环：串行执行能力栈管理器上的全部修改。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：管理器不加锁，所有入口（启动请求、能力线程回连、进程管理器回报、超时）
//!   都以 [`ManagerCommand`] 投递到同一条通道，由 [`ManagerService`] 按到达顺序逐条处理；
//! - **设计手法 (How)**：`mpsc::unbounded_channel` 承载命令，需要结果的命令随附 `oneshot` 应答端；
//!   [`ManagerHandle`] 是可廉价克隆的调用方句柄，同时实现 [`AppStateCallback`] 以便直接注册为观察者；
//! - **风险提示 (Trade-offs)**：通道无界，背压由等待队列容量与调用方节奏共同约束。

use ability_core::{
    AbilityError, AbilityRequest, AbilitySchedulerHandle, AbilityToken, AppStateCallback, EventId,
    StartOutcome, TimeoutKind,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{
    stack_manager::{AbilityStackManager, ManagerSnapshot},
    timeout::TokioTimeouts,
};
use crate::context::SchedulerContext;

type Reply<T> = oneshot::Sender<T>;

/// 投递到管理器任务的命令。
#[derive(Debug)]
pub enum ManagerCommand {
    StartAbility {
        request: AbilityRequest,
        reply: Reply<Result<StartOutcome, AbilityError>>,
    },
    AttachAbilityThread {
        scheduler: Option<AbilitySchedulerHandle>,
        token: Option<AbilityToken>,
        reply: Reply<Result<(), AbilityError>>,
    },
    AbilityTransitionDone {
        token: Option<AbilityToken>,
        target_state: i32,
        reply: Reply<Result<(), AbilityError>>,
    },
    EnqueueWaitting {
        request: AbilityRequest,
        reply: Reply<Result<(), AbilityError>>,
    },
    RemoveAbilityRecord {
        token: Option<AbilityToken>,
        reply: Reply<bool>,
    },
    DumpState {
        reply: Reply<Vec<String>>,
    },
    Snapshot {
        reply: Reply<ManagerSnapshot>,
    },
    AbilityRequestDone {
        token: AbilityToken,
        state: i32,
    },
    AbilityDied {
        token: AbilityToken,
    },
    TimeOut {
        kind: TimeoutKind,
        event_id: EventId,
    },
    Shutdown,
}

/// 管理器任务。
#[derive(Debug)]
pub struct ManagerService {
    manager: AbilityStackManager,
    receiver: mpsc::UnboundedReceiver<ManagerCommand>,
}

impl ManagerService {
    /// 创建管理器并在当前 tokio 运行时上启动任务循环。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：必须在 tokio 运行时内调用；返回的句柄全部释放或收到 `Shutdown` 后任务退出；
    /// - **执行 (How)**：超时调度器拿到的是命令通道的弱发送端，不会延长任务生命周期。
    pub fn spawn(
        context: &SchedulerContext,
        user_id: i32,
        kind: super::stack_manager::StackKind,
    ) -> (ManagerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let timeouts = TokioTimeouts::new(sender.downgrade());
        let manager = AbilityStackManager::new(
            user_id,
            kind,
            context.app_scheduler().clone(),
            context.config().clone(),
            Box::new(timeouts),
        );
        let service = ManagerService { manager, receiver };
        let join = tokio::spawn(service.run());
        (ManagerHandle { sender }, join)
    }

    async fn run(mut self) {
        let user_id = self.manager.get_manager_user_id();
        info!(user_id, "ability stack manager task started");
        while let Some(command) = self.receiver.recv().await {
            if !self.handle(command) {
                break;
            }
        }
        info!(user_id, "ability stack manager task stopped");
    }

    /// 处理一条命令，返回 `false` 表示退出循环。
    fn handle(&mut self, command: ManagerCommand) -> bool {
        match command {
            ManagerCommand::StartAbility { request, reply } => {
                let _ = reply.send(self.manager.start_ability(request));
            }
            ManagerCommand::AttachAbilityThread {
                scheduler,
                token,
                reply,
            } => {
                let _ = reply.send(self.manager.attach_ability_thread(scheduler, token));
            }
            ManagerCommand::AbilityTransitionDone {
                token,
                target_state,
                reply,
            } => {
                let _ = reply.send(self.manager.ability_transition_done(token, target_state));
            }
            ManagerCommand::EnqueueWaitting { request, reply } => {
                let _ = reply.send(self.manager.enqueue_waitting_ability(request));
            }
            ManagerCommand::RemoveAbilityRecord { token, reply } => {
                let _ = reply.send(self.manager.remove_ability_record(token));
            }
            ManagerCommand::DumpState { reply } => {
                let mut lines = Vec::new();
                self.manager.dump_state(&mut lines);
                let _ = reply.send(lines);
            }
            ManagerCommand::Snapshot { reply } => {
                let _ = reply.send(self.manager.snapshot());
            }
            ManagerCommand::AbilityRequestDone { token, state } => {
                self.manager.on_ability_request_done(token, state);
            }
            ManagerCommand::AbilityDied { token } => self.manager.on_ability_died(token),
            ManagerCommand::TimeOut { kind, event_id } => self.manager.on_time_out(kind, event_id),
            ManagerCommand::Shutdown => return false,
        }
        true
    }
}

/// 管理器任务的调用方句柄。
///
/// # 教案式注释
/// - **意图 (Why)**：调用方无需接触管理器本体，只需投递命令并等待应答；
/// - **契约 (What)**：任务已退出时所有请求返回 [`AbilityError::ManagerClosed`]；
///   通知类方法（死亡、回报）不等待处理结果。
#[derive(Clone, Debug)]
pub struct ManagerHandle {
    sender: mpsc::UnboundedSender<ManagerCommand>,
}

impl ManagerHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ManagerCommand,
    ) -> Result<T, AbilityError> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(build(reply))
            .map_err(|_| AbilityError::ManagerClosed)?;
        receiver.await.map_err(|_| AbilityError::ManagerClosed)
    }

    pub async fn start_ability(&self, request: AbilityRequest) -> Result<StartOutcome, AbilityError> {
        self.call(|reply| ManagerCommand::StartAbility { request, reply })
            .await?
    }

    /// 同步版本的启动入口，供运行时之外的线程使用。
    ///
    /// - **契约 (What)**：不得在异步上下文中调用（内部使用阻塞接收），否则 tokio 会 panic。
    pub fn start_ability_blocking(
        &self,
        request: AbilityRequest,
    ) -> Result<StartOutcome, AbilityError> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(ManagerCommand::StartAbility { request, reply })
            .map_err(|_| AbilityError::ManagerClosed)?;
        receiver
            .blocking_recv()
            .map_err(|_| AbilityError::ManagerClosed)?
    }

    pub async fn attach_ability_thread(
        &self,
        scheduler: Option<AbilitySchedulerHandle>,
        token: Option<AbilityToken>,
    ) -> Result<(), AbilityError> {
        self.call(|reply| ManagerCommand::AttachAbilityThread {
            scheduler,
            token,
            reply,
        })
        .await?
    }

    pub async fn ability_transition_done(
        &self,
        token: Option<AbilityToken>,
        target_state: i32,
    ) -> Result<(), AbilityError> {
        self.call(|reply| ManagerCommand::AbilityTransitionDone {
            token,
            target_state,
            reply,
        })
        .await?
    }

    pub async fn enqueue_waitting_ability(&self, request: AbilityRequest) -> Result<(), AbilityError> {
        self.call(|reply| ManagerCommand::EnqueueWaitting { request, reply })
            .await?
    }

    pub async fn remove_ability_record(
        &self,
        token: Option<AbilityToken>,
    ) -> Result<bool, AbilityError> {
        self.call(|reply| ManagerCommand::RemoveAbilityRecord { token, reply })
            .await
    }

    pub async fn dump_state(&self) -> Result<Vec<String>, AbilityError> {
        self.call(|reply| ManagerCommand::DumpState { reply }).await
    }

    pub async fn snapshot(&self) -> Result<ManagerSnapshot, AbilityError> {
        self.call(|reply| ManagerCommand::Snapshot { reply }).await
    }

    /// 通知能力所在进程已死亡。
    pub fn notify_ability_died(&self, token: AbilityToken) {
        self.post(ManagerCommand::AbilityDied { token });
    }

    /// 请求任务退出；已在通道中的命令会先于退出被处理。
    pub fn shutdown(&self) {
        self.post(ManagerCommand::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn post(&self, command: ManagerCommand) {
        if let Err(err) = self.sender.send(command) {
            warn!(command = ?err.0, "ability stack manager is gone, command dropped");
        }
    }
}

impl AppStateCallback for ManagerHandle {
    fn on_ability_request_done(&self, token: AbilityToken, state: i32) {
        debug!(%token, state, "posting ability request done");
        self.post(ManagerCommand::AbilityRequestDone { token, state });
    }
}
