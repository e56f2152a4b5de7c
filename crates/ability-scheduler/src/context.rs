//! 进程级调度上下文与运行时装配。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：进程内只有一个通往进程管理器的网关。上下文在启动时构造一次，
//!   以 `Arc` 显式传递给需要它的组件，而不是依赖惰性全局单例；
//! - **设计手法 (How)**：[`SchedulerContext::launch`] 启动管理器任务，把管理器句柄注册为网关的观察者，
//!   并把注册守卫与任务句柄一起交给 [`AbilityRuntime`] 持有；
//! - **风险提示 (Trade-offs)**：同一上下文多次 `launch` 时，最后一次注册的管理器接收进程管理器回报。

use std::sync::Arc;

use ability_core::{AbilityError, AppMgrClient, AppStateCallback, ConfigError, SchedulerConfig};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{
    app_scheduler::{AppScheduler, ObserverRegistration},
    core::{ManagerHandle, ManagerService, StackKind},
};

/// 进程级调度上下文。
#[derive(Debug)]
pub struct SchedulerContext {
    app_scheduler: Arc<AppScheduler>,
    config: SchedulerConfig,
}

impl SchedulerContext {
    /// 以校验后的配置构造上下文。
    pub fn new(
        client: Option<Arc<dyn AppMgrClient>>,
        config: SchedulerConfig,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Arc::new(Self {
            app_scheduler: AppScheduler::new(client),
            config,
        }))
    }

    pub fn app_scheduler(&self) -> &Arc<AppScheduler> {
        &self.app_scheduler
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 启动一个能力栈管理器并接入进程管理器回报。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - 必须在 tokio 运行时内调用；
    ///   - 网关初始化失败时，已启动的管理器任务被关闭，错误原样返回；
    /// - **后置条件**：进程管理器的 `FOREGROUND` 等回报经网关转交到该管理器的命令通道。
    pub fn launch(&self, user_id: i32, kind: StackKind) -> Result<AbilityRuntime, AbilityError> {
        let (handle, join) = ManagerService::spawn(self, user_id, kind);
        let observer: Arc<dyn AppStateCallback> = Arc::new(handle.clone());
        match self.app_scheduler.init(Some(observer)) {
            Ok(registration) => {
                info!(user_id, kind = kind.as_str(), "ability runtime launched");
                Ok(AbilityRuntime {
                    handle,
                    registration,
                    join,
                })
            }
            Err(err) => {
                error!(user_id, error = %err, "failed to wire app scheduler, stopping manager");
                handle.shutdown();
                Err(err)
            }
        }
    }
}

/// 已启动的能力栈管理器及其接线。
#[derive(Debug)]
pub struct AbilityRuntime {
    handle: ManagerHandle,
    registration: ObserverRegistration,
    join: JoinHandle<()>,
}

impl AbilityRuntime {
    pub fn handle(&self) -> &ManagerHandle {
        &self.handle
    }

    /// 网关上的观察者注册是否仍指向本运行时。
    pub fn is_observing(&self) -> bool {
        self.registration.is_active()
    }

    /// 撤销观察者注册、关闭管理器任务并等待其退出。
    pub async fn shutdown(self) {
        let AbilityRuntime {
            handle,
            registration,
            join,
        } = self;
        drop(registration);
        handle.shutdown();
        if let Err(err) = join.await {
            error!(error = %err, "ability stack manager task ended abnormally");
        }
    }
}
