//! # 进程管理器契约
//!
//! ## 核心意图（Why）
//! - 描述调度器消费的进程外进程管理器能力，以及调度器向其暴露的状态回调能力；
//! - 所有远端返回值只与唯一的成功哨兵比较，其余结果在边界处折叠为统一的内部错误，
//!   差异化的错误分类不会穿越该边界。
//!
//! ## 架构定位（Where）
//! - `ability-scheduler::app_scheduler::AppScheduler` 是本契约在进程内唯一的消费者；
//! - 测试替身位于 [`crate::testing`]（`test-util` Feature）。

use std::fmt;
use std::sync::Arc;

use crate::{
    state::ProcessAbilityState,
    token::AbilityToken,
    want::{AbilityInfo, ApplicationInfo},
};

/// 进程管理器调用的结果码。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AppMgrResultCode {
    ResultOk,
    ResultError,
    ErrorServiceNotReady,
    ErrorServiceNotConnected,
    ErrorKillApplication,
}

impl AppMgrResultCode {
    /// 是否为唯一的成功哨兵。
    pub fn is_ok(self) -> bool {
        matches!(self, AppMgrResultCode::ResultOk)
    }
}

impl fmt::Display for AppMgrResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AppMgrResultCode::ResultOk => "RESULT_OK",
            AppMgrResultCode::ResultError => "RESULT_ERROR",
            AppMgrResultCode::ErrorServiceNotReady => "ERROR_SERVICE_NOT_READY",
            AppMgrResultCode::ErrorServiceNotConnected => "ERROR_SERVICE_NOT_CONNECTED",
            AppMgrResultCode::ErrorKillApplication => "ERROR_KILL_APPLICATION",
        };
        f.write_str(text)
    }
}

/// 进程管理器报告能力状态变化时调用的回调。
///
/// # 教案式说明
/// - **意图 (Why)**：进程管理器异步回报“能力请求完成”，调度器据此推进记录；
/// - **契约 (What)**：`state` 为 [`ProcessAbilityState`] 的原始整数；实现不得阻塞调用线程。
pub trait AppStateCallback: Send + Sync {
    fn on_ability_request_done(&self, token: AbilityToken, state: i32);
}

/// 进程管理器客户端。
///
/// # 教案式说明
/// - **意图 (Why)**：把跨进程 RPC 抽象为同步 trait，调度器只负责比对结果码；
/// - **契约 (What)**：
///   - `load_ability`、`terminate_ability`、`kill_application` 为同步调用，可能阻塞调用线程；
///   - `update_ability_state`、`ability_behavior_analysis`、`kill_process_by_ability_token`
///     的返回值仅用于日志；
/// - **风险 (Trade-offs)**：实现内部不应重试，重试策略由更上层决定。
pub trait AppMgrClient: Send + Sync {
    fn connect_app_mgr_service(&self) -> AppMgrResultCode;

    fn register_app_state_callback(&self, callback: Arc<dyn AppStateCallback>) -> AppMgrResultCode;

    fn load_ability(
        &self,
        token: AbilityToken,
        pre_token: Option<AbilityToken>,
        ability_info: &AbilityInfo,
        app_info: &ApplicationInfo,
    ) -> AppMgrResultCode;

    fn terminate_ability(&self, token: AbilityToken) -> AppMgrResultCode;

    fn update_ability_state(
        &self,
        token: AbilityToken,
        state: ProcessAbilityState,
    ) -> AppMgrResultCode;

    fn ability_behavior_analysis(
        &self,
        token: AbilityToken,
        pre_token: Option<AbilityToken>,
        visibility: i32,
        perceptibility: i32,
        connection_state: i32,
    ) -> AppMgrResultCode;

    fn kill_process_by_ability_token(&self, token: AbilityToken) -> AppMgrResultCode;

    fn kill_application(&self, bundle_name: &str) -> AppMgrResultCode;
}
