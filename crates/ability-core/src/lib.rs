//! # ability-core
//!
//! ## 定位与职责（Why）
//! - 承载能力（Ability）生命周期调度的核心契约：身份令牌、启动请求、能力记录、生命周期状态机，
//!   以及与进程外进程管理器交互所需的 trait；
//! - 调度实现位于 `ability-scheduler`，本 crate 不包含任何线程、定时器或运行时依赖，
//!   以便契约在测试与替身实现之间复用。
//!
//! ## 架构嵌入（Where）
//! - `token`：能力令牌与超时事件标识；
//! - `want`：启动意图与能力/应用描述；
//! - `state`：记录状态机、进程管理器原始状态及其粗粒度投影；
//! - `record`：单个驻留能力的簿记对象；
//! - `ability_thread`：远端能力线程句柄（真实实现与测试替身的标签变体）；
//! - `app_mgr`：进程管理器客户端与状态回调契约；
//! - `config`：调度超时与队列策略配置；
//! - `error`：统一错误域与粗粒度状态码。
//!
//! ## Feature 策略（Trade-offs）
//! - `test-util` 打开后导出 [`testing`] 模块中的进程管理器替身，生产构建不会包含这些类型。

pub mod ability_thread;
pub mod app_mgr;
pub mod config;
pub mod error;
pub mod record;
pub mod state;
pub mod token;
pub mod want;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use ability_thread::{
    AbilitySchedulerHandle, AbilityThread, LifecycleTransaction, MockAbilityThread,
};
pub use app_mgr::{AppMgrClient, AppMgrResultCode, AppStateCallback};
pub use config::{ConfigError, SchedulerConfig, TimeoutKind};
pub use error::{AbilityError, ErrorCode, StartOutcome};
pub use record::{AbilityRecord, AbilityRecordSnapshot};
pub use state::{AbilityState, AppAbilityState, ProcessAbilityState};
pub use token::{AbilityToken, EventId, EventIdGenerator};
pub use want::{AbilityInfo, AbilityRequest, AbilityType, ApplicationInfo, ElementName, Want};

/// 常用的系统 UI 能力标识。
///
/// - **意图 (Why)**：内核系统能力（状态栏、导航栏）由调度器直接拉起，测试与启动流程需要稳定的名称；
/// - **契约 (What)**：字符串仅用于去重键与诊断输出，不参与任何持久化。
pub mod well_known {
    /// 系统 UI 所在的包名。
    pub const SYSTEM_UI_BUNDLE_NAME: &str = "com.ohos.systemui";
    /// 状态栏能力名。
    pub const SYSTEM_UI_STATUS_BAR: &str = "com.ohos.systemui.statusbar.MainAbility";
    /// 导航栏能力名。
    pub const SYSTEM_UI_NAVIGATION_BAR: &str = "com.ohos.systemui.navigationbar.MainAbility";
}
