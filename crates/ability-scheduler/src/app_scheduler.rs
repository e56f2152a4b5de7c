//! # AppScheduler：进程管理器网关
//!
//! ## 核心意图（Why）
//! - 作为进程内通往进程外进程管理器的唯一桥梁，转发加载、终止、前后台切换与杀进程命令；
//! - 接收进程管理器的异步回报，维护全局粗粒度的 [`AppAbilityState`] 投影，并转交给注册的观察者。
//!
//! ## 行为契约（What）
//! - 每条命令先检查连接是否存在；无连接是确定性的同步失败，本层不做重试；
//! - `move_to_foreground`/`move_to_background` 只下发命令，不改写投影，投影只由回报驱动；
//! - 观察者通过 [`ObserverRegistration`] 显式注册：守卫析构时按代号撤销注册，重新初始化会使旧守卫失效。
//!
//! ## 风险提示（Trade-offs）
//! - 远端调用期间不持有任何锁，以免回报在同一线程上重入时死锁；
//! - 投影是全局最后写入者胜出，不区分能力。

use std::sync::{Arc, Weak};

use ability_core::{
    AbilityError, AbilityInfo, AbilityToken, AppAbilityState, AppMgrClient, AppStateCallback,
    ApplicationInfo, ProcessAbilityState,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// 观察者插槽：当前观察者及其注册代号。
#[derive(Default)]
struct ObserverSlot {
    generation: u64,
    observer: Option<Arc<dyn AppStateCallback>>,
}

/// 观察者注册守卫。
///
/// # 教案式说明
/// - **意图 (Why)**：以显式注册 + 代号替代弱引用，观察者的所有者析构守卫即可撤销注册，
///   网关内部不会残留指向已销毁观察者的强引用；
/// - **契约 (What)**：只有代号仍为当前值时，析构才会清空插槽；被重新初始化覆盖后，旧守卫析构不产生副作用。
#[must_use = "dropping the registration unregisters the observer"]
pub struct ObserverRegistration {
    slot: Arc<Mutex<ObserverSlot>>,
    generation: u64,
}

impl ObserverRegistration {
    /// 注册是否仍然生效。
    pub fn is_active(&self) -> bool {
        let slot = self.slot.lock();
        slot.generation == self.generation && slot.observer.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for ObserverRegistration {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.generation == self.generation {
            slot.observer = None;
            debug!(generation = self.generation, "app state observer unregistered");
        }
    }
}

impl std::fmt::Debug for ObserverRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistration")
            .field("generation", &self.generation)
            .finish()
    }
}

/// 注册给进程管理器的回调适配器，只持有网关的弱引用，避免网关与客户端互相持有。
struct GatewayCallback {
    scheduler: Weak<AppScheduler>,
}

impl AppStateCallback for GatewayCallback {
    fn on_ability_request_done(&self, token: AbilityToken, state: i32) {
        match self.scheduler.upgrade() {
            Some(scheduler) => scheduler.on_ability_request_done(token, state),
            None => debug!(%token, state, "app scheduler dropped, ignoring ability state report"),
        }
    }
}

/// 进程管理器网关。
///
/// # 教案式注释
/// - **意图 (Why)**：封装客户端连接与观察者插槽，避免管理器直接接触跨进程接口；
/// - **契约 (What)**：通过 `Arc` 在进程内共享，由 `SchedulerContext` 构造一次后按句柄传递；
/// - **风险 (Trade-offs)**：连接存活仅以“客户端已设置”判定，断线检测属于客户端实现。
pub struct AppScheduler {
    client: RwLock<Option<Arc<dyn AppMgrClient>>>,
    observer: Arc<Mutex<ObserverSlot>>,
    ability_state: Mutex<AppAbilityState>,
}

impl AppScheduler {
    /// 以可选的客户端创建网关。
    pub fn new(client: Option<Arc<dyn AppMgrClient>>) -> Arc<Self> {
        Arc::new(Self {
            client: RwLock::new(client),
            observer: Arc::new(Mutex::new(ObserverSlot::default())),
            ability_state: Mutex::new(AppAbilityState::Undefined),
        })
    }

    /// 替换（或断开）进程管理器连接。
    pub fn set_client(&self, client: Option<Arc<dyn AppMgrClient>>) {
        *self.client.write() = client;
    }

    pub fn is_connected(&self) -> bool {
        self.client.read().is_some()
    }

    fn client(&self) -> Option<Arc<dyn AppMgrClient>> {
        self.client.read().clone()
    }

    /// 注册观察者并建立与进程管理器的连接。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - `observer` 为空返回 [`AbilityError::InvalidValue`]；
    ///   - 无客户端、连接失败或回调注册失败返回 [`AbilityError::Inner`]，插槽保持原状；
    ///   - **后置条件**：成功时观察者以新代号写入插槽，此前的注册随之失效。
    /// - **执行 (How)**：向客户端注册的是只持弱引用的适配器，而不是网关本身。
    pub fn init(
        self: &Arc<Self>,
        observer: Option<Arc<dyn AppStateCallback>>,
    ) -> Result<ObserverRegistration, AbilityError> {
        let Some(observer) = observer else {
            error!("app state observer is null, app scheduler init failed");
            return Err(AbilityError::InvalidValue {
                context: "app state observer is null".to_owned(),
            });
        };
        let client = self.client().ok_or_else(|| {
            error!("app manager client is not available");
            AbilityError::inner("init", "app manager client is not available")
        })?;

        let result = client.connect_app_mgr_service();
        if !result.is_ok() {
            error!(%result, "failed to connect app manager service");
            return Err(AbilityError::inner("connect_app_mgr_service", result.to_string()));
        }

        let callback: Arc<dyn AppStateCallback> = Arc::new(GatewayCallback {
            scheduler: Arc::downgrade(self),
        });
        let result = client.register_app_state_callback(callback);
        if !result.is_ok() {
            error!(%result, "failed to register app state callback");
            return Err(AbilityError::inner(
                "register_app_state_callback",
                result.to_string(),
            ));
        }

        let mut slot = self.observer.lock();
        slot.generation += 1;
        slot.observer = Some(observer);
        info!(generation = slot.generation, "app scheduler initialized");
        Ok(ObserverRegistration {
            slot: Arc::clone(&self.observer),
            generation: slot.generation,
        })
    }

    /// 请求进程管理器加载能力。
    pub fn load_ability(
        &self,
        token: AbilityToken,
        pre_token: Option<AbilityToken>,
        ability_info: &AbilityInfo,
        app_info: &ApplicationInfo,
    ) -> Result<(), AbilityError> {
        let client = self
            .client()
            .ok_or_else(|| AbilityError::inner("load_ability", "app manager client is not connected"))?;
        let result = client.load_ability(token, pre_token, ability_info, app_info);
        if !result.is_ok() {
            error!(%token, %result, bundle = %ability_info.bundle_name, "app manager failed to load ability");
            return Err(AbilityError::inner("load_ability", result.to_string()));
        }
        debug!(%token, bundle = %ability_info.bundle_name, ability = %ability_info.name, "load ability requested");
        Ok(())
    }

    /// 请求进程管理器终止能力。
    pub fn terminate_ability(&self, token: AbilityToken) -> Result<(), AbilityError> {
        let client = self.client().ok_or_else(|| {
            AbilityError::inner("terminate_ability", "app manager client is not connected")
        })?;
        let result = client.terminate_ability(token);
        if !result.is_ok() {
            error!(%token, %result, "app manager failed to terminate ability");
            return Err(AbilityError::inner("terminate_ability", result.to_string()));
        }
        Ok(())
    }

    /// 请求能力切到前台；无连接时只记录日志。
    pub fn move_to_foreground(&self, token: AbilityToken) {
        self.update_ability_state(token, ProcessAbilityState::Foreground);
    }

    /// 请求能力切到后台；无连接时只记录日志。
    pub fn move_to_background(&self, token: AbilityToken) {
        self.update_ability_state(token, ProcessAbilityState::Background);
    }

    fn update_ability_state(&self, token: AbilityToken, state: ProcessAbilityState) {
        let Some(client) = self.client() else {
            warn!(%token, ?state, "app manager client is not connected, state update dropped");
            return;
        };
        let result = client.update_ability_state(token, state);
        if !result.is_ok() {
            warn!(%token, ?state, %result, "app manager rejected ability state update");
        }
    }

    /// 向进程管理器提供进程优先级优化所需的行为信息。
    pub fn ability_behavior_analysis(
        &self,
        token: AbilityToken,
        pre_token: Option<AbilityToken>,
        visibility: i32,
        perceptibility: i32,
        connection_state: i32,
    ) {
        let Some(client) = self.client() else {
            warn!(%token, "app manager client is not connected, behavior analysis dropped");
            return;
        };
        let result = client.ability_behavior_analysis(
            token,
            pre_token,
            visibility,
            perceptibility,
            connection_state,
        );
        if !result.is_ok() {
            debug!(%token, %result, "behavior analysis not accepted");
        }
    }

    /// 尽力杀掉承载该能力的进程。
    pub fn kill_process_by_ability_token(&self, token: AbilityToken) {
        let Some(client) = self.client() else {
            warn!(%token, "app manager client is not connected, kill process dropped");
            return;
        };
        let result = client.kill_process_by_ability_token(token);
        if !result.is_ok() {
            warn!(%token, %result, "failed to kill process by ability token");
        }
    }

    /// 杀掉整个应用。
    pub fn kill_application(&self, bundle_name: &str) -> Result<(), AbilityError> {
        let client = self.client().ok_or_else(|| {
            AbilityError::inner("kill_application", "app manager client is not connected")
        })?;
        let result = client.kill_application(bundle_name);
        if !result.is_ok() {
            error!(bundle = bundle_name, %result, "failed to kill application");
            return Err(AbilityError::inner("kill_application", result.to_string()));
        }
        Ok(())
    }

    /// 原始状态到粗粒度投影的全函数转换。
    pub fn convert_to_app_ability_state(state: i32) -> AppAbilityState {
        AppAbilityState::from_raw(state)
    }

    /// 最近一次回报得到的投影。
    pub fn get_ability_state(&self) -> AppAbilityState {
        *self.ability_state.lock()
    }

    /// 进程管理器的异步回报入口。
    ///
    /// # 教案式注释
    /// - **执行 (How)**：先写入投影，再把原始 `(token, state)` 转交观察者；观察者调用发生在锁外。
    /// - **契约 (What)**：没有观察者时只记录日志。
    pub fn on_ability_request_done(&self, token: AbilityToken, state: i32) {
        let projected = Self::convert_to_app_ability_state(state);
        *self.ability_state.lock() = projected;

        let observer = self.observer.lock().observer.clone();
        match observer {
            Some(observer) => {
                debug!(%token, state, ?projected, "forwarding ability request done");
                observer.on_ability_request_done(token, state);
            }
            None => warn!(%token, state, "no app state observer registered"),
        }
    }
}

impl std::fmt::Debug for AppScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppScheduler")
            .field("connected", &self.is_connected())
            .field("ability_state", &self.get_ability_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ability_core::{
        AbilityRequest, AppMgrResultCode,
        testing::{AppMgrCall, FakeAppMgrClient, RecordingCallback},
    };

    fn request() -> AbilityRequest {
        AbilityRequest::new("com.ix.First", "FirstAbility").with_app_name("FirstApp")
    }

    #[test]
    fn init_without_observer_fails() {
        let scheduler = AppScheduler::new(Some(FakeAppMgrClient::new()));
        let err = scheduler.init(None).unwrap_err();
        assert!(err.is_invalid_value());
        assert_eq!(scheduler.get_ability_state(), AppAbilityState::Undefined);
    }

    #[test]
    fn init_without_client_fails() {
        let scheduler = AppScheduler::new(None);
        let err = scheduler.init(Some(RecordingCallback::new())).unwrap_err();
        assert!(matches!(err, AbilityError::Inner { .. }));
    }

    #[test]
    fn init_fails_when_registration_is_rejected() {
        let client = FakeAppMgrClient::new();
        client.fail_register(AppMgrResultCode::ErrorServiceNotReady);
        let scheduler = AppScheduler::new(Some(client.clone()));
        assert!(scheduler.init(Some(RecordingCallback::new())).is_err());
        assert!(!client.has_callback());
    }

    #[test]
    fn reinit_rewires_observer_and_stale_guard_is_inert() {
        let client = FakeAppMgrClient::new();
        let scheduler = AppScheduler::new(Some(client.clone()));
        let first = RecordingCallback::new();
        let second = RecordingCallback::new();

        let first_guard = scheduler.init(Some(first.clone())).expect("首次初始化应成功");
        let second_guard = scheduler.init(Some(second.clone())).expect("重新初始化应成功");
        assert!(!first_guard.is_active());
        drop(first_guard);
        assert!(second_guard.is_active());

        let token = AbilityToken::allocate();
        scheduler.on_ability_request_done(token, ProcessAbilityState::Background.as_raw());
        assert_eq!(first.call_count(), 0);
        assert_eq!(second.call_count(), 1);

        drop(second_guard);
        scheduler.on_ability_request_done(token, ProcessAbilityState::Foreground.as_raw());
        assert_eq!(second.call_count(), 1);
        assert_eq!(scheduler.get_ability_state(), AppAbilityState::Foreground);
    }

    #[test]
    fn commands_fail_deterministically_without_connection() {
        let scheduler = AppScheduler::new(None);
        let request = request();
        let token = AbilityToken::allocate();
        assert!(
            scheduler
                .load_ability(token, None, &request.ability_info, &request.app_info)
                .is_err()
        );
        assert!(scheduler.terminate_ability(token).is_err());
        assert!(scheduler.kill_application("com.ix.First").is_err());
        scheduler.move_to_foreground(token);
        scheduler.move_to_background(token);
        scheduler.kill_process_by_ability_token(token);
        assert_eq!(scheduler.get_ability_state(), AppAbilityState::Undefined);
    }

    #[test]
    fn remote_failure_collapses_to_inner_error() {
        let client = FakeAppMgrClient::new();
        client.fail_load(AppMgrResultCode::ResultError);
        client.fail_terminate(AppMgrResultCode::ErrorServiceNotConnected);
        let scheduler = AppScheduler::new(Some(client));
        let request = request();
        let token = AbilityToken::allocate();
        let err = scheduler
            .load_ability(token, None, &request.ability_info, &request.app_info)
            .unwrap_err();
        assert_eq!(err.error_code(), ability_core::ErrorCode::InnerError);
        assert!(scheduler.terminate_ability(token).is_err());
    }

    #[test]
    fn move_to_background_does_not_touch_projection_without_report() {
        let client = FakeAppMgrClient::new();
        let scheduler = AppScheduler::new(Some(client.clone()));
        let token = AbilityToken::allocate();
        scheduler.move_to_background(token);
        assert_eq!(scheduler.get_ability_state(), AppAbilityState::Undefined);
        assert_eq!(
            client.calls(),
            vec![AppMgrCall::UpdateAbilityState(
                token,
                ProcessAbilityState::Background
            )]
        );
    }

    #[test]
    fn echoed_report_updates_projection_and_observer_once() {
        let client = FakeAppMgrClient::echoing();
        let scheduler = AppScheduler::new(Some(client));
        let observer = RecordingCallback::new();
        let _registration = scheduler.init(Some(observer.clone())).expect("初始化应成功");

        let token = AbilityToken::allocate();
        scheduler.move_to_background(token);
        assert_eq!(scheduler.get_ability_state(), AppAbilityState::Background);
        assert_eq!(
            observer.calls(),
            vec![(token, ProcessAbilityState::Background.as_raw())]
        );
    }

    #[test]
    fn behavior_analysis_is_forwarded_verbatim() {
        let client = FakeAppMgrClient::new();
        let scheduler = AppScheduler::new(Some(client.clone()));
        let token = AbilityToken::allocate();
        scheduler.ability_behavior_analysis(token, None, 1, 0, 1);
        scheduler.ability_behavior_analysis(token, Some(token), 0, 0, 0);
        let forwarded = client
            .calls()
            .into_iter()
            .filter(|call| matches!(call, AppMgrCall::BehaviorAnalysis { .. }))
            .count();
        assert_eq!(forwarded, 2);
    }

    #[test]
    fn conversion_handles_sentinels() {
        assert_eq!(
            AppScheduler::convert_to_app_ability_state(ProcessAbilityState::Begin.as_raw()),
            AppAbilityState::Undefined
        );
        assert_eq!(
            AppScheduler::convert_to_app_ability_state(ProcessAbilityState::Background.as_raw()),
            AppAbilityState::Background
        );
    }
}
