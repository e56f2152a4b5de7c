//! 进程管理器与状态回调的测试替身（`test-util` Feature）。

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    app_mgr::{AppMgrClient, AppMgrResultCode, AppStateCallback},
    state::ProcessAbilityState,
    token::AbilityToken,
    want::{AbilityInfo, ApplicationInfo},
};

/// 替身记录的一次调用。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AppMgrCall {
    Connect,
    RegisterCallback,
    LoadAbility {
        token: AbilityToken,
        pre_token: Option<AbilityToken>,
        bundle_name: String,
    },
    TerminateAbility(AbilityToken),
    UpdateAbilityState(AbilityToken, ProcessAbilityState),
    BehaviorAnalysis {
        token: AbilityToken,
        pre_token: Option<AbilityToken>,
        visibility: i32,
        perceptibility: i32,
        connection_state: i32,
    },
    KillProcess(AbilityToken),
    KillApplication(String),
}

/// 进程内的进程管理器替身。
///
/// # 教案式说明
/// - **意图 (Why)**：测试需要控制每类远端调用的结果码，并观察调度器发出的命令序列；
/// - **契约 (What)**：
///   - 默认所有调用返回 `ResultOk`；`fail_*` 系列方法把对应调用改为失败；
///   - 开启 `echo_state_updates` 后，`update_ability_state` 会同步回调已注册的回调，模拟进程管理器的回报。
#[derive(Default)]
pub struct FakeAppMgrClient {
    calls: Mutex<Vec<AppMgrCall>>,
    callback: Mutex<Option<Arc<dyn AppStateCallback>>>,
    connect_result: Mutex<Option<AppMgrResultCode>>,
    register_result: Mutex<Option<AppMgrResultCode>>,
    load_result: Mutex<Option<AppMgrResultCode>>,
    terminate_result: Mutex<Option<AppMgrResultCode>>,
    echo_state_updates: Mutex<bool>,
}

impl FakeAppMgrClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 连接与回调注册都成功，并把状态更新回显给回调。
    pub fn echoing() -> Arc<Self> {
        let client = Self::new();
        client.set_echo_state_updates(true);
        client
    }

    pub fn set_echo_state_updates(&self, enabled: bool) {
        *self.echo_state_updates.lock() = enabled;
    }

    pub fn fail_connect(&self, code: AppMgrResultCode) {
        *self.connect_result.lock() = Some(code);
    }

    pub fn fail_register(&self, code: AppMgrResultCode) {
        *self.register_result.lock() = Some(code);
    }

    pub fn fail_load(&self, code: AppMgrResultCode) {
        *self.load_result.lock() = Some(code);
    }

    pub fn fail_terminate(&self, code: AppMgrResultCode) {
        *self.terminate_result.lock() = Some(code);
    }

    /// 恢复所有调用为成功。
    pub fn heal(&self) {
        *self.connect_result.lock() = None;
        *self.register_result.lock() = None;
        *self.load_result.lock() = None;
        *self.terminate_result.lock() = None;
    }

    pub fn calls(&self) -> Vec<AppMgrCall> {
        self.calls.lock().clone()
    }

    pub fn load_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, AppMgrCall::LoadAbility { .. }))
            .count()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// 以进程管理器身份回报一次状态变化。
    pub fn report(&self, token: AbilityToken, state: ProcessAbilityState) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback.on_ability_request_done(token, state.as_raw());
        }
    }

    fn push(&self, call: AppMgrCall) {
        self.calls.lock().push(call);
    }

    fn result_of(slot: &Mutex<Option<AppMgrResultCode>>) -> AppMgrResultCode {
        slot.lock().unwrap_or(AppMgrResultCode::ResultOk)
    }
}

impl AppMgrClient for FakeAppMgrClient {
    fn connect_app_mgr_service(&self) -> AppMgrResultCode {
        self.push(AppMgrCall::Connect);
        Self::result_of(&self.connect_result)
    }

    fn register_app_state_callback(&self, callback: Arc<dyn AppStateCallback>) -> AppMgrResultCode {
        self.push(AppMgrCall::RegisterCallback);
        let result = Self::result_of(&self.register_result);
        if result.is_ok() {
            *self.callback.lock() = Some(callback);
        }
        result
    }

    fn load_ability(
        &self,
        token: AbilityToken,
        pre_token: Option<AbilityToken>,
        ability_info: &AbilityInfo,
        _app_info: &ApplicationInfo,
    ) -> AppMgrResultCode {
        self.push(AppMgrCall::LoadAbility {
            token,
            pre_token,
            bundle_name: ability_info.bundle_name.clone(),
        });
        Self::result_of(&self.load_result)
    }

    fn terminate_ability(&self, token: AbilityToken) -> AppMgrResultCode {
        self.push(AppMgrCall::TerminateAbility(token));
        Self::result_of(&self.terminate_result)
    }

    fn update_ability_state(
        &self,
        token: AbilityToken,
        state: ProcessAbilityState,
    ) -> AppMgrResultCode {
        self.push(AppMgrCall::UpdateAbilityState(token, state));
        if *self.echo_state_updates.lock() {
            self.report(token, state);
        }
        AppMgrResultCode::ResultOk
    }

    fn ability_behavior_analysis(
        &self,
        token: AbilityToken,
        pre_token: Option<AbilityToken>,
        visibility: i32,
        perceptibility: i32,
        connection_state: i32,
    ) -> AppMgrResultCode {
        self.push(AppMgrCall::BehaviorAnalysis {
            token,
            pre_token,
            visibility,
            perceptibility,
            connection_state,
        });
        AppMgrResultCode::ResultOk
    }

    fn kill_process_by_ability_token(&self, token: AbilityToken) -> AppMgrResultCode {
        self.push(AppMgrCall::KillProcess(token));
        AppMgrResultCode::ResultOk
    }

    fn kill_application(&self, bundle_name: &str) -> AppMgrResultCode {
        self.push(AppMgrCall::KillApplication(bundle_name.to_owned()));
        AppMgrResultCode::ResultOk
    }
}

/// 记录每次回调的状态回调替身。
#[derive(Debug, Default)]
pub struct RecordingCallback {
    calls: Mutex<Vec<(AbilityToken, i32)>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(AbilityToken, i32)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl AppStateCallback for RecordingCallback {
    fn on_ability_request_done(&self, token: AbilityToken, state: i32) {
        self.calls.lock().push((token, state));
    }
}
