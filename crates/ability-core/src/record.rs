//! # 能力记录（AbilityRecord）
//!
//! ## 核心意图（Why）
//! - 建模管理器对单个驻留能力的全部簿记：身份、启动意图、生命周期状态、超时事件与能力线程句柄；
//! - 状态改写统一经过 [`AbilityRecord::transition`] 校验，避免绕过状态图。
//!
//! ## 架构定位（Where）
//! - 记录由 `AbilityStackManager` 独占持有并在其任务内原地修改；
//! - 管理器以外的调用方只拿到 [`AbilityRecordSnapshot`] 只读副本。
//!
//! ## 教案式使用指南（How）
//! 1. 调用 [`AbilityRecord::from_request`] 创建记录，令牌随之分配；
//! 2. 同一能力再次启动时调用 [`AbilityRecord::update_want`]，记录被原地复用并标记新 Want；
//! 3. 能力死亡时调用 [`AbilityRecord::reset_on_death`]，状态强制回到 `Initial`。

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    ability_thread::AbilitySchedulerHandle,
    error::AbilityError,
    state::AbilityState,
    token::{AbilityToken, EventId},
    want::{AbilityInfo, AbilityRequest, ApplicationInfo, Want},
};

/// 管理器内单个驻留能力的簿记对象。
///
/// # 教案式说明
/// - **意图 (Why)**：集中维护能力上下文，管理器的准入、超时与死亡恢复都围绕它展开；
/// - **契约 (What)**：
///   - `token`：创建时分配，生命周期内不变；
///   - `event_id`：仅当超时处于武装状态时为 `Some`；
///   - `is_new_want`：同一能力被再次启动后置位，激活完成后清除；
///   - `is_ready`：能力线程已回连；
/// - **风险 (Trade-offs)**：记录不是线程安全的，必须只在管理器任务内修改。
#[derive(Debug)]
pub struct AbilityRecord {
    record_id: u64,
    token: AbilityToken,
    event_id: Option<EventId>,
    want: Want,
    ability_info: AbilityInfo,
    application_info: ApplicationInfo,
    state: AbilityState,
    is_new_want: bool,
    is_kernel_system_ability: bool,
    is_launcher_ability: bool,
    is_ready: bool,
    scheduler: Option<AbilitySchedulerHandle>,
    pre_token: Option<AbilityToken>,
    start_time_ms: u64,
}

impl AbilityRecord {
    /// 依据启动请求创建记录。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - `record_id`：管理器内的自增编号，仅用于诊断；
    ///   - `is_kernel_system_ability`：由管理器种类决定；
    ///   - **后置条件**：状态为 `Initial`，未武装任何超时，`is_new_want` 为假；
    ///     `caller_token` 记为前序能力令牌。
    pub fn from_request(
        request: &AbilityRequest,
        record_id: u64,
        is_kernel_system_ability: bool,
    ) -> Self {
        Self {
            record_id,
            token: AbilityToken::allocate(),
            event_id: None,
            want: request.want.clone(),
            ability_info: request.ability_info.clone(),
            application_info: request.app_info.clone(),
            state: AbilityState::Initial,
            is_new_want: false,
            is_kernel_system_ability,
            is_launcher_ability: request.app_info.is_launcher_app,
            is_ready: false,
            scheduler: None,
            pre_token: request.caller_token,
            start_time_ms: 0,
        }
    }

    /// 去重键：`bundleName:name`。
    pub fn flag_of(bundle_name: &str, ability_name: &str) -> String {
        format!("{bundle_name}:{ability_name}")
    }

    /// 本记录的去重键。
    pub fn flag(&self) -> String {
        Self::flag_of(&self.ability_info.bundle_name, &self.ability_info.name)
    }

    pub fn record_id(&self) -> u64 {
        self.record_id
    }

    pub fn token(&self) -> AbilityToken {
        self.token
    }

    pub fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    pub fn want(&self) -> &Want {
        &self.want
    }

    pub fn ability_info(&self) -> &AbilityInfo {
        &self.ability_info
    }

    pub fn application_info(&self) -> &ApplicationInfo {
        &self.application_info
    }

    /// 当前状态。
    pub fn state(&self) -> AbilityState {
        self.state
    }

    pub fn is_new_want(&self) -> bool {
        self.is_new_want
    }

    pub fn is_kernel_system_ability(&self) -> bool {
        self.is_kernel_system_ability
    }

    pub fn is_launcher_ability(&self) -> bool {
        self.is_launcher_ability
    }

    /// 能力线程是否已回连。
    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn scheduler(&self) -> Option<&AbilitySchedulerHandle> {
        self.scheduler.as_ref()
    }

    pub fn pre_token(&self) -> Option<AbilityToken> {
        self.pre_token
    }

    /// 最近一次拉起的时间（Unix 毫秒），从未拉起时为 0。
    pub fn start_time_ms(&self) -> u64 {
        self.start_time_ms
    }

    /// 以新的启动请求原地更新记录。
    ///
    /// - **意图 (Why)**：同一能力重复启动时复用记录而不是追加新条目；
    /// - **后置条件**：`want` 与前序令牌被替换，`is_new_want` 置位，状态保持不变。
    pub fn update_want(&mut self, request: &AbilityRequest) {
        self.want = request.want.clone();
        self.pre_token = request.caller_token;
        self.is_new_want = true;
    }

    pub fn set_is_new_want(&mut self, is_new_want: bool) {
        self.is_new_want = is_new_want;
    }

    /// 记录或清除当前武装的超时事件，返回被替换的旧事件。
    pub fn replace_event_id(&mut self, event_id: Option<EventId>) -> Option<EventId> {
        std::mem::replace(&mut self.event_id, event_id)
    }

    /// 绑定能力线程并标记就绪。
    ///
    /// - **契约 (What)**：`scheduler` 为空时只标记就绪，空句柄的拒绝属于上层服务入口。
    pub fn attach_scheduler(&mut self, scheduler: Option<AbilitySchedulerHandle>) {
        if scheduler.is_some() {
            self.scheduler = scheduler;
        }
        self.is_ready = true;
    }

    /// 记录本次拉起时间。
    pub fn mark_started(&mut self) {
        self.start_time_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
    }

    /// 状态机跃迁。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：驱动记录生命周期，保障单一在途跃迁的前提成立；
    /// - **契约 (What)**：
    ///   - `next`：目标状态；
    ///   - **后置条件**：成功时 `state` 更新为 `next`；
    ///   - **错误**：非法跃迁返回 [`AbilityError::InvalidTransition`]，记录保持不变。
    pub fn transition(&mut self, next: AbilityState) -> Result<(), AbilityError> {
        if !self.state.can_transition_to(next) {
            return Err(AbilityError::InvalidTransition {
                token: self.token,
                from: self.state,
                to: Some(next),
            });
        }
        self.state = next;
        Ok(())
    }

    /// 能力死亡后的原地重置。
    ///
    /// - **后置条件**：状态回到 `Initial`，能力线程句柄与就绪标记清除；返回仍处于武装状态的超时事件，
    ///   由管理器负责撤销。
    pub fn reset_on_death(&mut self) -> Option<EventId> {
        self.state = AbilityState::Initial;
        self.is_ready = false;
        self.scheduler = None;
        self.event_id.take()
    }

    /// 追加诊断行。
    pub fn dump(&self, out: &mut Vec<String>) {
        out.push(format!("      AbilityRecord ID #{}", self.record_id));
        out.push(format!(
            "        app name [{}]",
            self.ability_info.application_name
        ));
        out.push(format!("        main name [{}]", self.ability_info.name));
        out.push(format!(
            "        bundle name [{}]",
            self.ability_info.bundle_name
        ));
        out.push(format!(
            "        ability type [{}]",
            self.ability_info.ability_type.as_str()
        ));
        out.push(format!(
            "        state #{}  start time [{}]",
            self.state, self.start_time_ms
        ));
        out.push(format!(
            "        ready #{}  launcher #{}  kernel system #{}",
            u8::from(self.is_ready),
            u8::from(self.is_launcher_ability),
            u8::from(self.is_kernel_system_ability)
        ));
    }

    /// 只读快照。
    pub fn snapshot(&self) -> AbilityRecordSnapshot {
        AbilityRecordSnapshot {
            record_id: self.record_id,
            token: self.token,
            event_id: self.event_id,
            bundle_name: self.ability_info.bundle_name.clone(),
            ability_name: self.ability_info.name.clone(),
            state: self.state,
            is_new_want: self.is_new_want,
            is_kernel_system_ability: self.is_kernel_system_ability,
            is_ready: self.is_ready,
        }
    }
}

/// 管理器任务之外可见的记录副本。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AbilityRecordSnapshot {
    pub record_id: u64,
    pub token: AbilityToken,
    pub event_id: Option<EventId>,
    pub bundle_name: String,
    pub ability_name: String,
    pub state: AbilityState,
    pub is_new_want: bool,
    pub is_kernel_system_ability: bool,
    pub is_ready: bool,
}
