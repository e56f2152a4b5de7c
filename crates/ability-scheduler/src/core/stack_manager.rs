//! # 能力栈管理器
//!
//! ## 核心意图（Why）
//! - 持有某个会话内全部驻留的能力记录、FIFO 等待队列以及每条记录的生命周期状态机；
//! - 保证同一时刻至多一条记录处于 `Activating`，其余启动请求排队，待当前跃迁完成或超时后依次出队。
//!
//! ## 行为契约（What）
//! - 管理器本身不是线程安全的，所有修改都由 [`super::service::ManagerService`] 串行驱动；
//! - 所有入口返回 [`AbilityError`]，调用方可折叠为粗粒度 [`ability_core::ErrorCode`]；
//! - 事件编号只在超时武装期间有效，撤销后按事件编号查询返回 `None`。
//!
//! ## 执行流程（How）
//! - 启动：准入检查 → 按去重键查找记录 → 已就绪走激活路径，否则先请求进程管理器加载，受理后才写入记录 → 武装超时 → 置顶；
//! - 完成：跃迁完成时撤销超时、进入 `Active` 并出队下一个请求；
//! - 超时：按事件编号找到记录，杀进程并移除记录，然后出队；
//! - 死亡：原地重置记录，然后出队。

use std::collections::VecDeque;
use std::sync::Arc;

use ability_core::{
    AbilityError, AbilityRecord, AbilityRecordSnapshot, AbilityRequest, AbilityState, AbilityToken,
    AbilitySchedulerHandle, EventId, EventIdGenerator, LifecycleTransaction, ProcessAbilityState,
    SchedulerConfig, StartOutcome, TimeoutKind,
};
use tracing::{debug, info, warn};

use super::timeout::TimeoutScheduler;
use crate::app_scheduler::AppScheduler;

/// 管理器种类。
///
/// - `KernelSystem`：承载系统 UI 等内核系统能力，加载超时使用系统 UI 超时；
/// - `Application`：普通应用能力。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StackKind {
    KernelSystem,
    Application,
}

impl StackKind {
    pub fn is_kernel_system(self) -> bool {
        matches!(self, StackKind::KernelSystem)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StackKind::KernelSystem => "kernel-system",
            StackKind::Application => "application",
        }
    }
}

/// 管理器整体的只读快照。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManagerSnapshot {
    pub user_id: i32,
    pub kind: StackKind,
    pub abilities: Vec<AbilityRecordSnapshot>,
    pub top: Option<AbilityToken>,
    pub waiting: usize,
}

/// 能力栈管理器。
///
/// # 教案式注释
/// - **意图 (Why)**：把准入控制、状态机推进、超时与死亡恢复集中在一个单写者对象中，
///   避免多把锁交错带来的竞态；
/// - **契约 (What)**：
///   - `abilities` 以 `bundleName:name` 去重，记录只会被 [`AbilityStackManager::remove_ability_record`] 移除；
///   - `top` 指向最近一次成功拉起的记录；
///   - `waiting` 中的请求在出队之前不会创建记录；
/// - **风险 (Trade-offs)**：记录数量通常很小，查找采用线性扫描。
pub struct AbilityStackManager {
    user_id: i32,
    kind: StackKind,
    abilities: Vec<AbilityRecord>,
    top: Option<AbilityToken>,
    waiting: VecDeque<AbilityRequest>,
    app_scheduler: Arc<AppScheduler>,
    timeouts: Box<dyn TimeoutScheduler>,
    config: SchedulerConfig,
    event_ids: EventIdGenerator,
    next_record_id: u64,
}

impl AbilityStackManager {
    pub fn new(
        user_id: i32,
        kind: StackKind,
        app_scheduler: Arc<AppScheduler>,
        config: SchedulerConfig,
        timeouts: Box<dyn TimeoutScheduler>,
    ) -> Self {
        info!(user_id, kind = kind.as_str(), "ability stack manager created");
        Self {
            user_id,
            kind,
            abilities: Vec::new(),
            top: None,
            waiting: VecDeque::new(),
            app_scheduler,
            timeouts,
            config,
            event_ids: EventIdGenerator::new(),
            next_record_id: 0,
        }
    }

    pub fn get_manager_user_id(&self) -> i32 {
        self.user_id
    }

    pub fn kind(&self) -> StackKind {
        self.kind
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 启动能力。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - 存在 `Activating` 记录或等待队列非空时，请求追加到队尾并返回 [`StartOutcome::Waiting`]，
    ///     此时不创建记录，已排队的请求始终先于后到的请求被拉起；
    ///   - 否则解析或创建记录并拉起，成功返回 [`StartOutcome::Started`]；
    ///   - **错误**：加载失败返回 [`AbilityError::Inner`]，不新增记录，已有记录、超时与栈顶均保持不变；
    ///     队列已满返回 [`AbilityError::QueueFull`]。
    pub fn start_ability(&mut self, request: AbilityRequest) -> Result<StartOutcome, AbilityError> {
        let activating = self.activating_token();
        if activating.is_some() || !self.waiting.is_empty() {
            debug!(
                activating = ?activating,
                waiting = self.waiting.len(),
                bundle = %request.ability_info.bundle_name,
                ability = %request.ability_info.name,
                "manager busy, request deferred"
            );
            self.enqueue_waitting_ability(request)?;
            self.dequeue_waitting_ability();
            return Ok(StartOutcome::Waiting);
        }
        self.start_ability_locked(&request)?;
        Ok(StartOutcome::Started)
    }

    /// 解析记录并拉起。
    ///
    /// - **执行 (How)**：需要加载时先向进程管理器发起加载，成功后才写入新记录或更新已有记录的意图，
    ///   失败路径上不留下任何修改。
    fn start_ability_locked(&mut self, request: &AbilityRequest) -> Result<(), AbilityError> {
        let flag = Self::get_flag_of_ability(
            &request.ability_info.bundle_name,
            &request.ability_info.name,
        );
        let index = match self.index_of_flag(&flag) {
            Some(index) => {
                let record = &self.abilities[index];
                if !record.is_ready() {
                    self.request_load(record, request.caller_token)?;
                }
                self.abilities[index].update_want(request);
                index
            }
            None => {
                let record = AbilityRecord::from_request(
                    request,
                    self.next_record_id + 1,
                    self.kind.is_kernel_system(),
                );
                self.request_load(&record, record.pre_token())?;
                self.next_record_id += 1;
                debug!(token = %record.token(), flag = %flag, "ability record created");
                self.abilities.push(record);
                self.abilities.len() - 1
            }
        };
        if self.abilities[index].is_ready() {
            self.activate_at(index)?;
        } else {
            self.enter_loading(index)?;
        }
        self.abilities[index].mark_started();
        Ok(())
    }

    fn request_load(
        &self,
        record: &AbilityRecord,
        pre_token: Option<AbilityToken>,
    ) -> Result<(), AbilityError> {
        self.app_scheduler.load_ability(
            record.token(),
            pre_token,
            record.ability_info(),
            record.application_info(),
        )
    }

    /// 加载已受理：进入 `Activating` 并武装加载超时。
    fn enter_loading(&mut self, index: usize) -> Result<(), AbilityError> {
        self.abilities[index].transition(AbilityState::Activating)?;
        let after = self
            .config
            .load_timeout(self.abilities[index].is_kernel_system_ability());
        self.arm_timeout(index, TimeoutKind::Load, after);
        let record = &self.abilities[index];
        let token = record.token();
        self.top = Some(token);
        info!(
            %token,
            bundle = %record.ability_info().bundle_name,
            ability = %record.ability_info().name,
            "ability loading"
        );
        Ok(())
    }

    /// 激活路径：能力线程已就绪，直接下发生命周期事务。
    fn activate_at(&mut self, index: usize) -> Result<(), AbilityError> {
        self.abilities[index].transition(AbilityState::Activating)?;
        let after = self.config.active_timeout();
        self.arm_timeout(index, TimeoutKind::Active, after);

        let record = &self.abilities[index];
        let token = record.token();
        let transaction = LifecycleTransaction {
            target: AbilityState::Active,
            is_new_want: record.is_new_want(),
        };
        match record.scheduler() {
            Some(scheduler) => scheduler.schedule_ability_transaction(record.want(), transaction),
            None => debug!(%token, "ability thread not bound, lifecycle transaction skipped"),
        }
        if record.is_new_want() {
            self.app_scheduler
                .ability_behavior_analysis(token, record.pre_token(), 1, 1, 1);
        }
        self.top = Some(token);
        info!(%token, "ability activating");
        Ok(())
    }

    /// 以新的事件编号武装超时，并撤销记录上仍在武装的旧事件。
    fn arm_timeout(&mut self, index: usize, kind: TimeoutKind, after: std::time::Duration) {
        let event_id = self.event_ids.next_id();
        if let Some(previous) = self.abilities[index].replace_event_id(Some(event_id)) {
            self.timeouts.disarm(previous);
        }
        self.timeouts.arm(kind, event_id, after);
    }

    fn disarm_timeout(&mut self, index: usize) {
        if let Some(event_id) = self.abilities[index].replace_event_id(None) {
            self.timeouts.disarm(event_id);
        }
    }

    /// 能力线程回连。
    ///
    /// - **契约 (What)**：令牌为空或未知返回 `InvalidValue` 类错误；句柄为空仍然成功，
    ///   记录被标记就绪并请求切到前台。
    pub fn attach_ability_thread(
        &mut self,
        scheduler: Option<AbilitySchedulerHandle>,
        token: Option<AbilityToken>,
    ) -> Result<(), AbilityError> {
        let token = token.ok_or(AbilityError::TokenMissing)?;
        let index = self
            .index_of(token)
            .ok_or(AbilityError::RecordNotFound { token })?;
        if scheduler.is_none() {
            warn!(%token, "ability thread handle is null");
        }
        self.abilities[index].attach_scheduler(scheduler);
        info!(%token, "ability thread attached");
        self.app_scheduler.move_to_foreground(token);
        Ok(())
    }

    /// 能力线程报告生命周期跃迁完成。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：只有记录处于 `Activating` 且目标为 `Active` 时成功；
    ///   其余情况返回 `InvalidValue` 类错误且不修改任何状态；
    /// - **后置条件**：超时撤销、记录进入 `Active`、`is_new_want` 清除，随后尝试出队。
    pub fn ability_transition_done(
        &mut self,
        token: Option<AbilityToken>,
        target_state: i32,
    ) -> Result<(), AbilityError> {
        let token = token.ok_or(AbilityError::TokenMissing)?;
        let index = self
            .index_of(token)
            .ok_or(AbilityError::RecordNotFound { token })?;
        let current = self.abilities[index].state();
        let target = AbilityState::from_raw(target_state);
        if current != AbilityState::Activating || target != Some(AbilityState::Active) {
            warn!(%token, state = %current, target_state, "rejected lifecycle transition");
            return Err(AbilityError::InvalidTransition {
                token,
                from: current,
                to: target,
            });
        }

        self.disarm_timeout(index);
        let record = &mut self.abilities[index];
        record.transition(AbilityState::Active)?;
        record.set_is_new_want(false);
        info!(%token, "ability active");
        self.dequeue_waitting_ability();
        Ok(())
    }

    /// 进程管理器的状态回报。
    ///
    /// - **契约 (What)**：只有 `FOREGROUND` 生效。记录处于 `Activating`，或处于 `Initial` 且既没有其他
    ///   `Activating` 记录也没有排队请求时，重新武装激活超时并下发生命周期事务；其他回报只记录日志。
    pub fn on_ability_request_done(&mut self, token: AbilityToken, state: i32) {
        if state != ProcessAbilityState::Foreground.as_raw() {
            debug!(%token, state, "ability request done ignored");
            return;
        }
        let Some(index) = self.index_of(token) else {
            warn!(%token, "ability request done for unknown record");
            return;
        };
        match self.abilities[index].state() {
            AbilityState::Active => {
                debug!(%token, "ability already active");
                return;
            }
            AbilityState::Initial => {
                if let Some(activating) = self.activating_token() {
                    warn!(%token, %activating, "another ability is activating, foreground report ignored");
                    return;
                }
                if !self.waiting.is_empty() {
                    warn!(%token, waiting = self.waiting.len(), "requests are waiting, foreground report ignored");
                    return;
                }
            }
            AbilityState::Activating => {}
        }
        if let Err(err) = self.activate_at(index) {
            warn!(%token, error = %err, "failed to activate ability");
        }
    }

    /// 尝试拉起等待队列头部的请求。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：仅当没有 `Activating` 记录时出队，栈顶为 `Active`、因死亡重置为 `Initial`
    ///   或不存在都视为空闲；出队的请求拉起失败只记录日志并继续尝试下一个，队列不会因单个失败而停滞。
    pub fn dequeue_waitting_ability(&mut self) {
        while !self.waiting.is_empty() {
            if let Some(activating) = self.activating_token() {
                debug!(%activating, waiting = self.waiting.len(), "dequeue deferred, ability activating");
                return;
            }
            let Some(request) = self.waiting.pop_front() else {
                return;
            };
            match self.start_ability_locked(&request) {
                Ok(()) => {
                    debug!(
                        bundle = %request.ability_info.bundle_name,
                        ability = %request.ability_info.name,
                        waiting = self.waiting.len(),
                        "waiting request started"
                    );
                    return;
                }
                Err(err) => warn!(
                    bundle = %request.ability_info.bundle_name,
                    ability = %request.ability_info.name,
                    error = %err,
                    "waiting request failed to start"
                ),
            }
        }
    }

    /// 把请求追加到等待队列尾部。
    pub fn enqueue_waitting_ability(&mut self, request: AbilityRequest) -> Result<(), AbilityError> {
        if let Some(capacity) = self.config.max_waiting_requests {
            if self.waiting.len() >= capacity {
                warn!(capacity, "waiting queue is full");
                return Err(AbilityError::QueueFull { capacity });
            }
        }
        self.waiting.push_back(request);
        Ok(())
    }

    /// 按 `(bundleName, name)` 解析或创建记录。
    pub fn get_or_create_ability_record(&mut self, request: &AbilityRequest) -> &AbilityRecord {
        let index = self.resolve_or_create(request);
        &self.abilities[index]
    }

    fn resolve_or_create(&mut self, request: &AbilityRequest) -> usize {
        let flag = Self::get_flag_of_ability(
            &request.ability_info.bundle_name,
            &request.ability_info.name,
        );
        if let Some(index) = self.index_of_flag(&flag) {
            self.abilities[index].update_want(request);
            return index;
        }
        self.next_record_id += 1;
        let record =
            AbilityRecord::from_request(request, self.next_record_id, self.kind.is_kernel_system());
        debug!(token = %record.token(), flag = %flag, "ability record created");
        self.abilities.push(record);
        self.abilities.len() - 1
    }

    pub fn get_flag_of_ability(bundle_name: &str, ability_name: &str) -> String {
        AbilityRecord::flag_of(bundle_name, ability_name)
    }

    pub fn get_ability_record_by_token(&self, token: AbilityToken) -> Option<&AbilityRecord> {
        self.abilities.iter().find(|record| record.token() == token)
    }

    pub fn get_ability_record_by_event_id(&self, event_id: EventId) -> Option<&AbilityRecord> {
        self.abilities
            .iter()
            .find(|record| record.event_id() == Some(event_id))
    }

    pub fn get_current_top_ability(&self) -> Option<&AbilityRecord> {
        self.top
            .and_then(|token| self.get_ability_record_by_token(token))
    }

    /// 能力所在进程死亡：原地重置记录并撤销超时，记录继续驻留。
    ///
    /// - **后置条件**：死亡的记录不再占用 `Activating`，随即尝试出队，排队请求不会因此滞留。
    pub fn on_ability_died(&mut self, token: AbilityToken) {
        let Some(index) = self.index_of(token) else {
            warn!(%token, "ability died but no record is resident");
            return;
        };
        if let Some(event_id) = self.abilities[index].reset_on_death() {
            self.timeouts.disarm(event_id);
        }
        warn!(%token, "ability died, record reset");
        self.dequeue_waitting_ability();
    }

    /// 超时处理。
    ///
    /// - **契约 (What)**：事件编号仍有效时，尽力杀掉承载进程并移除记录；无论是否命中都尝试出队。
    pub fn on_time_out(&mut self, kind: TimeoutKind, event_id: EventId) {
        match self.get_ability_record_by_event_id(event_id).map(AbilityRecord::token) {
            Some(token) => {
                warn!(%token, %event_id, kind = kind.as_str(), "ability timed out, removing record");
                self.app_scheduler.kill_process_by_ability_token(token);
                self.remove_ability_record(Some(token));
            }
            None => debug!(%event_id, kind = kind.as_str(), "stale timeout ignored"),
        }
        self.dequeue_waitting_ability();
    }

    /// 移除记录；若为栈顶则清空栈顶。
    pub fn remove_ability_record(&mut self, token: Option<AbilityToken>) -> bool {
        let Some(token) = token else {
            return false;
        };
        let Some(index) = self.index_of(token) else {
            return false;
        };
        self.disarm_timeout(index);
        self.abilities.remove(index);
        if self.top == Some(token) {
            self.top = None;
        }
        info!(%token, "ability record removed");
        true
    }

    /// 追加诊断行。
    pub fn dump_state(&self, out: &mut Vec<String>) {
        out.push(format!(
            "User ID #{}  kind [{}]",
            self.user_id,
            self.kind.as_str()
        ));
        for record in &self.abilities {
            record.dump(out);
        }
        out.push(format!("  waiting queue size #{}", self.waiting.len()));
        for request in &self.waiting {
            out.push(format!(
                "    waiting [{}]",
                Self::get_flag_of_ability(&request.ability_info.bundle_name, &request.ability_info.name)
            ));
        }
    }

    pub fn waiting_queue_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn ability_count(&self) -> usize {
        self.abilities.len()
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            user_id: self.user_id,
            kind: self.kind,
            abilities: self.abilities.iter().map(AbilityRecord::snapshot).collect(),
            top: self.top,
            waiting: self.waiting.len(),
        }
    }

    fn index_of(&self, token: AbilityToken) -> Option<usize> {
        self.abilities.iter().position(|record| record.token() == token)
    }

    fn index_of_flag(&self, flag: &str) -> Option<usize> {
        self.abilities.iter().position(|record| record.flag() == flag)
    }

    fn activating_token(&self) -> Option<AbilityToken> {
        self.abilities
            .iter()
            .find(|record| record.state() == AbilityState::Activating)
            .map(AbilityRecord::token)
    }
}

impl std::fmt::Debug for AbilityStackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilityStackManager")
            .field("user_id", &self.user_id)
            .field("kind", &self.kind)
            .field("abilities", &self.abilities.len())
            .field("top", &self.top)
            .field("waiting", &self.waiting.len())
            .finish()
    }
}
