//! 以事件编号为键的超时武装与撤销。
//!
//! # 设计概览（Why）
//! - 管理器只关心“某个事件在多久之后触发”，具体由 tokio 定时任务还是测试中的手动时钟承担，
//!   通过 [`TimeoutScheduler`] 隔离；
//! - 生产实现 [`TokioTimeouts`] 把到期事件投递回管理器的命令通道，触发处理与其他命令一样串行执行。
//!
//! # 契约说明（What）
//! - `arm` 之后、`disarm` 之前，事件最多投递一次；
//! - `disarm` 对未知或已触发的事件是空操作。

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use ability_core::{EventId, TimeoutKind};
use parking_lot::Mutex;
use tokio::{sync::mpsc::WeakUnboundedSender, task::JoinHandle};
use tracing::{debug, trace};

use super::service::ManagerCommand;

/// 超时调度器抽象。
pub trait TimeoutScheduler: Send {
    /// 在 `after` 之后为 `event_id` 触发一次 `kind` 类超时。
    fn arm(&mut self, kind: TimeoutKind, event_id: EventId, after: Duration);

    /// 撤销尚未触发的超时。
    fn disarm(&mut self, event_id: EventId);
}

/// 基于 tokio 定时任务的超时调度器。
///
/// # 教案式注释
/// - **意图 (Why)**：每个事件一个 `sleep` 任务，撤销即 `abort`，无需维护时间轮；
/// - **契约 (What)**：
///   - 持有命令通道的弱发送端，挂起的定时任务不会让管理器任务在句柄全部释放后继续存活；
///   - 必须在 tokio 运行时内调用 `arm`；
/// - **风险 (Trade-offs)**：已触发但尚未被撤销的句柄会在下一次 `arm` 时清理。
#[derive(Debug)]
pub struct TokioTimeouts {
    sender: WeakUnboundedSender<ManagerCommand>,
    pending: HashMap<EventId, JoinHandle<()>>,
}

impl TokioTimeouts {
    pub fn new(sender: WeakUnboundedSender<ManagerCommand>) -> Self {
        Self {
            sender,
            pending: HashMap::new(),
        }
    }

    /// 尚未撤销的定时任务数量。
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl TimeoutScheduler for TokioTimeouts {
    fn arm(&mut self, kind: TimeoutKind, event_id: EventId, after: Duration) {
        self.pending.retain(|_, task| !task.is_finished());
        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            match sender.upgrade() {
                Some(sender) => {
                    if sender
                        .send(ManagerCommand::TimeOut { kind, event_id })
                        .is_err()
                    {
                        trace!(%event_id, "manager closed before timeout delivery");
                    }
                }
                None => trace!(%event_id, "manager dropped, timeout discarded"),
            }
        });
        debug!(%event_id, kind = kind.as_str(), after_ms = after.as_millis() as u64, "timeout armed");
        if let Some(previous) = self.pending.insert(event_id, task) {
            previous.abort();
        }
    }

    fn disarm(&mut self, event_id: EventId) {
        if let Some(task) = self.pending.remove(&event_id) {
            task.abort();
            debug!(%event_id, "timeout disarmed");
        }
    }
}

impl Drop for TokioTimeouts {
    fn drop(&mut self) {
        for (_, task) in self.pending.drain() {
            task.abort();
        }
    }
}

/// 一次武装记录。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArmedTimeout {
    pub kind: TimeoutKind,
    pub event_id: EventId,
    pub after: Duration,
}

/// 不依赖运行时的手动超时调度器。
///
/// # 教案式说明
/// - **意图 (Why)**：同步驱动管理器（单元测试、嵌入到自有事件循环）时，由调用方决定何时触发超时；
/// - **契约 (What)**：克隆共享同一份状态；[`ManualTimeouts::armed`] 只返回尚未撤销的事件，
///   [`ManualTimeouts::history`] 返回最近 [`ManualTimeouts::HISTORY_CAPACITY`] 次武装，更早的记录被丢弃。
#[derive(Clone, Debug, Default)]
pub struct ManualTimeouts {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    armed: Vec<ArmedTimeout>,
    history: VecDeque<ArmedTimeout>,
}

impl ManualTimeouts {
    pub const HISTORY_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed(&self) -> Vec<ArmedTimeout> {
        self.inner.lock().armed.clone()
    }

    pub fn history(&self) -> Vec<ArmedTimeout> {
        self.inner.lock().history.iter().copied().collect()
    }

    pub fn is_armed(&self, event_id: EventId) -> bool {
        self.inner
            .lock()
            .armed
            .iter()
            .any(|armed| armed.event_id == event_id)
    }
}

impl TimeoutScheduler for ManualTimeouts {
    fn arm(&mut self, kind: TimeoutKind, event_id: EventId, after: Duration) {
        let armed = ArmedTimeout {
            kind,
            event_id,
            after,
        };
        let mut state = self.inner.lock();
        state.armed.retain(|existing| existing.event_id != event_id);
        state.armed.push(armed);
        if state.history.len() == Self::HISTORY_CAPACITY {
            state.history.pop_front();
        }
        state.history.push_back(armed);
    }

    fn disarm(&mut self, event_id: EventId) {
        self.inner
            .lock()
            .armed
            .retain(|existing| existing.event_id != event_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn armed_timeout_is_delivered_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timeouts = TokioTimeouts::new(tx.downgrade());
        timeouts.arm(TimeoutKind::Load, EventId::new(7), Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(2)).await;
        match rx.recv().await {
            Some(ManagerCommand::TimeOut { kind, event_id }) => {
                assert_eq!(kind, TimeoutKind::Load);
                assert_eq!(event_id, EventId::new(7));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_timeout_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timeouts = TokioTimeouts::new(tx.downgrade());
        timeouts.arm(TimeoutKind::Active, EventId::new(1), Duration::from_millis(100));
        timeouts.disarm(EventId::new(1));
        timeouts.disarm(EventId::new(99));
        assert_eq!(timeouts.pending_len(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn manual_timeouts_track_armed_set() {
        let mut timeouts = ManualTimeouts::new();
        let view = timeouts.clone();
        timeouts.arm(TimeoutKind::Load, EventId::new(1), Duration::from_millis(500));
        timeouts.arm(TimeoutKind::Active, EventId::new(2), Duration::from_secs(5));
        timeouts.disarm(EventId::new(1));
        assert!(!view.is_armed(EventId::new(1)));
        assert!(view.is_armed(EventId::new(2)));
        assert_eq!(view.history().len(), 2);
    }

    #[test]
    fn manual_history_keeps_only_recent_arms() {
        let mut timeouts = ManualTimeouts::new();
        let total = ManualTimeouts::HISTORY_CAPACITY as i64 + 10;
        for id in 1..=total {
            timeouts.arm(TimeoutKind::Active, EventId::new(id), Duration::from_secs(5));
            timeouts.disarm(EventId::new(id));
        }
        let history = timeouts.history();
        assert_eq!(history.len(), ManualTimeouts::HISTORY_CAPACITY);
        assert_eq!(history[0].event_id, EventId::new(11));
        assert_eq!(history.last().map(|armed| armed.event_id), Some(EventId::new(total)));
        assert!(timeouts.armed().is_empty());
    }
}
