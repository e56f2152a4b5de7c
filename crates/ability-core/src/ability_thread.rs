//! # 能力线程句柄
//!
//! ## 核心意图（Why）
//! - 能力进程在就绪后把自身的“能力线程”回连给管理器，管理器通过它下发生命周期事务；
//! - 真实远端实现与测试替身以标签变体区分，管理器无需依赖动态类型判断。
//!
//! ## 行为契约（What）
//! - 下发事务为单向调用，结果通过 `AbilityTransitionDone` 异步回报；
//! - 句柄可为空，空句柄的校验属于更上层的服务入口。

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{state::AbilityState, want::Want};

/// 下发给能力线程的生命周期事务。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LifecycleTransaction {
    /// 期望能力到达的状态。
    pub target: AbilityState,
    /// 是否为重入启动（新 Want）。
    pub is_new_want: bool,
}

/// 远端能力线程契约。
///
/// # 教案式说明
/// - **意图 (Why)**：抽象跨进程的调度入口，便于在测试中以替身替换；
/// - **契约 (What)**：实现必须是非阻塞的单向调用，不得在调用内同步等待能力完成跃迁。
pub trait AbilityThread: Send + Sync + fmt::Debug {
    /// 请求能力执行一次生命周期事务。
    fn schedule_ability_transaction(&self, want: &Want, transaction: LifecycleTransaction);
}

/// 能力线程句柄的标签变体。
///
/// - **契约 (What)**：`Remote` 包装真实实现，`Mock` 包装记录调用的测试替身；两者对管理器行为一致。
#[derive(Clone, Debug)]
pub enum AbilitySchedulerHandle {
    Remote(Arc<dyn AbilityThread>),
    Mock(Arc<MockAbilityThread>),
}

impl AbilitySchedulerHandle {
    pub fn schedule_ability_transaction(&self, want: &Want, transaction: LifecycleTransaction) {
        match self {
            AbilitySchedulerHandle::Remote(thread) => {
                thread.schedule_ability_transaction(want, transaction)
            }
            AbilitySchedulerHandle::Mock(mock) => mock.record(want, transaction),
        }
    }

    /// 是否为测试替身。
    pub fn is_mock(&self) -> bool {
        matches!(self, AbilitySchedulerHandle::Mock(_))
    }
}

/// 记录所有收到事务的能力线程替身。
#[derive(Debug, Default)]
pub struct MockAbilityThread {
    transactions: Mutex<Vec<(Want, LifecycleTransaction)>>,
}

impl MockAbilityThread {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, want: &Want, transaction: LifecycleTransaction) {
        self.transactions.lock().push((want.clone(), transaction));
    }

    /// 已收到的事务快照。
    pub fn transactions(&self) -> Vec<LifecycleTransaction> {
        self.transactions
            .lock()
            .iter()
            .map(|(_, transaction)| transaction.clone())
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.lock().len()
    }
}
