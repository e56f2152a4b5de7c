//! # 令牌与事件标识
//!
//! ## 核心意图（Why）
//! - 以稳定整数取代远端对象指针作为能力身份，记录表可以直接以值为键，不依赖引用计数对象的地址语义；
//! - 超时事件同样以整数标识，事件失效后查找只会返回 `None`。
//!
//! ## 行为契约（What）
//! - [`AbilityToken`] 由进程级单调计数器分配，从 1 开始且永不复用；
//! - [`EventId`] 由各管理器自行分配，`-1` 等从未签发的值保证无法命中。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// 单个能力实例的不透明身份句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：跨进程寻址能力实例时需要一个与记录同生命周期的键；
/// - **契约 (What)**：`Copy + Eq + Hash`，可作为 `HashMap` 键；通过 [`AbilityToken::allocate`] 获得，
///   记录被移除后令牌不会再分配给其他记录；
/// - **风险 (Trade-offs)**：计数器为进程内全局，重启后重新从 1 开始，因此令牌不得持久化。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct AbilityToken(u64);

impl AbilityToken {
    /// 分配一个全新的令牌。
    pub fn allocate() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// 以原始整数构造令牌。
    ///
    /// - **契约 (What)**：仅用于从跨进程报文还原令牌；构造出的值未必对应任何驻留记录。
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始整数值。
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AbilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

/// 超时事件标识。
///
/// - **契约 (What)**：只在对应超时处于武装状态时有效；负值永远不会被签发。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct EventId(i64);

impl EventId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// 管理器内部的事件标识分配器。
///
/// # 教案式说明
/// - **意图 (Why)**：每次武装超时都需要新的事件标识，旧标识随之永久失效；
/// - **执行 (How)**：单调递增的 `i64`，从 1 开始；分配器由单线程的管理器任务独占，无需原子操作。
#[derive(Debug)]
pub struct EventIdGenerator {
    next: i64,
}

impl EventIdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// 签发下一个事件标识。
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_never_reused() {
        let first = AbilityToken::allocate();
        let second = AbilityToken::allocate();
        assert_ne!(first, second);
        assert!(second.as_raw() > first.as_raw());
    }

    #[test]
    fn event_ids_start_at_one_and_increase() {
        let mut ids = EventIdGenerator::new();
        assert_eq!(ids.next_id(), EventId::new(1));
        assert_eq!(ids.next_id(), EventId::new(2));
    }
}
