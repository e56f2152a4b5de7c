//! # 能力状态（AbilityState / AppAbilityState）
//!
//! ## 核心意图（Why）
//! - 为每条驻留记录建模最小生命周期状态机，并把进程管理器上报的原始状态投影为粗粒度视图；
//! - 原始状态以整数跨越进程边界，转换函数必须是全函数，任何输入都不能导致失败。
//!
//! ## 状态机约束（What）
//! - 合法跃迁：`Initial → Activating → Active`，`Active → Activating`（新 Want 重入启动），
//!   任意状态可被强制重置为 `Initial`（能力死亡）；
//! - 其余跃迁由 [`AbilityState::can_transition_to`] 拒绝。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 驻留能力记录的生命周期状态。
///
/// # 教案式说明
/// - **意图 (Why)**：管理器依赖 `Activating` 判定是否存在在途跃迁，从而实现单一在途的准入控制；
/// - **契约 (What)**：原始值 `Initial = 0`、`Activating = 1`、`Active = 2`，用于
///   `AbilityTransitionDone` 等以整数传递目标状态的接口；
/// - **风险 (Trade-offs)**：后台、终止等更丰富的状态不在本调度器职责内，引入时需同步扩展跃迁表。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum AbilityState {
    /// 已创建但尚未拉起，或死亡后被重置。
    Initial,
    /// 正在被拉起或激活，等待远端回报。
    Activating,
    /// 已在前台完成激活。
    Active,
}

impl AbilityState {
    /// 从整数还原状态；未知值返回 `None`。
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(AbilityState::Initial),
            1 => Some(AbilityState::Activating),
            2 => Some(AbilityState::Active),
            _ => None,
        }
    }

    /// 状态对应的整数值。
    pub fn as_raw(self) -> i32 {
        match self {
            AbilityState::Initial => 0,
            AbilityState::Activating => 1,
            AbilityState::Active => 2,
        }
    }

    /// 判断状态是否允许跃迁至 `target`。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：管理器在每次改写状态前复用该判定，使状态图与实现保持一致；
    /// - **执行 (How)**：匹配 `(self, target)` 元组；任何状态跃迁到 `Initial` 都被允许（死亡重置）。
    pub fn can_transition_to(self, target: AbilityState) -> bool {
        matches!(
            (self, target),
            (_, AbilityState::Initial)
                | (AbilityState::Initial, AbilityState::Activating)
                | (AbilityState::Activating, AbilityState::Activating)
                | (AbilityState::Activating, AbilityState::Active)
                | (AbilityState::Active, AbilityState::Activating)
        )
    }

    /// 用于诊断输出的大写名称。
    pub fn as_str(self) -> &'static str {
        match self {
            AbilityState::Initial => "INITIAL",
            AbilityState::Activating => "ACTIVATING",
            AbilityState::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for AbilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 进程管理器侧的原始能力状态。
///
/// - **契约 (What)**：`Begin = 0`、`Ready = 1`、`Foreground = 2`、`Background = 3`、`End = 4`；
///   `Begin`/`End` 为哨兵值。跨进程时以 `i32` 传递。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProcessAbilityState {
    Begin,
    Ready,
    Foreground,
    Background,
    End,
}

impl ProcessAbilityState {
    pub fn as_raw(self) -> i32 {
        match self {
            ProcessAbilityState::Begin => 0,
            ProcessAbilityState::Ready => 1,
            ProcessAbilityState::Foreground => 2,
            ProcessAbilityState::Background => 3,
            ProcessAbilityState::End => 4,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(ProcessAbilityState::Begin),
            1 => Some(ProcessAbilityState::Ready),
            2 => Some(ProcessAbilityState::Foreground),
            3 => Some(ProcessAbilityState::Background),
            4 => Some(ProcessAbilityState::End),
            _ => None,
        }
    }
}

/// 进程管理器状态的粗粒度投影。
///
/// # 教案式说明
/// - **意图 (Why)**：调度器只关心前台/后台两种可操作信号，其余细节折叠为 `Undefined`；
/// - **契约 (What)**：由 [`AppAbilityState::from_raw`] 全函数生成，后写覆盖先写；
/// - **风险 (Trade-offs)**：`End` 仅作为枚举完整性保留，转换函数不会产出该值。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum AppAbilityState {
    #[default]
    Undefined,
    Foreground,
    Background,
    End,
}

impl AppAbilityState {
    /// 将跨进程传入的原始状态转换为粗粒度投影。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：`Foreground`/`Background` 原样映射；`Begin`、`Ready`、`End` 以及任何无法识别的整数
    ///   都映射为 `Undefined`；
    /// - **前置条件**：无，输入可以是任意 `i32`。
    pub fn from_raw(raw: i32) -> Self {
        match ProcessAbilityState::from_raw(raw) {
            Some(ProcessAbilityState::Foreground) => AppAbilityState::Foreground,
            Some(ProcessAbilityState::Background) => AppAbilityState::Background,
            _ => AppAbilityState::Undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip_for_known_states() {
        for state in [
            AbilityState::Initial,
            AbilityState::Activating,
            AbilityState::Active,
        ] {
            assert_eq!(AbilityState::from_raw(state.as_raw()), Some(state));
        }
        assert_eq!(AbilityState::from_raw(-1), None);
    }

    #[test]
    fn sentinels_project_to_undefined() {
        assert_eq!(
            AppAbilityState::from_raw(ProcessAbilityState::Begin.as_raw()),
            AppAbilityState::Undefined
        );
        assert_eq!(
            AppAbilityState::from_raw(ProcessAbilityState::End.as_raw()),
            AppAbilityState::Undefined
        );
        assert_eq!(
            AppAbilityState::from_raw(ProcessAbilityState::Foreground.as_raw()),
            AppAbilityState::Foreground
        );
    }

    #[test]
    fn active_cannot_jump_back_without_reset() {
        assert!(!AbilityState::Initial.can_transition_to(AbilityState::Active));
        assert!(AbilityState::Active.can_transition_to(AbilityState::Initial));
        assert!(AbilityState::Active.can_transition_to(AbilityState::Activating));
    }
}
