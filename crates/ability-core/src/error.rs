//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为调度器对外暴露的失败语义提供集中定义；
//! - 区分三类情形：传输失败（无连接、远端失败）、前置条件失败（令牌无法解析、非法状态组合）、
//!   以及准入延后（不是错误，由 [`StartOutcome::Waiting`] 单独表达）。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`；
//! - 每个变体可折叠为粗粒度的 [`ErrorCode`]，供诊断命令与跨进程边界使用；
//! - 超时不是返回值，由管理器内部丢弃卡死记录并排空队列。

use thiserror::Error;

use crate::{state::AbilityState, token::AbilityToken};

/// 粗粒度状态码。
///
/// - **契约 (What)**：`Ok` 与 `StartAbilityWaiting` 都代表调用被接受，后者表示已排队延后；
///   `InvalidValue` 为协议错误，`InnerError` 为传输或内部错误。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCode {
    Ok,
    InvalidValue,
    InnerError,
    StartAbilityWaiting,
}

impl ErrorCode {
    /// 对外稳定的整数值。
    pub fn as_raw(self) -> i32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::InvalidValue => 22,
            ErrorCode::InnerError => 2_097_152,
            ErrorCode::StartAbilityWaiting => 2_097_153,
        }
    }
}

/// `StartAbility` 的成功结果。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StartOutcome {
    /// 目标记录已进入 `Activating`。
    Started,
    /// 存在在途跃迁，请求已追加到等待队列尾部。
    Waiting,
}

impl StartOutcome {
    pub fn error_code(self) -> ErrorCode {
        match self {
            StartOutcome::Started => ErrorCode::Ok,
            StartOutcome::Waiting => ErrorCode::StartAbilityWaiting,
        }
    }
}

/// 调度器错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：聚合管理器与网关的失败路径，细粒度变体方便排障，同时可折叠为 [`ErrorCode`]；
/// - **契约 (What)**：
///   - 所有变体均为 `Send + Sync + 'static`，可随应答通道跨任务传递；
///   - [`AbilityError::code`] 给出稳定的 `ability.*` 错误码；
/// - **执行逻辑 (How)**：前置条件类变体折叠为 `InvalidValue`，其余折叠为 `InnerError`。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum AbilityError {
    /// 调用方传入了空令牌。
    #[error("ability token is null")]
    TokenMissing,

    /// 令牌未对应任何驻留记录。
    #[error("no resident ability record for {token}")]
    RecordNotFound { token: AbilityToken },

    /// 状态机拒绝的跃迁。
    ///
    /// - **契约 (What)**：`from` 为记录当前状态，`to` 为调用方请求的目标；
    ///   目标无法识别时 `to` 为 `None`。
    #[error("invalid transition for {token}: {from} -> {to:?} is not permitted")]
    InvalidTransition {
        token: AbilityToken,
        from: AbilityState,
        to: Option<AbilityState>,
    },

    /// 其他参数错误，例如初始化时缺少观察者。
    #[error("invalid value: {context}")]
    InvalidValue { context: String },

    /// 进程管理器不可达或远端调用失败。
    #[error("inner error during `{operation}`: {detail}")]
    Inner {
        operation: &'static str,
        detail: String,
    },

    /// 等待队列已达到配置上限。
    #[error("waiting queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// 管理器任务已退出，命令无法投递。
    #[error("ability stack manager is no longer running")]
    ManagerClosed,
}

impl AbilityError {
    /// 构造内部错误的便捷方法。
    pub fn inner(operation: &'static str, detail: impl Into<String>) -> Self {
        AbilityError::Inner {
            operation,
            detail: detail.into(),
        }
    }

    /// 折叠后的粗粒度状态码。
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AbilityError::TokenMissing
            | AbilityError::RecordNotFound { .. }
            | AbilityError::InvalidTransition { .. }
            | AbilityError::InvalidValue { .. } => ErrorCode::InvalidValue,
            AbilityError::Inner { .. }
            | AbilityError::QueueFull { .. }
            | AbilityError::ManagerClosed => ErrorCode::InnerError,
        }
    }

    /// 稳定错误码，供日志与诊断输出。
    pub fn code(&self) -> &'static str {
        match self {
            AbilityError::TokenMissing => "ability.token.missing",
            AbilityError::RecordNotFound { .. } => "ability.record.missing",
            AbilityError::InvalidTransition { .. } => "ability.state.invalid_transition",
            AbilityError::InvalidValue { .. } => "ability.invalid_value",
            AbilityError::Inner { .. } => "ability.inner",
            AbilityError::QueueFull { .. } => "ability.queue.full",
            AbilityError::ManagerClosed => "ability.manager.closed",
        }
    }

    pub fn is_invalid_value(&self) -> bool {
        self.error_code() == ErrorCode::InvalidValue
    }
}

/// 把调用结果折叠为粗粒度状态码。
pub fn collapse<T>(result: &Result<T, AbilityError>) -> ErrorCode {
    match result {
        Ok(_) => ErrorCode::Ok,
        Err(err) => err.error_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_failures_collapse_to_invalid_value() {
        let token = AbilityToken::from_raw(7);
        let err = AbilityError::InvalidTransition {
            token,
            from: AbilityState::Initial,
            to: Some(AbilityState::Active),
        };
        assert_eq!(err.error_code(), ErrorCode::InvalidValue);
        assert_eq!(err.code(), "ability.state.invalid_transition");
        assert!(AbilityError::TokenMissing.is_invalid_value());
    }

    #[test]
    fn transport_failures_collapse_to_inner_error() {
        let err = AbilityError::inner("load_ability", "no connection");
        assert_eq!(err.error_code(), ErrorCode::InnerError);
        assert_eq!(collapse::<()>(&Err(err)), ErrorCode::InnerError);
        assert_eq!(collapse(&Ok(())), ErrorCode::Ok);
    }

    #[test]
    fn waiting_is_distinct_from_rejection() {
        assert_eq!(
            StartOutcome::Waiting.error_code(),
            ErrorCode::StartAbilityWaiting
        );
        assert_ne!(
            StartOutcome::Waiting.error_code().as_raw(),
            ErrorCode::InvalidValue.as_raw()
        );
    }
}
