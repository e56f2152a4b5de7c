//! 结构化日志安装入口。
//!
//! # 教案式说明
//! - **意图（Why）**：宿主进程只需调用一次 [`install`]，调度器内部的 `tracing` 事件即可输出到标准输出；
//! - **逻辑（How）**：`EnvFilter` 优先读取 `RUST_LOG`，缺失时回退到配置中的过滤表达式；
//!   组装 `registry + EnvFilter + fmt` 后设置为全局 Subscriber；
//! - **契约（What）**：重复调用返回 [`ObservabilityError::AlreadyInstalled`]；外部已设置 Subscriber 时返回
//!   [`ObservabilityError::SubscriberAlreadySet`]。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

static INSTALLED: OnceLock<String> = OnceLock::new();

/// 日志安装失败的原因。
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("ability scheduler logging is already installed")]
    AlreadyInstalled,
    #[error("a global tracing subscriber has already been set by the host")]
    SubscriberAlreadySet,
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 安装全局日志 Subscriber。
///
/// - `default_filter`：`RUST_LOG` 缺失时使用的过滤表达式，通常来自 `SchedulerConfig::log_filter`。
pub fn install(default_filter: &str) -> Result<(), ObservabilityError> {
    if INSTALLED.get().is_some() {
        return Err(ObservabilityError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(ObservabilityError::SubscriberAlreadySet);
    }

    let filter = build_env_filter(default_filter)?;
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    INSTALLED
        .set(default_filter.to_owned())
        .map_err(|_| ObservabilityError::AlreadyInstalled)
}

/// 已安装时使用的回退过滤表达式。
pub fn installed_filter() -> Option<&'static str> {
    INSTALLED.get().map(String::as_str)
}

fn build_env_filter(default_filter: &str) -> Result<EnvFilter, ObservabilityError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_filter).map_err(|err| ObservabilityError::InvalidFilter {
            filter: default_filter.to_owned(),
            reason: err.to_string(),
        }),
    }
}
