//! # 调度配置
//!
//! ## 核心意图（Why）
//! - 集中声明超时时长、等待队列上限与日志过滤器，避免常量散落在管理器实现中；
//! - 支持从 TOML 文本或文件加载，未出现的字段回落到默认值。
//!
//! ## 行为契约（What）
//! - 默认值：加载超时 500ms、激活超时 5000ms、系统 UI 加载超时 5000ms，等待队列不设上限，
//!   日志过滤器为 `info`；
//! - 任一超时为 0 视为非法配置。

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// 超时消息类型。
///
/// - **契约 (What)**：原始值 `Load = 0`、`Active = 1`，与超时事件一同投递给管理器。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TimeoutKind {
    /// 能力进程加载超时。
    Load,
    /// 能力激活超时。
    Active,
}

impl TimeoutKind {
    pub fn as_raw(self) -> u32 {
        match self {
            TimeoutKind::Load => 0,
            TimeoutKind::Active => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeoutKind::Load => "LOAD_TIMEOUT",
            TimeoutKind::Active => "ACTIVE_TIMEOUT",
        }
    }
}

/// 配置加载错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scheduler config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid scheduler config: {0}")]
    Invalid(String),
}

/// 调度器配置。
///
/// # 教案式说明
/// - **意图 (Why)**：让部署方按设备性能调节超时，同时为“重启风暴”下的等待队列提供可选上限；
/// - **契约 (What)**：
///   - `max_waiting_requests` 为 `None` 表示不限长度；设置后超出的请求以
///     [`AbilityError::QueueFull`](crate::error::AbilityError::QueueFull) 拒绝；
///   - `log_filter` 仅在环境变量 `RUST_LOG` 缺失时生效；
/// - **风险 (Trade-offs)**：超时过短会误杀慢启动的能力，过长则拖慢队列排空。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub load_timeout_ms: u64,
    pub active_timeout_ms: u64,
    pub system_ui_timeout_ms: u64,
    pub max_waiting_requests: Option<usize>,
    pub log_filter: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 500,
            active_timeout_ms: 5_000,
            system_ui_timeout_ms: 5_000,
            max_waiting_requests: None,
            log_filter: "info".to_owned(),
        }
    }
}

impl SchedulerConfig {
    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件读取 TOML 配置。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), ?config, "scheduler config loaded");
        Ok(config)
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("load_timeout_ms", self.load_timeout_ms),
            ("active_timeout_ms", self.active_timeout_ms),
            ("system_ui_timeout_ms", self.system_ui_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("`{name}` must be positive")));
        }
        if self.max_waiting_requests == Some(0) {
            return Err(ConfigError::Invalid(
                "`max_waiting_requests` must be positive when set".to_owned(),
            ));
        }
        Ok(())
    }

    /// 加载超时；内核系统能力使用单独的系统 UI 时长。
    pub fn load_timeout(&self, is_kernel_system_ability: bool) -> Duration {
        if is_kernel_system_ability {
            Duration::from_millis(self.system_ui_timeout_ms)
        } else {
            Duration::from_millis(self.load_timeout_ms)
        }
    }

    pub fn active_timeout(&self) -> Duration {
        Duration::from_millis(self.active_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = SchedulerConfig::from_toml_str("load_timeout_ms = 800\n").expect("配置应可解析");
        assert_eq!(config.load_timeout_ms, 800);
        assert_eq!(config.active_timeout_ms, 5_000);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.load_timeout(true), Duration::from_millis(5_000));
        assert_eq!(config.load_timeout(false), Duration::from_millis(800));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = SchedulerConfig::from_toml_str("active_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SchedulerConfig::from_toml_str("restart_storm = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn queue_cap_must_be_positive() {
        let config = SchedulerConfig::from_toml_str("max_waiting_requests = 4\n").expect("合法上限");
        assert_eq!(config.max_waiting_requests, Some(4));
        assert!(SchedulerConfig::from_toml_str("max_waiting_requests = 0\n").is_err());
    }
}
