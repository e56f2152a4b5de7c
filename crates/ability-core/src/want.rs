//! # 启动意图与能力描述
//!
//! ## 核心意图（Why）
//! - 描述“启动哪个能力、携带哪些参数”的请求载荷，作为管理器准入与去重的输入；
//! - 请求一旦入队即不可变，出队时原样用于启动。
//!
//! ## 行为契约（What）
//! - 去重只看 `AbilityInfo::bundle_name` 与 `AbilityInfo::name`，`Want` 参数不参与比较；
//! - `request_code = -1` 与空的 `caller_token` 都是合法输入。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::token::AbilityToken;

/// 能力的定位三元组。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ElementName {
    pub device_id: String,
    pub bundle_name: String,
    pub ability_name: String,
}

impl ElementName {
    pub fn new(
        device_id: impl Into<String>,
        bundle_name: impl Into<String>,
        ability_name: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            bundle_name: bundle_name.into(),
            ability_name: ability_name.into(),
        }
    }

    /// `device/bundle/ability` 形式的 URI，供日志使用。
    pub fn uri(&self) -> String {
        format!(
            "{}/{}/{}",
            self.device_id, self.bundle_name, self.ability_name
        )
    }
}

/// 结构化启动意图。
///
/// # 教案式说明
/// - **意图 (Why)**：承载目标能力与附加参数，随生命周期事务一并下发给能力线程；
/// - **契约 (What)**：`params` 使用 `BTreeMap` 保证诊断输出顺序稳定；
/// - **风险 (Trade-offs)**：参数仅支持字符串值，复杂载荷需由上层自行编码。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Want {
    element: ElementName,
    params: BTreeMap<String, String>,
}

impl Want {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以包名与能力名设置目标，设备号保持为空。
    pub fn with_element_name(
        mut self,
        bundle_name: impl Into<String>,
        ability_name: impl Into<String>,
    ) -> Self {
        self.element = ElementName::new("", bundle_name, ability_name);
        self
    }

    pub fn with_element(mut self, element: ElementName) -> Self {
        self.element = element;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn element(&self) -> &ElementName {
        &self.element
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// 能力类型。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum AbilityType {
    #[default]
    Unknown,
    Page,
    Service,
    Data,
}

impl AbilityType {
    pub fn as_str(self) -> &'static str {
        match self {
            AbilityType::Unknown => "UNKNOWN",
            AbilityType::Page => "PAGE",
            AbilityType::Service => "SERVICE",
            AbilityType::Data => "DATA",
        }
    }
}

/// 能力静态描述。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AbilityInfo {
    pub name: String,
    pub bundle_name: String,
    pub application_name: String,
    pub ability_type: AbilityType,
}

/// 应用静态描述。
///
/// - **契约 (What)**：`is_launcher_app` 为真时，由此创建的记录会标记为桌面能力。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub name: String,
    pub bundle_name: String,
    pub is_launcher_app: bool,
}

/// 待处理的启动请求。
///
/// # 教案式说明
/// - **意图 (Why)**：准入控制可能把请求延后，因此请求需自带全部启动信息；
/// - **契约 (What)**：
///   - `request_code`：调用方自定义的请求码，`-1` 表示无需结果回传；
///   - `caller_token`：发起方能力令牌，可为空；
///   - 入队后不可变，出队时原样交给启动流程。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AbilityRequest {
    pub want: Want,
    pub ability_info: AbilityInfo,
    pub app_info: ApplicationInfo,
    pub request_code: i32,
    pub caller_token: Option<AbilityToken>,
}

impl AbilityRequest {
    /// 以包名与能力名构造最小请求，`Want` 目标与之保持一致。
    pub fn new(bundle_name: impl Into<String>, ability_name: impl Into<String>) -> Self {
        let bundle_name = bundle_name.into();
        let ability_name = ability_name.into();
        Self {
            want: Want::new().with_element_name(bundle_name.clone(), ability_name.clone()),
            ability_info: AbilityInfo {
                name: ability_name,
                bundle_name: bundle_name.clone(),
                ..AbilityInfo::default()
            },
            app_info: ApplicationInfo {
                bundle_name,
                ..ApplicationInfo::default()
            },
            request_code: -1,
            caller_token: None,
        }
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.ability_info.application_name = name.clone();
        self.app_info.name = name;
        self
    }

    pub fn with_launcher_app(mut self, is_launcher_app: bool) -> Self {
        self.app_info.is_launcher_app = is_launcher_app;
        self
    }

    pub fn with_caller(mut self, caller: Option<AbilityToken>) -> Self {
        self.caller_token = caller;
        self
    }

    pub fn with_request_code(mut self, request_code: i32) -> Self {
        self.request_code = request_code;
        self
    }
}

impl Default for AbilityRequest {
    /// 空请求：无包名、无能力名，对应调用方未填写 Want 的情形。
    fn default() -> Self {
        Self::new("", "")
    }
}
