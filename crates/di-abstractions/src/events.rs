//! 引擎事件定义
//!
//! 引擎在结构性节点（上下文创建、组件解析、导入绑定、生命周期迁移等）发出事件，
//! 外部可以注册处理器观察这些事件。

use chrono::{DateTime, Utc};
use di_common::BoxError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventHook {
    ContextCreated,
    ContextDestroyed,
    ComponentRegistered,
    ComponentResolved,
    ComponentResolutionFailed,
    ModuleRegistered,
    ModuleBuilt,
    ImportResolved,
    ImportFailed,
    LifecycleStageChanged,
    ErrorOccurred,
}

impl EventHook {
    /// 所有事件类型
    pub const ALL: [EventHook; 11] = [
        Self::ContextCreated,
        Self::ContextDestroyed,
        Self::ComponentRegistered,
        Self::ComponentResolved,
        Self::ComponentResolutionFailed,
        Self::ModuleRegistered,
        Self::ModuleBuilt,
        Self::ImportResolved,
        Self::ImportFailed,
        Self::LifecycleStageChanged,
        Self::ErrorOccurred,
    ];

    /// 事件名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextCreated => "context_created",
            Self::ContextDestroyed => "context_destroyed",
            Self::ComponentRegistered => "component_registered",
            Self::ComponentResolved => "component_resolved",
            Self::ComponentResolutionFailed => "component_resolution_failed",
            Self::ModuleRegistered => "module_registered",
            Self::ModuleBuilt => "module_built",
            Self::ImportResolved => "import_resolved",
            Self::ImportFailed => "import_failed",
            Self::LifecycleStageChanged => "lifecycle_stage_changed",
            Self::ErrorOccurred => "error_occurred",
        }
    }
}

impl fmt::Display for EventHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件数据
#[derive(Debug, Clone, Serialize)]
pub struct EventData {
    /// 事件类型
    pub event: EventHook,
    /// 相关上下文
    pub context: Option<String>,
    /// 相关组件
    pub component: Option<String>,
    /// 附加信息
    pub details: serde_json::Map<String, serde_json::Value>,
    /// 发生时间
    pub timestamp: DateTime<Utc>,
}

impl EventData {
    /// 创建事件数据
    pub fn new(event: EventHook) -> Self {
        Self {
            event,
            context: None,
            component: None,
            details: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// 设置上下文
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// 设置组件
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// 添加附加信息
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// 读取字符串类型的附加信息
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(serde_json::Value::as_str)
    }
}

/// 事件处理器
pub type EventHandler = Arc<dyn Fn(&EventData) -> Result<(), BoxError> + Send + Sync>;
