//! 组件生命周期管理

use serde::{Deserialize, Serialize};
use std::fmt;

/// 组件生命周期类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// 单例模式 - 上下文生命周期内只创建一个实例
    #[default]
    Singleton,
    /// 作用域模式 - 在同一作用域帧内共享实例
    Scoped,
    /// 瞬时模式 - 每次请求都创建新实例
    Transient,
}

impl Lifetime {
    /// 获取生命周期名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Singleton => "singleton",
            Self::Scoped => "scoped",
            Self::Transient => "transient",
        }
    }

    /// 实例是否会被缓存
    pub fn is_cached(&self) -> bool {
        !matches!(self, Self::Transient)
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 组件作用域帧
#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    pub id: uuid::Uuid,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Scope {
    /// 创建新作用域
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            created_at: chrono::Utc::now(),
        }
    }

    /// 创建子作用域
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self::new(format!("{}.{}", self.name, name.into()))
    }
}

/// 组件实例生命周期状态
///
/// `Created → Initializing → Initialized → CleaningUp → Destroyed`，
/// 初始化过程中出错直接进入终态 `FailedInit`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// 已创建，尚未初始化
    #[default]
    Created,
    /// 初始化中
    Initializing,
    /// 已初始化
    Initialized,
    /// 清理中
    CleaningUp,
    /// 已销毁
    Destroyed,
    /// 初始化失败（实例被丢弃）
    FailedInit,
}

impl LifecycleState {
    /// 是否允许迁移到目标状态
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Initializing)
                | (Self::Initializing, Self::Initialized | Self::FailedInit)
                | (Self::Initialized, Self::CleaningUp)
                | (Self::CleaningUp, Self::Destroyed)
        )
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed | Self::FailedInit)
    }

    /// 获取状态名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::CleaningUp => "cleaning_up",
            Self::Destroyed => "destroyed",
            Self::FailedInit => "failed_init",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
