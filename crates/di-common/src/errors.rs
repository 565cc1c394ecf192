//! 错误类型定义

use std::fmt;
use thiserror::Error;

/// 初始化失败后的回滚结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// 已成功清理的组件（按清理顺序）
    pub cleaned: Vec<String>,
    /// 清理失败的组件及原因
    pub failures: Vec<String>,
}

impl RollbackOutcome {
    /// 回滚是否完全成功
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cleaned.is_empty() && self.failures.is_empty() {
            return f.write_str("无需回滚");
        }
        write!(f, "已清理 [{}]", self.cleaned.join(", "))?;
        if !self.failures.is_empty() {
            write!(f, ", 清理失败 [{}]", self.failures.join("; "))?;
        }
        Ok(())
    }
}

/// 依赖注入错误类型
///
/// 实现了 `Clone`，同一次单例构造失败可以原样传播给所有等待者。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiError {
    #[error("组件未注册: {type_name} (上下文: {context})")]
    ComponentNotFound { type_name: String, context: String },

    #[error("组件重复注册: {type_name} (上下文: {context})")]
    DuplicateRegistration { type_name: String, context: String },

    #[error("检测到循环依赖: {} (上下文: {context})", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String>, context: String },

    #[error("检测到上下文循环依赖: {}", .cycle.join(" -> "))]
    CircularContextDependency { cycle: Vec<String> },

    #[error("上下文导入失败: {context} 无法从 {source_context} 导入 {type_name}, 原因: {reason}")]
    ContextImport {
        context: String,
        type_name: String,
        source_context: String,
        reason: String,
    },

    #[error("组件未导出: {type_name} 不在上下文 {context} 的导出列表中")]
    ExportNotAllowed { type_name: String, context: String },

    #[error("作用域未激活: {target} (上下文: {context})")]
    ScopeNotActive { target: String, context: String },

    #[error("组件初始化失败: {component} (上下文: {context}), 原因: {reason}; 回滚: {rollback}")]
    InitializationFailed {
        component: String,
        context: String,
        reason: String,
        rollback: RollbackOutcome,
    },

    #[error("组件清理失败 (上下文: {context}): {}", .failures.join("; "))]
    CleanupAggregate { context: String, failures: Vec<String> },

    #[error("组件创建失败: {type_name} (上下文: {context}), 原因: {reason}")]
    ComponentCreationFailed {
        type_name: String,
        context: String,
        reason: String,
    },

    #[error("上下文声明无效: {context}, 原因: {message}")]
    InvalidContextDeclaration { context: String, message: String },

    #[error("上下文状态错误: {context}, 原因: {message}")]
    ContextState { context: String, message: String },

    #[error("组件解析超时: {type_name} (上下文: {context}), 超过 {timeout_ms}ms")]
    ResolutionTimeout {
        type_name: String,
        context: String,
        timeout_ms: u64,
    },

    #[error("超过最大解析深度 {max_depth}: {} (上下文: {context})", .chain.join(" -> "))]
    ResolutionDepthExceeded {
        max_depth: usize,
        chain: Vec<String>,
        context: String,
    },
}

impl DiError {
    /// 创建组件未注册错误
    pub fn not_found(type_name: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ComponentNotFound {
            type_name: type_name.into(),
            context: context.into(),
        }
    }

    /// 创建上下文导入错误
    pub fn import_failed(
        context: impl Into<String>,
        type_name: impl Into<String>,
        source_context: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ContextImport {
            context: context.into(),
            type_name: type_name.into(),
            source_context: source_context.into(),
            reason: reason.into(),
        }
    }

    /// 创建上下文声明错误
    pub fn invalid_declaration(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidContextDeclaration {
            context: context.into(),
            message: message.into(),
        }
    }

    /// 创建上下文状态错误
    pub fn context_state(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ContextState {
            context: context.into(),
            message: message.into(),
        }
    }

    /// 是否为循环依赖错误（组件级或上下文级）
    pub fn is_circular(&self) -> bool {
        matches!(
            self,
            Self::CircularDependency { .. } | Self::CircularContextDependency { .. }
        )
    }
}

/// 启动错误类型
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("配置加载失败: {message}")]
    Config { message: String },

    #[error("依赖注入错误: {source}")]
    Dependency {
        #[from]
        source: DiError,
    },

    #[error("上下文依赖校验失败: {}", .diagnostics.join("; "))]
    ValidationFailed { diagnostics: Vec<String> },

    #[error("日志初始化失败: {message}")]
    LoggingInit { message: String },

    #[error("应用关闭失败: {}", .errors.join("; "))]
    ShutdownFailed { errors: Vec<String> },
}

/// 结果类型别名
pub type DiResult<T> = Result<T, DiError>;
pub type BootstrapResult<T> = Result<T, BootstrapError>;
