//! 已构建的应用

use crate::settings::EngineSettings;
use chrono::{DateTime, Utc};
use di_common::{BootstrapError, BootstrapResult, DiError};
use di_impl::{Context, ContextSummary, EventHookManager};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// 应用运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
    /// 关闭失败
    Failed,
}

/// 应用统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationMetrics {
    /// 启动时间
    pub started_at: DateTime<Utc>,
    /// 停止时间
    pub stopped_at: Option<DateTime<Utc>>,
    /// 上下文数量
    pub context_count: usize,
    /// 所有上下文的成功解析次数
    pub resolved_components: u64,
    /// 所有上下文的解析失败次数
    pub resolution_errors: u64,
}

impl ApplicationMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> chrono::Duration {
        self.stopped_at.unwrap_or_else(Utc::now) - self.started_at
    }
}

/// 已构建的应用
///
/// 持有按构建顺序排列的全部上下文
pub struct Application {
    contexts: Vec<Context>,
    hooks: Arc<EventHookManager>,
    settings: EngineSettings,
    status: RwLock<ApplicationStatus>,
    started_at: DateTime<Utc>,
    stopped_at: RwLock<Option<DateTime<Utc>>>,
}

impl Application {
    pub(crate) fn new(contexts: Vec<Context>, hooks: Arc<EventHookManager>, settings: EngineSettings) -> Self {
        Self {
            contexts,
            hooks,
            settings,
            status: RwLock::new(ApplicationStatus::Running),
            started_at: Utc::now(),
            stopped_at: RwLock::new(None),
        }
    }

    /// 按名称获取上下文
    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts.iter().find(|context| context.name() == name)
    }

    /// 所有上下文（按构建顺序）
    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    /// 在指定上下文中解析组件
    pub async fn resolve<T: ?Sized + Send + Sync + 'static>(&self, context: &str) -> BootstrapResult<Arc<T>> {
        let target = self
            .context(context)
            .ok_or_else(|| DiError::context_state(context, "上下文不存在"))?;
        Ok(target.resolve::<T>().await?)
    }

    /// 构建顺序
    pub fn build_order(&self) -> Vec<String> {
        self.contexts
            .iter()
            .map(|context| context.name().to_string())
            .collect()
    }

    /// 运行状态
    pub fn status(&self) -> ApplicationStatus {
        *self.status.read()
    }

    /// 引擎配置
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// 共享的事件管理器
    pub fn hooks(&self) -> &Arc<EventHookManager> {
        &self.hooks
    }

    /// 各上下文摘要（按构建顺序）
    pub fn summaries(&self) -> Vec<ContextSummary> {
        self.contexts.iter().map(Context::summary).collect()
    }

    /// 统计信息
    pub fn metrics(&self) -> ApplicationMetrics {
        let (resolved_components, resolution_errors) =
            self.contexts.iter().fold((0, 0), |(resolved, errors), context| {
                let stats = context.stats();
                (resolved + stats.resolved_components, errors + stats.resolution_errors)
            });

        ApplicationMetrics {
            started_at: self.started_at,
            stopped_at: *self.stopped_at.read(),
            context_count: self.contexts.len(),
            resolved_components,
            resolution_errors,
        }
    }

    /// 关闭应用
    ///
    /// 按构建顺序的逆序关闭上下文，单个上下文关闭失败不影响其余上下文。
    pub async fn shutdown(&self) -> BootstrapResult<()> {
        {
            let mut status = self.status.write();
            if *status != ApplicationStatus::Running {
                return Ok(());
            }
            *status = ApplicationStatus::Stopping;
        }
        info!("开始关闭应用");

        let mut errors = Vec::new();
        for context in self.contexts.iter().rev() {
            if let Err(e) = context.shutdown().await {
                warn!("上下文关闭失败: {}: {}", context.name(), e);
                errors.push(format!("{}: {}", context.name(), e));
            }
        }

        *self.stopped_at.write() = Some(Utc::now());
        if errors.is_empty() {
            *self.status.write() = ApplicationStatus::Stopped;
            info!("应用关闭完成");
            Ok(())
        } else {
            *self.status.write() = ApplicationStatus::Failed;
            Err(BootstrapError::ShutdownFailed { errors })
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("contexts", &self.build_order())
            .field("status", &self.status())
            .finish()
    }
}
