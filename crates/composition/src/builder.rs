//! 应用构建器

use crate::application::Application;
use crate::settings::EngineSettings;
use di_abstractions::{ComponentRegistration, ContextDescriptor, EventData, EventHook};
use di_common::{BootstrapError, BootstrapResult, BoxError};
use di_impl::{ContextGraphBuilder, EventHookManager, MetadataStore, ModuleRegistry};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// 组件目录的所有者名称
const CATALOG_OWNER: &str = "catalog";

/// 应用构建器
///
/// 收集组件注册与上下文声明，校验后按依赖顺序构建所有上下文
pub struct ApplicationBuilder {
    /// 组件目录
    catalog: Arc<MetadataStore>,
    /// 上下文声明注册表
    modules: ModuleRegistry,
    /// 引擎配置
    settings: EngineSettings,
    /// 显式指定的日志配置，优先于配置文件中的日志配置
    logging_config: Option<LoggingConfig>,
    /// 共享的事件管理器
    hooks: Arc<EventHookManager>,
}

impl ApplicationBuilder {
    /// 创建新的应用构建器
    pub fn new() -> Self {
        let hooks = EventHookManager::shared();
        Self {
            catalog: Arc::new(MetadataStore::new(CATALOG_OWNER)),
            modules: ModuleRegistry::with_hooks(hooks.clone()),
            settings: EngineSettings::default(),
            logging_config: None,
            hooks,
        }
    }

    /// 设置引擎配置
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 从配置文件加载引擎配置
    pub fn load_settings<P: AsRef<Path>>(mut self, path: P) -> BootstrapResult<Self> {
        self.settings = EngineSettings::load(path)?;
        Ok(self)
    }

    /// 启用日志初始化
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    /// 注册事件处理器
    pub fn on<F>(self, event: EventHook, handler: F) -> Self
    where
        F: Fn(&EventData) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hooks.register(event, handler);
        self
    }

    /// 注册组件
    pub fn register(self, registration: ComponentRegistration) -> BootstrapResult<Self> {
        self.catalog.register(registration)?;
        Ok(self)
    }

    /// 添加上下文声明
    pub fn add_context(self, descriptor: ContextDescriptor) -> BootstrapResult<Self> {
        self.modules.register_module(descriptor)?;
        Ok(self)
    }

    /// 当前引擎配置
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// 组件目录
    pub fn catalog(&self) -> &Arc<MetadataStore> {
        &self.catalog
    }

    /// 上下文声明注册表
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// 共享的事件管理器
    pub fn hooks(&self) -> &Arc<EventHookManager> {
        &self.hooks
    }

    fn graph_builder(&self) -> ContextGraphBuilder {
        ContextGraphBuilder::new(self.catalog.clone())
            .with_config(self.settings.container.clone())
            .with_hooks(self.hooks.clone())
    }

    /// 预演校验，返回全部诊断信息
    pub fn validate(&self) -> Vec<String> {
        self.graph_builder()
            .validate_module_dependencies(&self.modules.all_modules())
    }

    /// 构建应用
    pub async fn build(self) -> BootstrapResult<Application> {
        if let Some(config) = self.effective_logging()? {
            initialize_logging(&config)?;
        }

        info!(
            "开始构建应用: {} 个组件, {} 个上下文",
            self.catalog.len(),
            self.modules.len()
        );

        let diagnostics = self.validate();
        if !diagnostics.is_empty() {
            for diagnostic in &diagnostics {
                error!("上下文校验失败: {}", diagnostic);
            }
            return Err(BootstrapError::ValidationFailed { diagnostics });
        }

        let descriptors = self.modules.all_modules();
        let contexts = self
            .graph_builder()
            .build_contexts_ordered(&descriptors)
            .await?;
        debug!("已构建 {} 个上下文", contexts.len());

        let application = Application::new(contexts, self.hooks, self.settings);
        info!("应用构建完成, 构建顺序: [{}]", application.build_order().join(", "));
        Ok(application)
    }

    fn effective_logging(&self) -> BootstrapResult<Option<LoggingConfig>> {
        if let Some(config) = &self.logging_config {
            return Ok(Some(config.clone()));
        }
        if self.settings.logging.enabled {
            return self.settings.logging.to_logging_config().map(Some);
        }
        Ok(None)
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("catalog", &self.catalog)
            .field("modules", &self.modules)
            .field("settings", &self.settings)
            .finish()
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: tracing::Level,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 开发环境：调试级别，带源码位置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 生产环境：JSON 输出
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }
}

/// 初始化全局日志订阅者
///
/// 进程内只能成功一次，重复初始化返回 [`BootstrapError::LoggingInit`]。
pub fn initialize_logging(config: &LoggingConfig) -> BootstrapResult<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.level)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| BootstrapError::LoggingInit {
        message: e.to_string(),
    })?;

    info!("日志系统初始化完成, 级别: {}", config.level);
    Ok(())
}
