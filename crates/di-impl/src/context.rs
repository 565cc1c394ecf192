//! 注入上下文
//!
//! 上下文是解析的基本单元：本地注册表 + 作用域管理器 + 导入绑定表。
//! 只有在构建阶段可以修改，构建完成后进入就绪状态。

use crate::broker::ImportBinding;
use crate::hooks::EventHookManager;
use crate::lifecycle::{LifecycleOrchestrator, LifecycleTracker};
use crate::resolver;
use crate::scope::ScopeManager;
use crate::store::MetadataStore;
use async_trait::async_trait;
use di_abstractions::{
    ComponentInstance, ComponentRegistration, ComponentResolver, ContainerConfig, ContextStats,
    EventData, EventHook, ResolveContext, ResolveOptions,
};
use di_common::{type_names, DiError, DiResult, LifecycleState, Scope, TypeInfo};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 上下文状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// 构建中，可以注册组件和绑定导入
    Building,
    /// 已就绪，可以解析
    Ready,
    /// 已关闭
    ShutDown,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Building => "building",
            Self::Ready => "ready",
            Self::ShutDown => "shut_down",
        })
    }
}

#[derive(Default)]
struct ImportTable {
    bindings: HashMap<TypeInfo, ImportBinding>,
    order: Vec<TypeInfo>,
    names: HashMap<String, TypeInfo>,
}

struct ContextInner {
    name: String,
    config: ContainerConfig,
    registry: MetadataStore,
    scopes: ScopeManager,
    imports: RwLock<ImportTable>,
    exports: RwLock<Vec<TypeInfo>>,
    lifecycle: LifecycleTracker,
    state: RwLock<ContextState>,
    hooks: Arc<EventHookManager>,
    resolved: AtomicU64,
    failures: AtomicU64,
}

/// 注入上下文
///
/// 克隆开销很小，所有克隆共享同一个上下文。
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// 使用默认配置创建上下文
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, ContainerConfig::default(), EventHookManager::shared())
    }

    /// 使用指定配置和事件管理器创建上下文
    pub fn with_config(
        name: impl Into<String>,
        config: ContainerConfig,
        hooks: Arc<EventHookManager>,
    ) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(ContextInner {
                registry: MetadataStore::new(name.clone()),
                scopes: ScopeManager::new(name.clone()),
                imports: RwLock::new(ImportTable::default()),
                exports: RwLock::new(Vec::new()),
                lifecycle: LifecycleTracker::default(),
                state: RwLock::new(ContextState::Building),
                resolved: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                name,
                config,
                hooks,
            }),
        }
    }

    /// 上下文名称
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 当前状态
    pub fn state(&self) -> ContextState {
        *self.inner.state.read()
    }

    /// 是否已就绪
    pub fn is_ready(&self) -> bool {
        self.state() == ContextState::Ready
    }

    /// 事件管理器
    pub fn hooks(&self) -> &Arc<EventHookManager> {
        &self.inner.hooks
    }

    /// 是否为同一个上下文
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn registry(&self) -> &MetadataStore {
        &self.inner.registry
    }

    pub(crate) fn scopes(&self) -> &ScopeManager {
        &self.inner.scopes
    }

    pub(crate) fn tracker(&self) -> &LifecycleTracker {
        &self.inner.lifecycle
    }

    pub(crate) fn emit(&self, data: EventData) {
        self.inner.hooks.emit(&data.with_context(self.name()));
    }

    fn ensure_building(&self) -> DiResult<()> {
        match self.state() {
            ContextState::Building => Ok(()),
            state => Err(DiError::context_state(
                self.name(),
                format!("上下文状态为 {state}，只能在构建阶段修改"),
            )),
        }
    }

    fn ensure_ready(&self) -> DiResult<()> {
        match self.state() {
            ContextState::Ready => Ok(()),
            state => Err(DiError::context_state(
                self.name(),
                format!("上下文状态为 {state}，无法解析组件"),
            )),
        }
    }

    // ---- 构建阶段 ----

    /// 注册本地组件
    pub fn register(&self, registration: ComponentRegistration) -> DiResult<()> {
        self.register_shared(Arc::new(registration))
    }

    /// 注册共享的组件描述（通常来自全局组件目录）
    pub fn register_shared(&self, registration: Arc<ComponentRegistration>) -> DiResult<()> {
        self.ensure_building()?;
        let type_info = registration.type_info();

        if let Some(binding) = self.inner.imports.read().bindings.get(&type_info) {
            return Err(DiError::import_failed(
                self.name(),
                type_info.short_name(),
                binding.spec().source_context.as_str(),
                "导入类型不能同时在本地提供",
            ));
        }

        self.inner.registry.register_shared(registration)?;
        self.emit(
            EventData::new(EventHook::ComponentRegistered).with_component(type_info.short_name()),
        );
        Ok(())
    }

    /// 添加导入绑定
    pub fn add_import_binding(&self, binding: ImportBinding) -> DiResult<()> {
        self.ensure_building()?;
        let spec = binding.spec().clone();

        if self.inner.registry.contains(&spec.type_info) {
            return Err(DiError::import_failed(
                self.name(),
                spec.type_info.short_name(),
                spec.source_context,
                "导入类型不能同时在本地提供",
            ));
        }

        let mut imports = self.inner.imports.write();
        if imports.bindings.contains_key(&spec.type_info) {
            return Err(DiError::import_failed(
                self.name(),
                spec.type_info.short_name(),
                spec.source_context,
                "重复导入同一类型",
            ));
        }
        if let Some(alias) = spec.alias.as_deref() {
            if imports.names.contains_key(alias) {
                return Err(DiError::import_failed(
                    self.name(),
                    spec.type_info.short_name(),
                    spec.source_context.as_str(),
                    format!("导入别名 {alias} 已被占用"),
                ));
            }
        }

        debug!(
            "记录导入绑定: {} <- {} ({})",
            self.name(),
            spec.import_key(),
            if binding.is_bound() { "bound" } else { "absent" }
        );
        if let Some(alias) = spec.alias.clone() {
            imports.names.insert(alias, spec.type_info);
        }
        imports.order.push(spec.type_info);
        imports.bindings.insert(spec.type_info, binding);
        Ok(())
    }

    /// 添加导出（必须是本地提供者）
    pub fn add_export(&self, type_info: TypeInfo) -> DiResult<()> {
        self.ensure_building()?;
        if !self.inner.registry.contains(&type_info) {
            return Err(DiError::invalid_declaration(
                self.name(),
                format!("导出类型 {type_info} 不是本地提供者"),
            ));
        }

        let mut exports = self.inner.exports.write();
        if !exports.contains(&type_info) {
            exports.push(type_info);
        }
        Ok(())
    }

    /// 结束构建阶段
    ///
    /// 校验依赖图：每个依赖必须由本地或导入提供，启用检测时不允许循环依赖。
    pub fn mark_built(&self) -> DiResult<()> {
        self.ensure_building()?;

        let imported: HashSet<TypeInfo> = self.imported_types().into_iter().collect();
        let errors = self
            .inner
            .registry
            .validate_graph(&imported, self.config().enable_circular_dependency_detection);
        if let Some(error) = errors.into_iter().next() {
            return Err(error);
        }

        *self.inner.state.write() = ContextState::Ready;
        info!(
            "上下文构建完成: {} (组件: {}, 导入: {}, 导出: {})",
            self.name(),
            self.inner.registry.len(),
            self.inner.imports.read().order.len(),
            self.inner.exports.read().len()
        );
        Ok(())
    }

    // ---- 解析 ----

    /// 解析组件
    pub async fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let type_info = TypeInfo::of::<T>();
        let instance = self.resolve_instance(type_info).await?;
        self.downcast(type_info, &instance)
    }

    /// 解析组件，未满足的可选导入返回 `None`
    pub async fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        if self.is_absent_import(&TypeInfo::of::<T>()) {
            return Ok(None);
        }
        self.resolve::<T>().await.map(Some)
    }

    /// 按类型信息解析组件
    pub async fn resolve_instance(&self, type_info: TypeInfo) -> DiResult<ComponentInstance> {
        self.ensure_ready()?;

        let chain = ResolveContext::with_options(ResolveOptions {
            max_depth: self.config().max_resolution_depth,
        });
        let pending = resolver::resolve(self.clone(), type_info, chain);

        let result = match self.config().resolution_timeout() {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result,
                Err(_) => Err(DiError::ResolutionTimeout {
                    type_name: type_info.short_name(),
                    context: self.name().to_string(),
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }),
            },
            None => pending.await,
        };

        match &result {
            Ok(_) => {
                self.inner.resolved.fetch_add(1, Ordering::Relaxed);
                self.emit(
                    EventData::new(EventHook::ComponentResolved).with_component(type_info.short_name()),
                );
            }
            Err(e) => {
                self.inner.failures.fetch_add(1, Ordering::Relaxed);
                warn!("组件解析失败: {} (上下文: {}): {}", type_info, self.name(), e);
                self.emit(
                    EventData::new(EventHook::ComponentResolutionFailed)
                        .with_component(type_info.short_name())
                        .with_detail("error", e.to_string()),
                );
            }
        }
        result
    }

    /// 按组件名称或导入别名解析
    pub async fn resolve_by_name(&self, name: &str) -> DiResult<ComponentInstance> {
        let imported = self.inner.imports.read().names.get(name).copied();
        if let Some(type_info) = imported {
            return self.resolve_instance(type_info).await;
        }

        match self.inner.registry.find_by_name(name) {
            Some(registration) => self.resolve_instance(registration.type_info()).await,
            None => Err(DiError::not_found(name, self.name())),
        }
    }

    fn downcast<T: ?Sized + Send + Sync + 'static>(
        &self,
        type_info: TypeInfo,
        instance: &ComponentInstance,
    ) -> DiResult<Arc<T>> {
        instance
            .downcast::<T>()
            .ok_or_else(|| DiError::ComponentCreationFailed {
                type_name: type_info.short_name(),
                context: self.name().to_string(),
                reason: format!("实例类型与请求类型不符: {}", instance.type_info()),
            })
    }

    /// 是否注册了指定类型（本地提供或已绑定的导入）
    pub fn is_registered(&self, type_info: &TypeInfo) -> bool {
        self.inner.registry.contains(type_info)
            || self
                .inner
                .imports
                .read()
                .bindings
                .get(type_info)
                .is_some_and(ImportBinding::is_bound)
    }

    /// 是否注册了指定类型
    pub fn is_registered_type<T: ?Sized + 'static>(&self) -> bool {
        self.is_registered(&TypeInfo::of::<T>())
    }

    /// 本地注册的类型（按注册顺序）
    pub fn get_registered_types(&self) -> Vec<TypeInfo> {
        self.inner.registry.registered_types()
    }

    pub(crate) fn import_binding(&self, type_info: &TypeInfo) -> Option<ImportBinding> {
        self.inner.imports.read().bindings.get(type_info).cloned()
    }

    pub(crate) fn is_absent_import(&self, type_info: &TypeInfo) -> bool {
        self.inner
            .imports
            .read()
            .bindings
            .get(type_info)
            .is_some_and(|binding| !binding.is_bound())
    }

    // ---- 导入/导出 ----

    /// 是否导出指定类型
    pub fn can_export(&self, type_info: &TypeInfo) -> bool {
        self.inner.exports.read().contains(type_info)
    }

    /// 解析导出的组件实例
    ///
    /// 本地可以解析但未导出的类型返回 [`DiError::ExportNotAllowed`]。
    pub async fn get_exported_instance(&self, type_info: TypeInfo) -> DiResult<ComponentInstance> {
        if !self.can_export(&type_info) {
            return Err(DiError::ExportNotAllowed {
                type_name: type_info.short_name(),
                context: self.name().to_string(),
            });
        }
        self.resolve_instance(type_info).await
    }

    /// 解析导出的组件
    pub async fn get_exported<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let type_info = TypeInfo::of::<T>();
        let instance = self.get_exported_instance(type_info).await?;
        self.downcast(type_info, &instance)
    }

    /// 导入的类型（按声明顺序，含缺失的可选导入）
    pub fn imported_types(&self) -> Vec<TypeInfo> {
        self.inner.imports.read().order.clone()
    }

    /// 导入绑定（按声明顺序）
    pub fn import_bindings(&self) -> Vec<ImportBinding> {
        let imports = self.inner.imports.read();
        imports
            .order
            .iter()
            .filter_map(|type_info| imports.bindings.get(type_info).cloned())
            .collect()
    }

    /// 导出的类型
    pub fn exported_types(&self) -> Vec<TypeInfo> {
        self.inner.exports.read().clone()
    }

    // ---- 作用域 ----

    /// 进入作用域
    pub fn enter_scope(&self, name: impl Into<String>) -> Scope {
        self.inner.scopes.enter_scope(name)
    }

    /// 退出作用域
    pub async fn exit_scope(&self, name: &str) -> DiResult<()> {
        self.inner.scopes.exit_scope(name).await
    }

    /// 当前作用域
    pub fn active_scope(&self) -> Option<Scope> {
        self.inner.scopes.active_scope()
    }

    // ---- 生命周期 ----

    /// 组件最近一个实例的生命周期状态
    pub fn lifecycle_state(&self, type_info: &TypeInfo) -> Option<LifecycleState> {
        self.inner.lifecycle.state_of(type_info)
    }

    /// 初始化顺序
    pub fn get_initialization_order(&self) -> Vec<TypeInfo> {
        self.inner.lifecycle.initialization_order()
    }

    /// 清理顺序（初始化顺序的逆序）
    pub fn get_cleanup_order(&self) -> Vec<TypeInfo> {
        self.inner.lifecycle.cleanup_order()
    }

    /// 初始化尚未初始化的单例，返回本次初始化的数量
    pub async fn initialize(&self) -> DiResult<usize> {
        self.ensure_ready()?;
        LifecycleOrchestrator::new(self.clone()).initialize().await
    }

    /// 关闭上下文
    ///
    /// 退出所有作用域，按初始化逆序清理组件。重复调用无效果。
    pub async fn shutdown(&self) -> DiResult<()> {
        if self.state() == ContextState::ShutDown {
            return Ok(());
        }
        info!("关闭上下文: {}", self.name());

        let mut failures = Vec::new();
        let scope_result = self.inner.scopes.exit_all().await;
        let cleanup_result = LifecycleOrchestrator::new(self.clone()).cleanup_all().await;
        for result in [scope_result, cleanup_result] {
            match result {
                Ok(()) => {}
                Err(DiError::CleanupAggregate { failures: inner, .. }) => failures.extend(inner),
                Err(other) => failures.push(other.to_string()),
            }
        }

        *self.inner.state.write() = ContextState::ShutDown;
        self.emit(EventData::new(EventHook::ContextDestroyed));

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::CleanupAggregate {
                context: self.name().to_string(),
                failures,
            })
        }
    }

    // ---- 诊断 ----

    /// 统计信息
    pub fn stats(&self) -> ContextStats {
        ContextStats {
            registered_components: self.inner.registry.len(),
            imported_components: self.inner.imports.read().order.len(),
            exported_components: self.inner.exports.read().len(),
            active_singletons: self.inner.scopes.singleton_count(),
            scope_depth: self.inner.scopes.scope_depth(),
            resolved_components: self.inner.resolved.load(Ordering::Relaxed),
            resolution_errors: self.inner.failures.load(Ordering::Relaxed),
        }
    }

    /// 上下文快照
    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            name: self.name().to_string(),
            state: self.state(),
            registered: type_names(&self.get_registered_types()),
            imports: self
                .import_bindings()
                .iter()
                .map(|binding| {
                    let spec = binding.spec();
                    ImportSummary {
                        type_name: spec.type_info.short_name(),
                        source_context: spec.source_context.clone(),
                        alias: spec.alias.clone(),
                        required: spec.required,
                        bound: binding.is_bound(),
                    }
                })
                .collect(),
            exports: type_names(&self.exported_types()),
            initialization_order: type_names(&self.get_initialization_order()),
            stats: self.stats(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("registered", &type_names(&self.get_registered_types()))
            .finish()
    }
}

#[async_trait]
impl ComponentResolver for Context {
    async fn resolve_instance(&self, type_info: TypeInfo) -> DiResult<ComponentInstance> {
        Context::resolve_instance(self, type_info).await
    }

    async fn resolve_by_name(&self, name: &str) -> DiResult<ComponentInstance> {
        Context::resolve_by_name(self, name).await
    }

    fn can_resolve(&self, type_info: &TypeInfo) -> bool {
        self.is_registered(type_info)
    }

    fn resolver_name(&self) -> &str {
        self.name()
    }
}

/// 导入快照
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub type_name: String,
    pub source_context: String,
    pub alias: Option<String>,
    pub required: bool,
    pub bound: bool,
}

/// 上下文快照
#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub name: String,
    pub state: ContextState,
    pub registered: Vec<String>,
    pub imports: Vec<ImportSummary>,
    pub exports: Vec<String>,
    pub initialization_order: Vec<String>,
    pub stats: ContextStats,
}
