//! 生命周期编排
//!
//! 按依赖顺序逐个初始化上下文内的单例，失败时回滚已初始化的组件；
//! 清理严格按初始化顺序的逆序执行。

use crate::context::Context;
use di_abstractions::{ComponentInstance, EventData, EventHook};
use di_common::{DiError, DiResult, Lifetime, LifecycleState, RollbackOutcome, TypeInfo};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Default)]
struct TrackerInner {
    states: HashMap<Uuid, LifecycleState>,
    latest: HashMap<TypeInfo, Uuid>,
    initialized: Vec<ComponentInstance>,
    init_order: Vec<TypeInfo>,
}

/// 实例生命周期状态记录
#[derive(Default)]
pub struct LifecycleTracker {
    inner: Mutex<TrackerInner>,
}

impl LifecycleTracker {
    /// 实例是否已进入生命周期管理
    pub fn is_tracked(&self, id: &Uuid) -> bool {
        self.inner.lock().states.contains_key(id)
    }

    /// 状态迁移，非法迁移返回 `false` 且不改变状态
    pub fn transition(&self, instance: &ComponentInstance, next: LifecycleState) -> bool {
        let mut inner = self.inner.lock();
        let current = inner.states.get(&instance.id()).copied().unwrap_or_default();
        if !current.can_transition_to(next) {
            return false;
        }

        inner.states.insert(instance.id(), next);
        inner.latest.insert(instance.type_info(), instance.id());
        if next == LifecycleState::Initialized {
            inner.initialized.push(instance.clone());
            inner.init_order.push(instance.type_info());
        }
        true
    }

    /// 组件最近一个实例的状态
    pub fn state_of(&self, type_info: &TypeInfo) -> Option<LifecycleState> {
        let inner = self.inner.lock();
        let id = inner.latest.get(type_info)?;
        inner.states.get(id).copied()
    }

    /// 初始化顺序
    pub fn initialization_order(&self) -> Vec<TypeInfo> {
        self.inner.lock().init_order.clone()
    }

    /// 清理顺序
    pub fn cleanup_order(&self) -> Vec<TypeInfo> {
        let mut order = self.initialization_order();
        order.reverse();
        order
    }

    /// 取出指定位置之后初始化的实例
    fn take_initialized_from(&self, start: usize) -> Vec<ComponentInstance> {
        let mut inner = self.inner.lock();
        let start = start.min(inner.initialized.len());
        inner.initialized.split_off(start)
    }

    fn initialized_count(&self) -> usize {
        self.inner.lock().initialized.len()
    }
}

/// 生命周期编排器
pub struct LifecycleOrchestrator {
    context: Context,
}

impl LifecycleOrchestrator {
    /// 创建编排器
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// 初始化上下文中尚未初始化的单例
    ///
    /// 严格串行执行。某个组件初始化失败时停止后续初始化，
    /// 逆序清理本轮已初始化的组件，然后返回 [`DiError::InitializationFailed`]。
    pub async fn initialize(&self) -> DiResult<usize> {
        if self.context.config().eager_singletons {
            self.create_eager_singletons().await?;
        }

        let tracker = self.context.tracker();
        let candidates: Vec<ComponentInstance> = self
            .context
            .scopes()
            .singleton_instances()
            .into_iter()
            .filter(|instance| !tracker.is_tracked(&instance.id()))
            .collect();
        let ordered = self.plan_initialization(candidates);
        let round_start = tracker.initialized_count();

        info!(
            "开始初始化组件: {} ({} 个)",
            self.context.name(),
            ordered.len()
        );

        for instance in &ordered {
            self.change_state(instance, LifecycleState::Initializing);
            match instance.hooks().initialize().await {
                Ok(()) => {
                    self.change_state(instance, LifecycleState::Initialized);
                    debug!("组件初始化完成: {} ({})", instance.type_info(), self.context.name());
                }
                Err(e) => {
                    self.change_state(instance, LifecycleState::FailedInit);
                    self.context.scopes().discard_singleton(&instance.type_info());
                    error!(
                        "组件初始化失败: {} ({}): {}",
                        instance.type_info(),
                        self.context.name(),
                        e
                    );

                    let rollback = self.rollback(round_start).await;
                    self.context.emit(
                        EventData::new(EventHook::ErrorOccurred)
                            .with_component(instance.type_info().short_name())
                            .with_detail("reason", e.to_string())
                            .with_detail("rollback", rollback.to_string()),
                    );
                    return Err(DiError::InitializationFailed {
                        component: instance.type_info().short_name(),
                        context: self.context.name().to_string(),
                        reason: e.to_string(),
                        rollback,
                    });
                }
            }
        }

        Ok(ordered.len())
    }

    /// 按初始化逆序清理所有已初始化的组件
    ///
    /// 每个组件都会得到清理机会，失败会汇总为 [`DiError::CleanupAggregate`]。
    pub async fn cleanup_all(&self) -> DiResult<()> {
        let instances = self.context.tracker().take_initialized_from(0);
        info!("开始清理组件: {} ({} 个)", self.context.name(), instances.len());

        let mut failures = Vec::new();
        for instance in instances.iter().rev() {
            if let Err(reason) = self.cleanup_instance(instance).await {
                failures.push(reason);
            }
        }
        self.context.scopes().clear_singletons();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::CleanupAggregate {
                context: self.context.name().to_string(),
                failures,
            })
        }
    }

    async fn rollback(&self, round_start: usize) -> RollbackOutcome {
        let instances = self.context.tracker().take_initialized_from(round_start);
        let mut outcome = RollbackOutcome::default();

        for instance in instances.iter().rev() {
            match self.cleanup_instance(instance).await {
                Ok(()) => outcome.cleaned.push(instance.type_info().short_name()),
                Err(reason) => outcome.failures.push(reason),
            }
            self.context.scopes().discard_singleton(&instance.type_info());
        }

        warn!("初始化回滚: {} - {}", self.context.name(), outcome);
        outcome
    }

    async fn cleanup_instance(&self, instance: &ComponentInstance) -> Result<(), String> {
        self.change_state(instance, LifecycleState::CleaningUp);
        let result = instance.hooks().cleanup().await;
        self.change_state(instance, LifecycleState::Destroyed);

        result.map_err(|e| {
            warn!(
                "组件清理失败: {} ({}): {}",
                instance.type_info(),
                self.context.name(),
                e
            );
            format!("{}: {}", instance.type_info(), e)
        })
    }

    fn change_state(&self, instance: &ComponentInstance, next: LifecycleState) {
        if self.context.tracker().transition(instance, next) {
            self.context.emit(
                EventData::new(EventHook::LifecycleStageChanged)
                    .with_component(instance.type_info().short_name())
                    .with_detail("state", next.as_str()),
            );
        }
    }

    /// 预先创建单例
    ///
    /// 依赖闭包中含有作用域组件的单例需要活跃作用域，跳过。
    async fn create_eager_singletons(&self) -> DiResult<()> {
        for registration in self.context.registry().list_all() {
            let type_info = registration.type_info();
            if registration.lifetime() != Lifetime::Singleton || self.requires_scope(type_info) {
                continue;
            }
            self.context.resolve_instance(type_info).await?;
        }
        Ok(())
    }

    fn requires_scope(&self, root: TypeInfo) -> bool {
        let registry = self.context.registry();
        let mut stack = vec![root];
        let mut seen = HashSet::new();

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(registration) = registry.get(&current) else {
                continue;
            };
            if registration.lifetime() == Lifetime::Scoped {
                return true;
            }
            stack.extend(registration.dependencies().iter().copied());
        }
        false
    }

    /// 计算初始化顺序
    ///
    /// 依赖关系沿本地注册表传递计算（经过瞬时组件的间接依赖同样生效），
    /// 没有未满足依赖的组件先初始化，并列时按注册顺序。
    fn plan_initialization(&self, candidates: Vec<ComponentInstance>) -> Vec<ComponentInstance> {
        let registry = self.context.registry();
        let rank = |type_info: &TypeInfo| registry.position(type_info).unwrap_or(usize::MAX);

        let mut candidates = candidates;
        candidates.sort_by_key(|instance| rank(&instance.type_info()));
        let index: HashMap<TypeInfo, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, instance)| (instance.type_info(), i))
            .collect();

        let mut indegree = vec![0usize; candidates.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); candidates.len()];
        for (i, instance) in candidates.iter().enumerate() {
            for dependency in self.local_closure(instance.type_info()) {
                if let Some(&j) = index.get(&dependency) {
                    if i != j {
                        indegree[i] += 1;
                        dependents[j].push(i);
                    }
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..candidates.len()).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(candidates.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        // 构建时已拒绝循环依赖，这里只是兜底，剩余组件按注册顺序追加
        if order.len() < candidates.len() {
            let placed: HashSet<usize> = order.iter().copied().collect();
            order.extend((0..candidates.len()).filter(|i| !placed.contains(i)));
        }

        order.into_iter().map(|i| candidates[i].clone()).collect()
    }

    fn local_closure(&self, root: TypeInfo) -> HashSet<TypeInfo> {
        let registry = self.context.registry();
        let mut closure = HashSet::new();
        let mut stack: Vec<TypeInfo> = registry
            .get(&root)
            .map(|registration| registration.dependencies().to_vec())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if !closure.insert(current) {
                continue;
            }
            if let Some(registration) = registry.get(&current) {
                stack.extend(registration.dependencies().iter().copied());
            }
        }
        closure
    }
}
