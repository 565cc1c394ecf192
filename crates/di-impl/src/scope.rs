//! 作用域管理
//!
//! 按组件生命周期创建和缓存实例：单例缓存在上下文级别，作用域实例缓存在当前作用域帧，
//! 瞬时实例每次都重新构造。

use di_abstractions::{ComponentInstance, ComponentRegistration};
use di_common::{DiError, DiResult, Lifetime, Scope, TypeInfo};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

type SharedConstruction = Shared<BoxFuture<'static, DiResult<ComponentInstance>>>;

enum Slot {
    Ready(ComponentInstance),
    Pending(SharedConstruction),
}

#[derive(Default)]
struct CacheInner {
    slots: HashMap<TypeInfo, Slot>,
    created: Vec<ComponentInstance>,
    /// 关闭时仍在构造中的任务，完成后由第一个等待者负责清理
    orphaned: Vec<SharedConstruction>,
    closed: bool,
}

/// 实例缓存
///
/// 同一类型的并发请求共享同一次构造。构造在独立任务中运行，
/// 某个等待者被取消时构造仍会完成并服务其他等待者。
struct InstanceCache {
    context: String,
    inner: Mutex<CacheInner>,
}

impl InstanceCache {
    fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    async fn get_or_construct<F>(&self, type_info: TypeInfo, construct: F) -> DiResult<ComponentInstance>
    where
        F: FnOnce() -> BoxFuture<'static, DiResult<ComponentInstance>>,
    {
        let pending = {
            let mut inner = self.inner.lock();
            match inner.slots.get(&type_info) {
                Some(Slot::Ready(instance)) => return Ok(instance.clone()),
                Some(Slot::Pending(pending)) => pending.clone(),
                None => {
                    let pending = self.spawn_construction(type_info, construct());
                    inner.slots.insert(type_info, Slot::Pending(pending.clone()));
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let owns_late_instance = {
            let mut inner = self.inner.lock();
            let is_current = matches!(
                inner.slots.get(&type_info),
                Some(Slot::Pending(current)) if current.ptr_eq(&pending)
            );
            if is_current {
                match &result {
                    Ok(instance) => {
                        inner.slots.insert(type_info, Slot::Ready(instance.clone()));
                        inner.created.push(instance.clone());
                    }
                    Err(_) => {
                        // 失败的构造不缓存，下一次解析重新构造
                        inner.slots.remove(&type_info);
                    }
                }
                return result;
            }
            if !inner.closed || result.is_err() {
                return result;
            }
            let position = inner.orphaned.iter().position(|orphan| orphan.ptr_eq(&pending));
            position.map(|i| inner.orphaned.swap_remove(i)).is_some()
        };

        // 缓存已关闭：实例不再交给调用方，只清理一次
        if let (true, Ok(instance)) = (owns_late_instance, &result) {
            warn!("作用域已退出，清理迟到的实例: {} (上下文: {})", type_info, self.context);
            if let Err(e) = instance.hooks().cleanup().await {
                warn!("迟到实例清理失败: {} (上下文: {}): {}", type_info, self.context, e);
            }
        }
        Err(DiError::ScopeNotActive {
            target: type_info.short_name(),
            context: self.context.clone(),
        })
    }

    fn spawn_construction(
        &self,
        type_info: TypeInfo,
        construction: BoxFuture<'static, DiResult<ComponentInstance>>,
    ) -> SharedConstruction {
        let context = self.context.clone();
        let handle = tokio::spawn(construction);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(DiError::ComponentCreationFailed {
                    type_name: type_info.short_name(),
                    context,
                    reason: format!("构造任务异常终止: {e}"),
                }),
            }
        }
        .boxed()
        .shared()
    }

    fn instances(&self) -> Vec<ComponentInstance> {
        self.inner.lock().created.clone()
    }

    fn discard(&self, type_info: &TypeInfo) -> Option<ComponentInstance> {
        let mut inner = self.inner.lock();
        inner.slots.remove(type_info);
        let position = inner
            .created
            .iter()
            .position(|instance| instance.type_info() == *type_info)?;
        Some(inner.created.remove(position))
    }

    fn take_all(&self) -> Vec<ComponentInstance> {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        std::mem::take(&mut inner.created)
    }

    /// 关闭缓存并取出已创建的实例，之后完成的构造不再入缓存
    fn close(&self) -> Vec<ComponentInstance> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let slots = std::mem::take(&mut inner.slots);
        inner.orphaned.extend(slots.into_values().filter_map(|slot| match slot {
            Slot::Pending(pending) => Some(pending),
            Slot::Ready(_) => None,
        }));
        std::mem::take(&mut inner.created)
    }

    fn len(&self) -> usize {
        self.inner.lock().created.len()
    }
}

struct ScopeFrame {
    scope: Scope,
    cache: InstanceCache,
}

/// 作用域管理器
pub struct ScopeManager {
    context: String,
    singletons: InstanceCache,
    frames: Mutex<Vec<Arc<ScopeFrame>>>,
}

impl ScopeManager {
    /// 创建新的作用域管理器
    pub fn new(context: impl Into<String>) -> Self {
        let context = context.into();
        Self {
            singletons: InstanceCache::new(&context),
            frames: Mutex::new(Vec::new()),
            context,
        }
    }

    /// 按生命周期创建或获取实例
    pub async fn create_instance<F>(
        &self,
        registration: &ComponentRegistration,
        construct: F,
    ) -> DiResult<ComponentInstance>
    where
        F: FnOnce() -> BoxFuture<'static, DiResult<ComponentInstance>>,
    {
        let type_info = registration.type_info();
        match registration.lifetime() {
            Lifetime::Singleton => self.singletons.get_or_construct(type_info, construct).await,
            Lifetime::Transient => construct().await,
            Lifetime::Scoped => {
                let frame = self.current_frame().ok_or_else(|| DiError::ScopeNotActive {
                    target: type_info.short_name(),
                    context: self.context.clone(),
                })?;
                frame.cache.get_or_construct(type_info, construct).await
            }
        }
    }

    /// 进入新的作用域帧
    pub fn enter_scope(&self, name: impl Into<String>) -> Scope {
        let scope = Scope::new(name);
        let mut frames = self.frames.lock();
        debug!("进入作用域: {} (上下文: {}, 深度: {})", scope.name, self.context, frames.len() + 1);
        frames.push(Arc::new(ScopeFrame {
            cache: InstanceCache::new(&self.context),
            scope: scope.clone(),
        }));
        scope
    }

    /// 退出最内层作用域帧
    ///
    /// 名称必须与最内层帧一致。帧内创建的实例按创建顺序的逆序清理，
    /// 清理失败会被汇总，但每个实例都会得到清理机会。
    pub async fn exit_scope(&self, name: &str) -> DiResult<()> {
        let frame = {
            let mut frames = self.frames.lock();
            let is_innermost = frames.last().is_some_and(|frame| frame.scope.name == name);
            if is_innermost {
                frames.pop()
            } else {
                None
            }
        };

        let frame = frame.ok_or_else(|| DiError::ScopeNotActive {
            target: name.to_string(),
            context: self.context.clone(),
        })?;

        self.cleanup_frame(&frame).await
    }

    /// 退出所有作用域帧（从内到外）
    pub async fn exit_all(&self) -> DiResult<()> {
        let frames: Vec<Arc<ScopeFrame>> = std::mem::take(&mut *self.frames.lock());
        let mut failures = Vec::new();

        for frame in frames.iter().rev() {
            if let Err(e) = self.cleanup_frame(frame).await {
                match e {
                    DiError::CleanupAggregate { failures: inner, .. } => failures.extend(inner),
                    other => failures.push(other.to_string()),
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::CleanupAggregate {
                context: self.context.clone(),
                failures,
            })
        }
    }

    async fn cleanup_frame(&self, frame: &ScopeFrame) -> DiResult<()> {
        let instances = frame.cache.close();
        info!(
            "退出作用域: {} (上下文: {}, 实例: {})",
            frame.scope.name,
            self.context,
            instances.len()
        );

        let mut failures = Vec::new();
        for instance in instances.iter().rev() {
            if let Err(e) = instance.hooks().cleanup().await {
                warn!(
                    "作用域实例清理失败: {} (作用域: {}, 上下文: {}): {}",
                    instance.type_info(),
                    frame.scope.name,
                    self.context,
                    e
                );
                failures.push(format!("{}: {}", instance.type_info(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::CleanupAggregate {
                context: self.context.clone(),
                failures,
            })
        }
    }

    fn current_frame(&self) -> Option<Arc<ScopeFrame>> {
        self.frames.lock().last().cloned()
    }

    /// 当前活跃的作用域
    pub fn active_scope(&self) -> Option<Scope> {
        self.current_frame().map(|frame| frame.scope.clone())
    }

    /// 是否存在活跃作用域
    pub fn has_active_scope(&self) -> bool {
        !self.frames.lock().is_empty()
    }

    /// 作用域深度
    pub fn scope_depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// 已创建的单例（按创建完成顺序）
    pub fn singleton_instances(&self) -> Vec<ComponentInstance> {
        self.singletons.instances()
    }

    /// 活跃单例数量
    pub fn singleton_count(&self) -> usize {
        self.singletons.len()
    }

    /// 丢弃单例缓存
    pub fn discard_singleton(&self, type_info: &TypeInfo) -> Option<ComponentInstance> {
        self.singletons.discard(type_info)
    }

    /// 清空单例缓存
    pub fn clear_singletons(&self) -> Vec<ComponentInstance> {
        self.singletons.take_all()
    }

    /// 当前作用域帧内的实例数量
    pub fn scoped_instance_count(&self) -> usize {
        self.current_frame().map_or(0, |frame| frame.cache.len())
    }
}

impl std::fmt::Debug for ScopeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeManager")
            .field("context", &self.context)
            .field("singletons", &self.singleton_count())
            .field("scope_depth", &self.scope_depth())
            .finish()
    }
}
