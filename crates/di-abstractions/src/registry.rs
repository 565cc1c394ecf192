//! 组件注册抽象
//!
//! 组件以显式数据注册：描述符声明作用域和有序依赖，工厂负责用解析好的依赖构造实例。

use crate::container::ContainerConfig;
use di_common::{
    BoxError, Component, ComponentDescriptor, DiError, DiResult, Lifetime, TypeInfo,
};
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 已构造的组件实例
///
/// 同一个 `Arc` 的两种视图：类型擦除的值（用于向下转型）和生命周期钩子。
/// 值以 `Arc<T>` 的形式擦除，因此按接口绑定的实例可以直接转型为 `Arc<dyn I>`。
#[derive(Clone)]
pub struct ComponentInstance {
    type_info: TypeInfo,
    id: uuid::Uuid,
    value: Arc<dyn Any + Send + Sync>,
    hooks: Arc<dyn Component>,
}

impl ComponentInstance {
    /// 包装组件实例
    pub fn new<T: Component>(value: Arc<T>) -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            id: uuid::Uuid::new_v4(),
            value: Arc::new(value.clone()),
            hooks: value as Arc<dyn Component>,
        }
    }

    /// 以接口类型包装组件实例，钩子仍来自具体实现
    pub fn bound<T, I>(value: Arc<T>, cast: impl FnOnce(Arc<T>) -> Arc<I>) -> Self
    where
        T: Component,
        I: ?Sized + Send + Sync + 'static,
    {
        Self {
            type_info: TypeInfo::of::<I>(),
            id: uuid::Uuid::new_v4(),
            value: Arc::new(cast(value.clone())),
            hooks: value as Arc<dyn Component>,
        }
    }

    /// 组件类型
    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    /// 实例ID
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// 生命周期钩子视图
    pub fn hooks(&self) -> &Arc<dyn Component> {
        &self.hooks
    }

    /// 向下转型为注册时的类型（具体类型或绑定的接口）
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// 是否为同一个实例
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("type_info", &self.type_info)
            .field("id", &self.id)
            .finish()
    }
}

/// 按声明顺序解析好的构造依赖
///
/// 未满足的可选导入在对应位置为 `None`，组件需要在使用前自行检查。
#[derive(Debug, Clone)]
pub struct ResolvedDependencies {
    owner: TypeInfo,
    context: String,
    slots: Vec<(TypeInfo, Option<ComponentInstance>)>,
}

impl ResolvedDependencies {
    /// 创建依赖集合
    pub fn new(
        owner: TypeInfo,
        context: impl Into<String>,
        slots: Vec<(TypeInfo, Option<ComponentInstance>)>,
    ) -> Self {
        Self {
            owner,
            context: context.into(),
            slots,
        }
    }

    /// 获取必需依赖
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let wanted = TypeInfo::of::<T>();
        let (_, slot) = self
            .slots
            .iter()
            .find(|(type_info, _)| *type_info == wanted)
            .ok_or_else(|| DiError::ComponentCreationFailed {
                type_name: self.owner.short_name(),
                context: self.context.clone(),
                reason: format!("未声明依赖 {wanted}"),
            })?;

        slot.as_ref()
            .and_then(ComponentInstance::downcast::<T>)
            .ok_or_else(|| DiError::not_found(wanted.short_name(), self.context.as_str()))
    }

    /// 获取可选依赖（未满足的可选导入返回 `None`）
    pub fn get_optional<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let wanted = TypeInfo::of::<T>();
        self.slots
            .iter()
            .find(|(type_info, _)| *type_info == wanted)
            .and_then(|(_, slot)| slot.as_ref())
            .and_then(ComponentInstance::downcast::<T>)
    }

    /// 按位置获取依赖
    pub fn get_at(&self, index: usize) -> Option<&ComponentInstance> {
        self.slots.get(index).and_then(|(_, slot)| slot.as_ref())
    }

    /// 依赖类型（按声明顺序）
    pub fn types(&self) -> Vec<TypeInfo> {
        self.slots.iter().map(|(type_info, _)| *type_info).collect()
    }

    /// 依赖数量
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 是否没有依赖
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 所属上下文
    pub fn context(&self) -> &str {
        &self.context
    }
}

/// 组件工厂函数类型
pub type ComponentFactoryFn = Arc<
    dyn Fn(ResolvedDependencies) -> BoxFuture<'static, Result<ComponentInstance, BoxError>>
        + Send
        + Sync,
>;

/// 提供者启用条件
pub type ProviderCondition = Arc<dyn Fn(&ContainerConfig) -> bool + Send + Sync>;

/// 组件注册信息
#[derive(Clone)]
pub struct ComponentRegistration {
    /// 组件描述符
    pub descriptor: ComponentDescriptor,
    /// 组件工厂
    pub factory: ComponentFactoryFn,
    /// 启用条件，`None` 表示总是启用
    pub condition: Option<ProviderCondition>,
}

impl fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("descriptor", &self.descriptor)
            .field("factory", &"<function>")
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

impl ComponentRegistration {
    /// 创建注册构建器
    pub fn builder<T: Component>() -> RegistrationBuilder<T> {
        RegistrationBuilder::new()
    }

    /// 组件类型
    pub fn type_info(&self) -> TypeInfo {
        self.descriptor.type_info
    }

    /// 组件生命周期
    pub fn lifetime(&self) -> Lifetime {
        self.descriptor.lifetime
    }

    /// 构造依赖
    pub fn dependencies(&self) -> &[TypeInfo] {
        &self.descriptor.dependencies
    }

    /// 在给定配置下是否启用
    ///
    /// 未启用的提供者在构建和校验时都会被跳过，它的导出也随之失效。
    pub fn is_active(&self, config: &ContainerConfig) -> bool {
        self.condition.as_ref().map_or(true, |condition| condition(config))
    }

    /// 调用工厂
    pub fn construct(
        &self,
        dependencies: ResolvedDependencies,
    ) -> BoxFuture<'static, Result<ComponentInstance, BoxError>> {
        (self.factory)(dependencies)
    }
}

type InstanceWrapper<T> = Arc<dyn Fn(Arc<T>) -> ComponentInstance + Send + Sync>;

/// 组件注册构建器
pub struct RegistrationBuilder<T> {
    descriptor: ComponentDescriptor,
    wrap: InstanceWrapper<T>,
    condition: Option<ProviderCondition>,
}

impl<T: Component> RegistrationBuilder<T> {
    fn new() -> Self {
        Self {
            descriptor: ComponentDescriptor::of::<T>(Lifetime::default()),
            wrap: Arc::new(ComponentInstance::new::<T>),
            condition: None,
        }
    }

    /// 以接口类型提供组件
    ///
    /// 注册键变为接口类型，解析方通过 `resolve::<dyn I>()` 获取 `Arc<dyn I>`；
    /// 生命周期钩子仍由具体实现提供。
    ///
    /// ```ignore
    /// ComponentRegistration::builder::<SmtpMailer>()
    ///     .provides_as::<dyn Mailer>(|mailer| mailer as Arc<dyn Mailer>)
    ///     .constructor(|_| Ok(SmtpMailer::default()));
    /// ```
    pub fn provides_as<I>(mut self, cast: impl Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.descriptor.type_info = TypeInfo::of::<I>();
        self.descriptor
            .tags
            .insert("implementation".to_string(), TypeInfo::of::<T>().short_name());
        self.wrap = Arc::new(move |value: Arc<T>| ComponentInstance::bound(value, &cast));
        self
    }

    /// 设置启用条件，在构建上下文时按容器配置求值
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ContainerConfig) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// 设置生命周期
    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.descriptor.lifetime = lifetime;
        self
    }

    /// 单例
    pub fn singleton(self) -> Self {
        self.lifetime(Lifetime::Singleton)
    }

    /// 瞬时
    pub fn transient(self) -> Self {
        self.lifetime(Lifetime::Transient)
    }

    /// 作用域
    pub fn scoped(self) -> Self {
        self.lifetime(Lifetime::Scoped)
    }

    /// 声明构造依赖（按调用顺序解析）
    pub fn depends_on<D: ?Sized + 'static>(mut self) -> Self {
        self.descriptor.dependencies.push(TypeInfo::of::<D>());
        self
    }

    /// 添加标签
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.tags.insert(key.into(), value.into());
        self
    }

    /// 设置组件名称
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = Some(name.into());
        self
    }

    /// 使用异步工厂完成注册
    pub fn factory<F, Fut>(self, factory: F) -> ComponentRegistration
    where
        F: Fn(ResolvedDependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let wrap = self.wrap;
        let factory = erase_factory(move |dependencies| {
            let pending = factory(dependencies);
            let wrap = wrap.clone();
            async move {
                let value = pending.await?;
                Ok::<_, BoxError>(wrap(Arc::new(value)))
            }
            .boxed()
        });

        ComponentRegistration {
            descriptor: self.descriptor,
            factory,
            condition: self.condition,
        }
    }

    /// 使用同步构造函数完成注册
    pub fn constructor<F>(self, constructor: F) -> ComponentRegistration
    where
        F: Fn(ResolvedDependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let wrap = self.wrap;
        let factory = erase_factory(move |dependencies| {
            let result = constructor(dependencies).map(|value| wrap(Arc::new(value)));
            futures::future::ready(result).boxed()
        });

        ComponentRegistration {
            descriptor: self.descriptor,
            factory,
            condition: self.condition,
        }
    }

    /// 注册预先构造的单例实例
    pub fn instance(mut self, value: Arc<T>) -> ComponentRegistration {
        self.descriptor.lifetime = Lifetime::Singleton;
        let wrap = self.wrap;
        let factory = erase_factory(move |_| {
            futures::future::ready(Ok::<_, BoxError>(wrap(value.clone()))).boxed()
        });

        ComponentRegistration {
            descriptor: self.descriptor,
            factory,
            condition: self.condition,
        }
    }
}

fn erase_factory<F>(factory: F) -> ComponentFactoryFn
where
    F: Fn(ResolvedDependencies) -> BoxFuture<'static, Result<ComponentInstance, BoxError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(factory)
}

/// 依赖图节点
#[derive(Debug, Clone)]
pub struct DependencyGraphNode {
    /// 组件类型
    pub type_info: TypeInfo,
    /// 依赖的类型列表
    pub dependencies: Vec<TypeInfo>,
}

/// 循环依赖检测器
pub trait CircularDependencyDetector: Send + Sync {
    /// 检测循环依赖，返回完整的循环链（首尾为同一组件）
    fn detect_circular_dependencies(&self, graph: &[DependencyGraphNode]) -> Result<(), Vec<String>>;

    /// 构建依赖图
    fn build_dependency_graph(&self, registrations: &[Arc<ComponentRegistration>]) -> Vec<DependencyGraphNode>;
}

/// 默认循环依赖检测器
///
/// 只考虑图内节点之间的边，指向图外（例如导入类型）的依赖被忽略。
#[derive(Debug, Default)]
pub struct DefaultCircularDependencyDetector;

impl CircularDependencyDetector for DefaultCircularDependencyDetector {
    fn detect_circular_dependencies(&self, graph: &[DependencyGraphNode]) -> Result<(), Vec<String>> {
        // 使用深度优先搜索检测循环依赖
        let nodes: HashMap<TypeInfo, &DependencyGraphNode> =
            graph.iter().map(|node| (node.type_info, node)).collect();
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        for node in graph {
            if !visited.contains(&node.type_info) {
                Self::dfs_check(node.type_info, &nodes, &mut visited, &mut path)?;
            }
        }

        Ok(())
    }

    fn build_dependency_graph(&self, registrations: &[Arc<ComponentRegistration>]) -> Vec<DependencyGraphNode> {
        registrations
            .iter()
            .map(|reg| DependencyGraphNode {
                type_info: reg.descriptor.type_info,
                dependencies: reg.descriptor.dependencies.clone(),
            })
            .collect()
    }
}

impl DefaultCircularDependencyDetector {
    fn dfs_check(
        current: TypeInfo,
        nodes: &HashMap<TypeInfo, &DependencyGraphNode>,
        visited: &mut HashSet<TypeInfo>,
        path: &mut Vec<TypeInfo>,
    ) -> Result<(), Vec<String>> {
        if let Some(start) = path.iter().position(|t| *t == current) {
            // 检测到循环依赖
            let mut chain: Vec<String> = path[start..]
                .iter()
                .map(|t| t.short_name())
                .collect();
            chain.push(current.short_name());
            return Err(chain);
        }

        if visited.contains(&current) {
            return Ok(());
        }

        let Some(node) = nodes.get(&current) else {
            return Ok(());
        };

        path.push(current);
        for dep in &node.dependencies {
            if nodes.contains_key(dep) {
                Self::dfs_check(*dep, nodes, visited, path)?;
            }
        }
        path.pop();
        visited.insert(current);

        Ok(())
    }
}
