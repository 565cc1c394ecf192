//! 组件元数据存储

use di_abstractions::{
    CircularDependencyDetector, ComponentRegistration, DefaultCircularDependencyDetector,
};
use di_common::{DiError, DiResult, TypeInfo};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct StoreInner {
    by_type: HashMap<TypeInfo, Arc<ComponentRegistration>>,
    order: Vec<TypeInfo>,
}

/// 组件元数据存储
///
/// 既用作全局组件目录，也用作每个上下文的本地注册表。
/// 注册后的描述符不可变，遍历顺序为注册顺序。
pub struct MetadataStore {
    owner: String,
    inner: RwLock<StoreInner>,
}

impl MetadataStore {
    /// 创建新的存储
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// 存储所属者名称（上下文名称或目录名称）
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 注册组件
    pub fn register(&self, registration: ComponentRegistration) -> DiResult<Arc<ComponentRegistration>> {
        let registration = Arc::new(registration);
        self.register_shared(registration.clone())?;
        Ok(registration)
    }

    /// 注册共享的组件描述
    pub fn register_shared(&self, registration: Arc<ComponentRegistration>) -> DiResult<()> {
        let type_info = registration.type_info();
        let mut inner = self.inner.write();
        if inner.by_type.contains_key(&type_info) {
            return Err(DiError::DuplicateRegistration {
                type_name: type_info.short_name(),
                context: self.owner.clone(),
            });
        }

        debug!(
            "注册组件元数据: {} ({}) -> {}",
            type_info,
            registration.lifetime(),
            self.owner
        );
        inner.by_type.insert(type_info, registration);
        inner.order.push(type_info);
        Ok(())
    }

    /// 查找组件，未注册时返回错误
    pub fn lookup(&self, type_info: &TypeInfo) -> DiResult<Arc<ComponentRegistration>> {
        self.get(type_info)
            .ok_or_else(|| DiError::not_found(type_info.short_name(), self.owner.as_str()))
    }

    /// 查找组件
    pub fn get(&self, type_info: &TypeInfo) -> Option<Arc<ComponentRegistration>> {
        self.inner.read().by_type.get(type_info).cloned()
    }

    /// 是否已注册
    pub fn contains(&self, type_info: &TypeInfo) -> bool {
        self.inner.read().by_type.contains_key(type_info)
    }

    /// 按注册顺序列出所有组件
    pub fn list_all(&self) -> Vec<Arc<ComponentRegistration>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|type_info| inner.by_type.get(type_info).cloned())
            .collect()
    }

    /// 按注册顺序列出所有类型
    pub fn registered_types(&self) -> Vec<TypeInfo> {
        self.inner.read().order.clone()
    }

    /// 注册位置
    pub fn position(&self, type_info: &TypeInfo) -> Option<usize> {
        self.inner.read().order.iter().position(|t| t == type_info)
    }

    /// 按组件名称查找
    pub fn find_by_name(&self, name: &str) -> Option<Arc<ComponentRegistration>> {
        self.list_all()
            .into_iter()
            .find(|reg| reg.descriptor.name.as_deref() == Some(name))
    }

    /// 按标签查找，`value` 为 `None` 时只匹配键
    pub fn find_by_tag(&self, key: &str, value: Option<&str>) -> Vec<Arc<ComponentRegistration>> {
        self.list_all()
            .into_iter()
            .filter(|reg| match (reg.descriptor.tags.get(key), value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .collect()
    }

    /// 组件数量
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空存储
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_type.clear();
        inner.order.clear();
    }

    /// 校验组件依赖图
    ///
    /// 每个依赖必须由本存储或 `external`（导入类型）提供；
    /// `detect_cycles` 为真时同时检测存储内的循环依赖。
    pub fn validate_graph(&self, external: &HashSet<TypeInfo>, detect_cycles: bool) -> Vec<DiError> {
        let registrations = self.list_all();
        let mut errors = Vec::new();

        for registration in &registrations {
            for dependency in registration.dependencies() {
                if !self.contains(dependency) && !external.contains(dependency) {
                    errors.push(DiError::ComponentNotFound {
                        type_name: dependency.short_name(),
                        context: self.owner.clone(),
                    });
                }
            }
        }

        if detect_cycles {
            let detector = DefaultCircularDependencyDetector;
            let graph = detector.build_dependency_graph(&registrations);
            if let Err(chain) = detector.detect_circular_dependencies(&graph) {
                errors.push(DiError::CircularDependency {
                    chain,
                    context: self.owner.clone(),
                });
            }
        }

        errors
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("owner", &self.owner)
            .field("components", &self.len())
            .finish()
    }
}
