//! 模块注册表
//!
//! 进程级的上下文声明注册表，由调用方显式创建并按引用传递。

use crate::builder::plan_build_order;
use crate::hooks::EventHookManager;
use di_abstractions::{ContextDescriptor, EventData, EventHook};
use di_common::{type_names, DiError, DiResult, TypeInfo};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct RegistryInner {
    modules: HashMap<String, ContextDescriptor>,
    order: Vec<String>,
}

/// 模块注册表
pub struct ModuleRegistry {
    inner: RwLock<RegistryInner>,
    hooks: Option<Arc<EventHookManager>>,
}

impl ModuleRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            hooks: None,
        }
    }

    /// 创建带事件管理器的注册表
    pub fn with_hooks(hooks: Arc<EventHookManager>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            hooks: Some(hooks),
        }
    }

    /// 注册上下文声明
    pub fn register_module(&self, descriptor: ContextDescriptor) -> DiResult<()> {
        let name = descriptor.name.clone();
        {
            let mut inner = self.inner.write();
            if inner.modules.contains_key(&name) {
                return Err(DiError::invalid_declaration(name, "上下文名称重复"));
            }
            info!("注册模块: {}", descriptor.describe());
            inner.order.push(name.clone());
            inner.modules.insert(name.clone(), descriptor);
        }

        if let Some(hooks) = &self.hooks {
            hooks.emit(&EventData::new(EventHook::ModuleRegistered).with_context(name));
        }
        Ok(())
    }

    /// 移除上下文声明
    pub fn unregister_module(&self, name: &str) -> Option<ContextDescriptor> {
        let mut inner = self.inner.write();
        let removed = inner.modules.remove(name)?;
        inner.order.retain(|existing| existing != name);
        debug!("移除模块: {}", name);
        Some(removed)
    }

    /// 获取上下文声明
    pub fn get_module(&self, name: &str) -> Option<ContextDescriptor> {
        self.inner.read().modules.get(name).cloned()
    }

    /// 所有上下文声明（按注册顺序）
    pub fn all_modules(&self) -> Vec<ContextDescriptor> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.modules.get(name).cloned())
            .collect()
    }

    /// 所有上下文名称（按注册顺序）
    pub fn module_names(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// 是否已注册
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.read().modules.contains_key(name)
    }

    /// 模块数量
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_modules(&self, predicate: impl Fn(&ContextDescriptor) -> bool) -> Vec<String> {
        self.all_modules()
            .into_iter()
            .filter(|descriptor| predicate(descriptor))
            .map(|descriptor| descriptor.name)
            .collect()
    }

    /// 提供指定类型的上下文
    pub fn find_modules_providing(&self, type_info: &TypeInfo) -> Vec<String> {
        self.find_modules(|descriptor| descriptor.is_provider(type_info))
    }

    /// 导出指定类型的上下文
    pub fn find_modules_exporting(&self, type_info: &TypeInfo) -> Vec<String> {
        self.find_modules(|descriptor| descriptor.is_exported(type_info))
    }

    /// 导入指定类型的上下文
    pub fn find_modules_importing(&self, type_info: &TypeInfo) -> Vec<String> {
        self.find_modules(|descriptor| descriptor.is_imported(type_info))
    }

    /// 上下文依赖图（上下文 -> 来源上下文）
    pub fn dependency_graph(&self) -> HashMap<String, Vec<String>> {
        self.all_modules()
            .into_iter()
            .map(|descriptor| {
                let sources = descriptor
                    .source_contexts()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                (descriptor.name, sources)
            })
            .collect()
    }

    /// 指定上下文直接依赖的上下文
    pub fn module_dependencies(&self, name: &str) -> Vec<String> {
        self.get_module(name)
            .map(|descriptor| {
                descriptor
                    .source_contexts()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 直接依赖指定上下文的上下文
    pub fn modules_depending_on(&self, name: &str) -> Vec<String> {
        self.find_modules(|descriptor| descriptor.source_contexts().contains(&name))
    }

    /// 构建顺序
    pub fn build_order(&self) -> DiResult<Vec<String>> {
        let modules = self.all_modules();
        let order = plan_build_order(&modules)?;
        Ok(order.into_iter().map(|i| modules[i].name.clone()).collect())
    }

    /// 检测上下文之间的所有循环依赖，无环时返回空列表
    pub fn detect_circular_dependencies(&self) -> Vec<Vec<String>> {
        let modules = self.all_modules();
        let graph = self.dependency_graph();
        let mut cycles = Vec::new();
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut visited = HashSet::new();

        for descriptor in &modules {
            let mut path = Vec::new();
            Self::collect_cycles(&descriptor.name, &graph, &mut path, &mut visited, &mut seen, &mut cycles);
        }
        cycles
    }

    fn collect_cycles(
        current: &str,
        graph: &HashMap<String, Vec<String>>,
        path: &mut Vec<String>,
        visited: &mut HashSet<String>,
        seen: &mut HashSet<Vec<String>>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        if let Some(position) = path.iter().position(|name| name == current) {
            let mut cycle: Vec<String> = path[position..].to_vec();
            // 同一个环从不同节点进入时只记录一次
            let mut key = cycle.clone();
            key.sort();
            if seen.insert(key) {
                cycle.push(current.to_string());
                cycles.push(cycle);
            }
            return;
        }
        if visited.contains(current) {
            return;
        }

        path.push(current.to_string());
        for source in graph.get(current).into_iter().flatten() {
            if graph.contains_key(source) {
                Self::collect_cycles(source, graph, path, visited, seen, cycles);
            }
        }
        path.pop();
        visited.insert(current.to_string());
    }

    /// 清空注册表
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.modules.clear();
        inner.order.clear();
    }

    /// 注册表摘要（每个上下文一行）
    pub fn describe(&self) -> Vec<String> {
        self.all_modules()
            .iter()
            .map(|descriptor| {
                format!(
                    "{} <- [{}] exports [{}]",
                    descriptor.name,
                    descriptor.source_contexts().join(", "),
                    type_names(&descriptor.exports).join(", ")
                )
            })
            .collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.module_names())
            .finish()
    }
}
