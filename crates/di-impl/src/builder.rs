//! 上下文图构建器
//!
//! 按导入关系对上下文声明做稳定拓扑排序，然后逐个构建：
//! 绑定导入、注册本地提供者、登记导出、执行初始化。

use crate::broker::ImportBroker;
use crate::context::Context;
use crate::hooks::EventHookManager;
use crate::store::MetadataStore;
use di_abstractions::{ContainerConfig, ContextDescriptor, EventData, EventHook};
use di_common::{type_names, DiError, DiResult, TypeInfo};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 计算构建顺序（声明下标）
///
/// Kahn 算法，入度相同时按声明顺序出队，结果确定且可复现。
/// 指向不存在上下文的导入不参与排序，由绑定阶段报告。
pub(crate) fn plan_build_order(descriptors: &[ContextDescriptor]) -> DiResult<Vec<usize>> {
    let mut index = HashMap::new();
    for (i, descriptor) in descriptors.iter().enumerate() {
        if index.insert(descriptor.name.as_str(), i).is_some() {
            return Err(DiError::invalid_declaration(
                descriptor.name.as_str(),
                "上下文名称重复",
            ));
        }
    }

    let mut sources: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); descriptors.len()];
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); descriptors.len()];
    for (i, descriptor) in descriptors.iter().enumerate() {
        for spec in &descriptor.imports {
            if let Some(&j) = index.get(spec.source_context.as_str()) {
                sources[i].insert(j);
                dependents[j].insert(i);
            }
        }
    }

    let mut indegree: Vec<usize> = sources.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..descriptors.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(descriptors.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < descriptors.len() {
        let remaining: BTreeSet<usize> = (0..descriptors.len())
            .filter(|&i| indegree[i] > 0)
            .collect();
        return Err(DiError::CircularContextDependency {
            cycle: find_cycle(descriptors, &sources, &remaining),
        });
    }

    Ok(order)
}

/// 在剩余节点中沿导入边找出一个环
fn find_cycle(
    descriptors: &[ContextDescriptor],
    sources: &[BTreeSet<usize>],
    remaining: &BTreeSet<usize>,
) -> Vec<String> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        // 剩余节点一定还有剩余的来源，否则它的入度早已归零
        let Some(&next) = sources[current].iter().find(|j| remaining.contains(j)) else {
            break;
        };
        if let Some(position) = path.iter().position(|&i| i == next) {
            let mut cycle: Vec<String> = path[position..]
                .iter()
                .map(|&i| descriptors[i].name.clone())
                .collect();
            cycle.push(descriptors[next].name.clone());
            return cycle;
        }
        path.push(next);
        current = next;
    }

    path.into_iter().map(|i| descriptors[i].name.clone()).collect()
}

/// 上下文图构建器
pub struct ContextGraphBuilder {
    catalog: Arc<MetadataStore>,
    config: ContainerConfig,
    hooks: Arc<EventHookManager>,
}

impl ContextGraphBuilder {
    /// 基于组件目录创建构建器
    pub fn new(catalog: Arc<MetadataStore>) -> Self {
        Self {
            catalog,
            config: ContainerConfig::default(),
            hooks: EventHookManager::shared(),
        }
    }

    /// 设置容器配置
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置共享的事件管理器
    pub fn with_hooks(mut self, hooks: Arc<EventHookManager>) -> Self {
        self.hooks = hooks;
        self
    }

    /// 事件管理器
    pub fn hooks(&self) -> &Arc<EventHookManager> {
        &self.hooks
    }

    /// 组件目录
    pub fn catalog(&self) -> &Arc<MetadataStore> {
        &self.catalog
    }

    /// 计算构建顺序
    pub fn get_build_order(&self, descriptors: &[ContextDescriptor]) -> DiResult<Vec<String>> {
        let order = plan_build_order(descriptors)?;
        Ok(order.into_iter().map(|i| descriptors[i].name.clone()).collect())
    }

    /// 构建所有上下文
    pub async fn build_contexts(
        &self,
        descriptors: &[ContextDescriptor],
    ) -> DiResult<HashMap<String, Context>> {
        let contexts = self.build_contexts_ordered(descriptors).await?;
        Ok(contexts
            .into_iter()
            .map(|context| (context.name().to_string(), context))
            .collect())
    }

    /// 构建所有上下文，按构建顺序返回
    ///
    /// 遇到第一个错误即停止，已构建的上下文按逆序关闭后返回错误。
    pub async fn build_contexts_ordered(&self, descriptors: &[ContextDescriptor]) -> DiResult<Vec<Context>> {
        let order = plan_build_order(descriptors)?;
        info!(
            "上下文构建顺序: [{}]",
            order
                .iter()
                .map(|&i| descriptors[i].name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut built = HashMap::new();
        let mut ordered = Vec::with_capacity(order.len());

        for i in order {
            let descriptor = &descriptors[i];
            match self.build_context(descriptor, &built).await {
                Ok(context) => {
                    built.insert(descriptor.name.clone(), context.clone());
                    ordered.push(context);
                }
                Err(e) => {
                    error!("上下文构建失败: {}: {}", descriptor.name, e);
                    self.hooks.emit(
                        &EventData::new(EventHook::ErrorOccurred)
                            .with_context(descriptor.name.as_str())
                            .with_detail("error", e.to_string()),
                    );
                    Self::rollback(&ordered).await;
                    return Err(e);
                }
            }
        }

        Ok(ordered)
    }

    async fn rollback(built: &[Context]) {
        for context in built.iter().rev() {
            if let Err(e) = context.shutdown().await {
                warn!("回滚时关闭上下文失败: {}: {}", context.name(), e);
            }
        }
    }

    async fn build_context(
        &self,
        descriptor: &ContextDescriptor,
        built: &HashMap<String, Context>,
    ) -> DiResult<Context> {
        let context = Context::with_config(
            descriptor.name.as_str(),
            self.config.clone(),
            self.hooks.clone(),
        );
        context.emit(EventData::new(EventHook::ContextCreated));

        ImportBroker::new(built, &self.hooks).bind_all(&context, &descriptor.imports)?;

        let mut active = Vec::with_capacity(descriptor.providers.len());
        for provider in &descriptor.providers {
            let registration = self
                .catalog
                .get(provider)
                .ok_or_else(|| DiError::not_found(provider.short_name(), descriptor.name.as_str()))?;
            if !registration.is_active(&self.config) {
                debug!("提供者未启用，跳过: {} (上下文: {})", provider, descriptor.name);
                continue;
            }
            context.register_shared(registration)?;
            active.push(*provider);
        }
        let exports: Vec<TypeInfo> = descriptor
            .exports
            .iter()
            .filter(|export| !descriptor.is_provider(export) || active.contains(export))
            .copied()
            .collect();
        for export in &exports {
            context.add_export(*export)?;
        }
        context.mark_built()?;

        if self.config.initialize_on_build {
            context.initialize().await?;
        }

        context.emit(
            EventData::new(EventHook::ModuleBuilt)
                .with_detail("providers", type_names(&active))
                .with_detail("exports", type_names(&exports)),
        );
        Ok(context)
    }

    /// 校验上下文声明，不创建任何实例
    ///
    /// 执行与构建相同的结构检查，以诊断信息列表的形式返回全部问题。
    pub fn validate_module_dependencies(&self, descriptors: &[ContextDescriptor]) -> Vec<String> {
        let mut diagnostics = Vec::new();
        let mut by_name: HashMap<&str, &ContextDescriptor> = HashMap::new();
        for descriptor in descriptors {
            if by_name.insert(descriptor.name.as_str(), descriptor).is_some() {
                diagnostics.push(
                    DiError::invalid_declaration(descriptor.name.as_str(), "上下文名称重复").to_string(),
                );
            }
        }

        for descriptor in descriptors {
            diagnostics.extend(
                self.check_descriptor(descriptor, &by_name)
                    .into_iter()
                    .map(|e| e.to_string()),
            );
        }

        // 重名已单独报告，环检测只看每个名称的第一个声明
        let mut seen = HashSet::new();
        let unique: Vec<ContextDescriptor> = descriptors
            .iter()
            .filter(|descriptor| seen.insert(descriptor.name.as_str()))
            .cloned()
            .collect();
        if let Err(e @ DiError::CircularContextDependency { .. }) = plan_build_order(&unique) {
            diagnostics.push(e.to_string());
        }

        diagnostics
    }

    /// 来源声明导出了该类型，且提供它的组件在当前配置下启用
    fn exports_active(&self, source: &ContextDescriptor, type_info: &TypeInfo) -> bool {
        source.is_exported(type_info)
            && self
                .catalog
                .get(type_info)
                .map_or(true, |registration| registration.is_active(&self.config))
    }

    fn check_descriptor(
        &self,
        descriptor: &ContextDescriptor,
        by_name: &HashMap<&str, &ContextDescriptor>,
    ) -> Vec<DiError> {
        let name = descriptor.name.as_str();
        let mut errors = Vec::new();

        for export in descriptor.exports_outside_providers() {
            errors.push(DiError::invalid_declaration(
                name,
                format!("导出类型 {export} 不是本地提供者"),
            ));
        }

        let local = MetadataStore::new(name);
        for provider in &descriptor.providers {
            match self.catalog.get(provider) {
                Some(registration) if !registration.is_active(&self.config) => {}
                Some(registration) => {
                    if let Err(e) = local.register_shared(registration) {
                        errors.push(e);
                    }
                }
                None => errors.push(DiError::not_found(provider.short_name(), name)),
            }
        }

        let mut imported: HashSet<TypeInfo> = HashSet::new();
        let mut aliases: HashSet<&str> = HashSet::new();
        for spec in &descriptor.imports {
            let type_name = spec.type_info.short_name();
            if let Some(alias) = spec.alias.as_deref() {
                if !aliases.insert(alias) {
                    errors.push(DiError::import_failed(
                        name,
                        type_name.as_str(),
                        spec.source_context.as_str(),
                        format!("导入别名 {alias} 已被占用"),
                    ));
                }
            }
            if !imported.insert(spec.type_info) {
                errors.push(DiError::import_failed(
                    name,
                    type_name.as_str(),
                    spec.source_context.as_str(),
                    "重复导入同一类型",
                ));
            }
            if descriptor.is_provider(&spec.type_info) {
                errors.push(DiError::import_failed(
                    name,
                    type_name.as_str(),
                    spec.source_context.as_str(),
                    "导入类型不能同时在本地提供",
                ));
            }
            if !spec.required {
                continue;
            }

            let reason = match by_name.get(spec.source_context.as_str()) {
                None => Some("来源上下文不存在或尚未构建"),
                Some(source) if source.name == descriptor.name => Some("上下文不能导入自身"),
                Some(source) if !self.exports_active(source, &spec.type_info) => Some("来源上下文未导出该类型"),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                errors.push(DiError::import_failed(
                    name,
                    type_name,
                    spec.source_context.as_str(),
                    reason,
                ));
            }
        }

        errors.extend(local.validate_graph(&imported, self.config.enable_circular_dependency_detection));
        errors
    }
}

impl std::fmt::Debug for ContextGraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGraphBuilder")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .finish()
    }
}
