//! 组件解析器抽象接口
//!
//! 提供依赖解析和组件实例化的能力

use crate::registry::ComponentInstance;
use async_trait::async_trait;
use di_common::{DiError, DiResult, TypeInfo};
use std::sync::Arc;

/// 组件解析器 trait
///
/// 负责解析组件依赖并创建组件实例
#[async_trait]
pub trait ComponentResolver: Send + Sync {
    /// 解析指定类型的组件实例
    async fn resolve_instance(&self, type_info: TypeInfo) -> DiResult<ComponentInstance>;

    /// 按组件名称或导入别名解析
    async fn resolve_by_name(&self, name: &str) -> DiResult<ComponentInstance>;

    /// 检查是否可以解析指定类型
    fn can_resolve(&self, type_info: &TypeInfo) -> bool;

    /// 解析器所属的上下文名称
    fn resolver_name(&self) -> &str;
}

/// 类型化解析扩展
#[async_trait]
pub trait ResolverExt: ComponentResolver {
    /// 解析指定类型的组件
    async fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let type_info = TypeInfo::of::<T>();
        let instance = self.resolve_instance(type_info).await?;
        instance
            .downcast::<T>()
            .ok_or_else(|| DiError::ComponentCreationFailed {
                type_name: type_info.short_name(),
                context: self.resolver_name().to_string(),
                reason: format!("实例类型与请求类型不符: {}", instance.type_info()),
            })
    }

    /// 检查是否可以解析指定类型
    fn can_resolve_type<T: ?Sized + 'static>(&self) -> bool {
        self.can_resolve(&TypeInfo::of::<T>())
    }
}

impl<R: ComponentResolver + ?Sized> ResolverExt for R {}

/// 解析上下文
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// 当前解析链，用于检测循环依赖
    pub resolution_chain: Vec<TypeInfo>,
    /// 解析选项
    pub options: ResolveOptions,
}

impl ResolveContext {
    /// 创建新的解析上下文
    pub fn new() -> Self {
        Self {
            resolution_chain: Vec::new(),
            options: ResolveOptions::default(),
        }
    }

    /// 使用指定选项创建解析上下文
    pub fn with_options(options: ResolveOptions) -> Self {
        Self {
            resolution_chain: Vec::new(),
            options,
        }
    }

    /// 添加类型到解析链
    ///
    /// 类型已在链上时返回包含该类型的完整循环链。
    pub fn push_type(&mut self, type_info: TypeInfo) -> Result<(), Vec<String>> {
        if self.resolution_chain.contains(&type_info) {
            return Err(self.render_chain_with(type_info));
        }
        self.resolution_chain.push(type_info);
        Ok(())
    }

    /// 从解析链中移除类型
    pub fn pop_type(&mut self) {
        self.resolution_chain.pop();
    }

    /// 当前解析深度
    pub fn depth(&self) -> usize {
        self.resolution_chain.len()
    }

    /// 是否超过最大深度
    pub fn exceeds_max_depth(&self) -> bool {
        self.depth() > self.options.max_depth
    }

    /// 渲染当前解析链
    pub fn render_chain(&self) -> Vec<String> {
        self.resolution_chain
            .iter()
            .map(|t| t.short_name())
            .collect()
    }

    fn render_chain_with(&self, type_info: TypeInfo) -> Vec<String> {
        let mut chain = self.render_chain();
        chain.push(type_info.short_name());
        chain
    }
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析选项
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// 最大递归深度
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}
