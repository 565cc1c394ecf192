//! 组件基础接口定义
//!
//! 提供所有可注入组件必须实现的生命周期 trait 以及组件描述符

use crate::lifecycle::Lifetime;
use crate::metadata::TypeInfo;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// 组件钩子返回的错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 组件基础 trait
///
/// 所有可注入组件都必须实现此 trait。两个钩子都有空的默认实现，
/// 编排器保证每个实例的生命周期内每个钩子最多调用一次。
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// 初始化钩子
    async fn initialize(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// 清理钩子
    async fn cleanup(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// 组件描述符
///
/// 注册后不可变。依赖列表的顺序就是构造参数的解析顺序。
#[derive(Debug, Clone, Serialize)]
pub struct ComponentDescriptor {
    /// 组件类型
    pub type_info: TypeInfo,
    /// 组件生命周期
    pub lifetime: Lifetime,
    /// 构造依赖（按声明顺序）
    pub dependencies: Vec<TypeInfo>,
    /// 组件标签
    pub tags: HashMap<String, String>,
    /// 可选的组件名称
    pub name: Option<String>,
}

impl ComponentDescriptor {
    /// 创建新的组件描述符
    pub fn new(type_info: TypeInfo, lifetime: Lifetime) -> Self {
        Self {
            type_info,
            lifetime,
            dependencies: Vec::new(),
            tags: HashMap::new(),
            name: None,
        }
    }

    /// 从类型创建组件描述符
    pub fn of<T: 'static>(lifetime: Lifetime) -> Self {
        Self::new(TypeInfo::of::<T>(), lifetime)
    }

    /// 添加依赖
    pub fn with_dependency(mut self, dependency: TypeInfo) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// 添加标签
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// 设置名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 用于显示的名称：显式名称优先，否则为类型简称
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.type_info.short_name())
    }

    /// 是否直接依赖指定类型
    pub fn depends_on(&self, type_info: &TypeInfo) -> bool {
        self.dependencies.contains(type_info)
    }
}
