//! 上下文声明
//!
//! 上下文是相互隔离的注入单元，通过显式的导入/导出契约交换组件。

use di_common::{type_names, TypeInfo};
use serde::Serialize;
use std::collections::HashSet;

/// 导入声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSpec {
    /// 导入的组件类型
    pub type_info: TypeInfo,
    /// 来源上下文名称
    pub source_context: String,
    /// 可选别名
    pub alias: Option<String>,
    /// 是否为必需导入
    pub required: bool,
}

impl ImportSpec {
    /// 创建必需导入
    pub fn required<T: ?Sized + 'static>(source_context: impl Into<String>) -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            source_context: source_context.into(),
            alias: None,
            required: true,
        }
    }

    /// 创建可选导入
    pub fn optional<T: ?Sized + 'static>(source_context: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required::<T>(source_context)
        }
    }

    /// 设置别名
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// 导入键（`来源上下文::类型`）
    pub fn import_key(&self) -> String {
        format!("{}::{}", self.source_context, self.type_info.short_name())
    }
}

/// 上下文声明
#[derive(Debug, Clone, Serialize)]
pub struct ContextDescriptor {
    /// 上下文名称（全局唯一）
    pub name: String,
    /// 本地提供者
    pub providers: Vec<TypeInfo>,
    /// 导入（按声明顺序绑定）
    pub imports: Vec<ImportSpec>,
    /// 导出（必须是提供者的子集）
    pub exports: Vec<TypeInfo>,
}

impl ContextDescriptor {
    /// 创建空的上下文声明
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// 添加本地提供者
    pub fn provides<T: ?Sized + 'static>(self) -> Self {
        self.provides_type(TypeInfo::of::<T>())
    }

    /// 按类型信息添加本地提供者
    pub fn provides_type(mut self, type_info: TypeInfo) -> Self {
        if !self.providers.contains(&type_info) {
            self.providers.push(type_info);
        }
        self
    }

    /// 添加必需导入
    pub fn import<T: ?Sized + 'static>(self, source_context: impl Into<String>) -> Self {
        self.with_import(ImportSpec::required::<T>(source_context))
    }

    /// 添加可选导入
    pub fn import_optional<T: ?Sized + 'static>(self, source_context: impl Into<String>) -> Self {
        self.with_import(ImportSpec::optional::<T>(source_context))
    }

    /// 添加导入声明
    pub fn with_import(mut self, spec: ImportSpec) -> Self {
        self.imports.push(spec);
        self
    }

    /// 添加导出
    pub fn exports<T: ?Sized + 'static>(self) -> Self {
        self.exports_type(TypeInfo::of::<T>())
    }

    /// 按类型信息添加导出
    pub fn exports_type(mut self, type_info: TypeInfo) -> Self {
        if !self.exports.contains(&type_info) {
            self.exports.push(type_info);
        }
        self
    }

    /// 是否提供指定类型
    pub fn is_provider(&self, type_info: &TypeInfo) -> bool {
        self.providers.contains(type_info)
    }

    /// 是否导出指定类型
    pub fn is_exported(&self, type_info: &TypeInfo) -> bool {
        self.exports.contains(type_info)
    }

    /// 是否导入指定类型
    pub fn is_imported(&self, type_info: &TypeInfo) -> bool {
        self.imports.iter().any(|spec| spec.type_info == *type_info)
    }

    /// 必需导入
    pub fn required_imports(&self) -> impl Iterator<Item = &ImportSpec> {
        self.imports.iter().filter(|spec| spec.required)
    }

    /// 可选导入
    pub fn optional_imports(&self) -> impl Iterator<Item = &ImportSpec> {
        self.imports.iter().filter(|spec| !spec.required)
    }

    /// 导入来源上下文（去重，保持声明顺序）
    pub fn source_contexts(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.imports
            .iter()
            .map(|spec| spec.source_context.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// 未被提供的导出类型
    pub fn exports_outside_providers(&self) -> Vec<TypeInfo> {
        self.exports
            .iter()
            .filter(|type_info| !self.is_provider(type_info))
            .copied()
            .collect()
    }

    /// 简短描述
    pub fn describe(&self) -> String {
        format!(
            "{} (providers: [{}], exports: [{}], imports: {})",
            self.name,
            type_names(&self.providers).join(", "),
            type_names(&self.exports).join(", "),
            self.imports.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Infra;
    struct Customer;
    struct Audit;

    #[test]
    fn test_descriptor_builder_keeps_declaration_order() {
        let descriptor = ContextDescriptor::new("customer")
            .provides::<Customer>()
            .provides::<Customer>()
            .import::<Infra>("infra")
            .import_optional::<Audit>("audit")
            .exports::<Customer>();

        assert_eq!(descriptor.providers.len(), 1);
        assert_eq!(descriptor.source_contexts(), vec!["infra", "audit"]);
        assert_eq!(descriptor.required_imports().count(), 1);
        assert_eq!(descriptor.optional_imports().count(), 1);
        assert!(descriptor.is_imported(&TypeInfo::of::<Infra>()));
        assert!(descriptor.exports_outside_providers().is_empty());
    }

    #[test]
    fn test_exports_outside_providers() {
        let descriptor = ContextDescriptor::new("broken").exports::<Infra>();
        assert_eq!(descriptor.exports_outside_providers(), vec![TypeInfo::of::<Infra>()]);
    }

    #[test]
    fn test_import_spec_names() {
        let spec = ImportSpec::required::<Infra>("infra").with_alias("db");
        assert_eq!(spec.alias.as_deref(), Some("db"));
        assert_eq!(spec.import_key(), "infra::Infra");

        let plain = ImportSpec::optional::<Audit>("audit");
        assert_eq!(plain.alias, None);
        assert!(!plain.required);
    }
}
