//! 容器配置与统计
//!
//! 每个上下文都持有一份 [`ContainerConfig`]，由引擎配置统一下发

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 是否在构建时检测上下文内的循环依赖
    pub enable_circular_dependency_detection: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 顶层解析超时时间（毫秒），`None` 表示不限制
    pub resolution_timeout_ms: Option<u64>,
    /// 初始化前是否预先创建单例
    pub eager_singletons: bool,
    /// 构建完成后是否立即执行初始化
    pub initialize_on_build: bool,
    /// 自定义属性，供提供者的启用条件读取
    pub properties: BTreeMap<String, String>,
}

impl ContainerConfig {
    /// 解析超时时间
    pub fn resolution_timeout(&self) -> Option<Duration> {
        self.resolution_timeout_ms.map(Duration::from_millis)
    }

    /// 设置最大解析深度
    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// 设置解析超时
    pub fn with_resolution_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.resolution_timeout_ms = timeout_ms;
        self
    }

    /// 设置是否预先创建单例
    pub fn with_eager_singletons(mut self, eager: bool) -> Self {
        self.eager_singletons = eager;
        self
    }

    /// 设置自定义属性
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// 读取自定义属性
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// 属性是否为真值（`true`、`1`、`yes`、`on`，不区分大小写）
    pub fn is_enabled(&self, key: &str) -> bool {
        self.property(key).is_some_and(|value| {
            matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
        })
    }

    /// 设置构建后是否立即初始化
    pub fn with_initialize_on_build(mut self, initialize: bool) -> Self {
        self.initialize_on_build = initialize;
        self
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enable_circular_dependency_detection: true,
            max_resolution_depth: 100,
            resolution_timeout_ms: Some(5000),
            eager_singletons: true,
            initialize_on_build: true,
            properties: BTreeMap::new(),
        }
    }
}

/// 上下文统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    /// 本地注册组件数量
    pub registered_components: usize,
    /// 导入绑定数量（含缺失的可选导入）
    pub imported_components: usize,
    /// 导出组件数量
    pub exported_components: usize,
    /// 活跃单例数量
    pub active_singletons: usize,
    /// 当前作用域深度
    pub scope_depth: usize,
    /// 成功解析次数
    pub resolved_components: u64,
    /// 解析失败次数
    pub resolution_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ContainerConfig::default();
        assert!(config.enable_circular_dependency_detection);
        assert_eq!(config.max_resolution_depth, 100);
        assert_eq!(config.resolution_timeout(), Some(Duration::from_millis(5000)));
        assert!(config.eager_singletons);
        assert!(config.initialize_on_build);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ContainerConfig =
            serde_json::from_str(r#"{ "max_resolution_depth": 8, "resolution_timeout_ms": null }"#)
                .unwrap();
        assert_eq!(config.max_resolution_depth, 8);
        assert_eq!(config.resolution_timeout(), None);
        assert!(config.eager_singletons);
        assert!(config.properties.is_empty());
    }

    #[test]
    fn test_property_flags() {
        let config = ContainerConfig::default()
            .with_property("cache.enabled", "Yes")
            .with_property("audit", "off");

        assert!(config.is_enabled("cache.enabled"));
        assert!(!config.is_enabled("audit"));
        assert!(!config.is_enabled("missing"));
        assert_eq!(config.property("audit"), Some("off"));
    }
}
