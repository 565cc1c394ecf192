//! 引擎配置
//!
//! 配置来源按优先级从低到高：默认值、配置文件（TOML/JSON，按扩展名识别）、环境变量。
//! 环境变量使用 `DI` 前缀和 `__` 分隔符，例如 `DI__CONTAINER__MAX_RESOLUTION_DEPTH=8`。

use crate::builder::LoggingConfig;
use config::{Config, Environment, File};
use di_abstractions::ContainerConfig;
use di_common::{BootstrapError, BootstrapResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "DI";

/// 环境变量层级分隔符
pub const ENV_SEPARATOR: &str = "__";

/// 引擎配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 下发给每个上下文的容器配置
    pub container: ContainerConfig,
    /// 日志配置
    pub logging: LoggingSettings,
}

/// 可序列化的日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 启动时是否初始化日志系统
    pub enabled: bool,
    /// 日志级别（trace/debug/info/warn/error）
    pub level: String,
    /// 是否使用 JSON 格式
    pub json_format: bool,
    /// 是否显示目标
    pub show_target: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
            json_format: false,
            show_target: true,
        }
    }
}

impl LoggingSettings {
    /// 转换为日志初始化配置
    pub fn to_logging_config(&self) -> BootstrapResult<LoggingConfig> {
        let level = self
            .level
            .parse::<tracing::Level>()
            .map_err(|e| BootstrapError::Config {
                message: format!("无效的日志级别 '{}': {}", self.level, e),
            })?;

        Ok(LoggingConfig {
            level,
            show_target: self.show_target,
            json_format: self.json_format,
            ..LoggingConfig::default()
        })
    }
}

impl EngineSettings {
    /// 仅从环境变量加载
    pub fn from_env() -> BootstrapResult<Self> {
        Self::load_with_prefix(None, DEFAULT_ENV_PREFIX)
    }

    /// 从配置文件加载，环境变量覆盖文件中的值
    pub fn load(path: impl AsRef<Path>) -> BootstrapResult<Self> {
        Self::load_with_prefix(Some(path.as_ref()), DEFAULT_ENV_PREFIX)
    }

    /// 使用指定的环境变量前缀加载
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> BootstrapResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(BootstrapError::Config {
                    message: format!("配置文件不存在: {}", path.display()),
                });
            }
            info!("加载配置文件: {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .and_then(|config| config.try_deserialize::<Self>())
            .map_err(|e| BootstrapError::Config {
                message: e.to_string(),
            })?;

        debug!("引擎配置: {:?}", settings);
        Ok(settings)
    }

    /// 渲染为 TOML 文本
    pub fn to_toml(&self) -> BootstrapResult<String> {
        toml::to_string_pretty(self).map_err(|e| BootstrapError::Config {
            message: format!("配置序列化失败: {}", e),
        })
    }
}
