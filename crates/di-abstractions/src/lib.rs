//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义组件注册、依赖解析和多上下文组合的核心契约。
//!
//! ## 核心接口
//!
//! - [`ComponentRegistration`] - 组件描述符与工厂
//! - [`ComponentResolver`] - 依赖解析器接口
//! - [`ContextDescriptor`] - 上下文声明（提供者/导入/导出）
//! - [`CircularDependencyDetector`] - 循环依赖检测
//! - [`EventHook`] - 引擎事件

pub mod container;
pub mod events;
pub mod module;
pub mod registry;
pub mod resolver;

pub use container::*;
pub use events::*;
pub use module::*;
pub use registry::*;
pub use resolver::*;
