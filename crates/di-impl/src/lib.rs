//! # 依赖注入引擎实现
//!
//! 提供多上下文依赖注入引擎：组件元数据存储、作用域实例缓存、带循环检测的依赖解析、
//! 跨上下文导入/导出代理、上下文构建顺序规划以及有序的异步初始化/清理编排。
//!
//! ## 使用流程
//!
//! 1. 组件注册到全局目录 [`MetadataStore`]
//! 2. [`ContextGraphBuilder`] 对上下文声明做拓扑排序
//! 3. 逐个构建 [`Context`]：[`ImportBroker`] 绑定导入，注册本地提供者
//! 4. [`LifecycleOrchestrator`] 按依赖顺序初始化组件

pub mod broker;
pub mod builder;
pub mod context;
pub mod hooks;
pub mod lifecycle;
pub mod registry;
mod resolver;
pub mod scope;
pub mod store;

pub use broker::{ImportBinding, ImportBroker};
pub use builder::ContextGraphBuilder;
pub use context::{Context, ContextState, ContextSummary, ImportSummary};
pub use hooks::{EventHookManager, HookId};
pub use lifecycle::{LifecycleOrchestrator, LifecycleTracker};
pub use registry::ModuleRegistry;
pub use scope::ScopeManager;
pub use store::MetadataStore;
