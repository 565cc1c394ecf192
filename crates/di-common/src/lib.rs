//! # DI Common
//!
//! 这个 crate 提供了 Lorn DI 引擎各层共享的基础类型和错误定义。
//!
//! ## 核心组件
//!
//! - [`TypeInfo`] - 组件类型标识
//! - [`Component`] - 组件生命周期钩子 trait
//! - [`ComponentDescriptor`] - 不可变的组件描述符
//! - [`Lifetime`] - 组件作用域（单例/瞬时/作用域）
//! - [`LifecycleState`] - 组件实例生命周期状态机
//! - [`DiError`] - 依赖注入错误分类
//!
//! ## 设计原则
//!
//! - 元数据以显式数据形式注册，不依赖运行时反射
//! - 异步优先的生命周期钩子
//! - 错误信息总是包含具体的类型和上下文名称

pub mod component;
pub mod errors;
pub mod lifecycle;
pub mod metadata;

pub use component::*;
pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
