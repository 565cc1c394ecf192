//! # 引擎组合层
//!
//! 负责把组件注册、上下文声明、配置和日志组合成一个可运行的应用。
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use di_abstractions::{ComponentRegistration, ContextDescriptor};
//! use di_common::{BoxError, Component};
//! use di_composition::ApplicationBuilder;
//!
//! struct Database;
//! impl Component for Database {}
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = ApplicationBuilder::new()
//!         .register(ComponentRegistration::builder::<Database>().constructor(|_| Ok::<_, BoxError>(Database)))?
//!         .add_context(ContextDescriptor::new("infra").provides::<Database>().exports::<Database>())?
//!         .build()
//!         .await?;
//!
//!     let _db = app.resolve::<Database>("infra").await?;
//!     app.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod builder;
pub mod settings;


pub use application::{Application, ApplicationMetrics, ApplicationStatus};
pub use builder::{initialize_logging, ApplicationBuilder, LoggingConfig};
pub use settings::{EngineSettings, LoggingSettings};

pub use di_common::{BootstrapError, BootstrapResult};
