//! # 运行时组合层
//!
//! 这个 crate 是服务编排运行时的组合根，负责把事件总线、生命周期管理器、
//! 服务解析器和事件注册表组装成一个可运行的整体。
//!
//! ## 主要功能
//!
//! - **运行时构建器**: 使用构建者模式组装运行时组件
//! - **配置加载**: 默认值、配置文件与环境变量分层合并
//! - **日志初始化**: 基于 tracing-subscriber 的文本或 JSON 输出
//! - **生命周期管理**: 管理整个运行时的启动、关闭与健康汇总
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use infrastructure_composition::{LoggingConfig, ServiceRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = ServiceRuntime::builder()
//!         .with_logging(LoggingConfig::development())
//!         .enable_event_logging()
//!         .build()?;
//!
//!     // 注册服务后启动
//!     runtime.start().await?;
//!
//!     let health = runtime.overall_health().await;
//!     println!("整体健康状态: {:?}", health);
//!
//!     let report = runtime.stop().await?;
//!     println!("已停止 {} 个服务", report.stopped.len());
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod logging;
pub mod runtime;

// 重新导出主要类型
pub use builder::RuntimeBuilder;
pub use config::{
    LifecycleSettings, LoggingSettings, ResolverSettings, RuntimeConfig, DEFAULT_ENV_PREFIX,
};
pub use logging::{init_logging, LoggingConfig};
pub use runtime::{RuntimeMetrics, RuntimeStatus, ServiceRuntime};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
