//! # 服务生命周期管理实现
//!
//! 提供生命周期管理器和服务解析器的默认实现
//!
//! ## 核心组件
//!
//! - [`ServiceLifecycleManager`] - 注册、依赖顺序启停、状态机与健康检查
//! - [`DefaultServiceResolver`] - 基于注册表的只读解析门面

pub mod events;
pub mod manager;
pub mod resolver;

pub use events::*;
pub use manager::{LifecycleManagerOptions, ServiceLifecycleManager, ShutdownReport};
pub use resolver::DefaultServiceResolver;
