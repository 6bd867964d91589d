//! # Infrastructure Common
//!
//! 服务编排运行时的公共类型、服务契约与错误定义。
//!
//! ## 核心组件
//!
//! - [`Service`] - 可被生命周期管理器驱动的服务契约
//! - [`ServiceStatus`] - 服务状态机
//! - [`ServiceMetadata`] / [`ServiceRegistration`] - 注册模型
//! - [`HealthStatus`] - 健康检查结果
//!
//! ## 设计原则
//!
//! - 基于 Rust 类型系统的编译时安全
//! - 异步优先的设计理念
//! - 不提供全局单例，由组合根显式构建并传递

pub mod errors;
pub mod health;
pub mod lifecycle;
pub mod metadata;

pub use errors::*;
pub use health::*;
pub use lifecycle::*;
pub use metadata::*;
