//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义服务依赖图、注册表查询和服务解析的核心接口。
//!
//! ## 核心接口
//!
//! - [`DependencyGraph`] - 服务依赖关系图
//! - [`ServiceRegistry`] - 服务注册表只读接口
//! - [`ServiceResolver`] - 服务解析器接口

pub mod graph;
pub mod registry;
pub mod resolver;

pub use graph::*;
pub use registry::*;
pub use resolver::*;
