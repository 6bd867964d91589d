//! # Messaging Abstractions
//!
//! 事件总线的抽象层：事件数据类型、监听器与拦截器契约、事件名通配匹配和事件注册表。
//!
//! ## 核心接口
//!
//! - [`EventEnvelope`] / [`EventHistoryEntry`] - 事件数据
//! - [`EventInterceptor`] - 事件拦截器
//! - [`EventPattern`] / [`EventPatternMatcher`] - 事件名通配匹配
//! - [`EventRegistry`] - 事件元数据与载荷结构目录

pub mod events;
pub mod interceptor;
pub mod pattern;
pub mod registry;

pub use events::*;
pub use interceptor::*;
pub use pattern::*;
pub use registry::*;
