//! # Messaging Implementation
//!
//! 进程内事件总线的默认实现。
//!
//! ## 主要功能
//!
//! - 按优先级排序的订阅与一次性订阅
//! - 通配订阅与全局监听器
//! - 拦截器链（否决、转换、观察）
//! - 一次性等待者与超时
//! - 有界事件历史
//! - 带前缀的作用域总线

pub mod bus;
pub mod interceptors;
pub mod scoped;

pub use bus::{EventBus, EventBusOptions};
pub use interceptors::{LoggingInterceptor, SchemaValidationInterceptor};
pub use scoped::ScopedEventBus;
