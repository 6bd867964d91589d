//! 事件数据类型与监听器定义

use futures::future::BoxFuture;
use infrastructure_common::BoxError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// 订阅 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    /// 生成新的订阅 ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 事件信封，通配订阅和 `on_any` 监听器收到的数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// 事件名称
    pub event: String,
    /// 事件载荷
    pub data: Value,
    /// 事件时间
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EventEnvelope {
    /// 创建新的事件信封
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// 事件历史记录，写入后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHistoryEntry {
    /// 记录 ID
    pub id: uuid::Uuid,
    /// 事件名称
    pub event: String,
    /// 事件载荷（经过拦截器转换后）
    pub data: Value,
    /// 事件时间
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// 收到事件的监听器数量
    pub listener_count: usize,
    /// 分发耗时
    pub duration: Duration,
}

/// 监听器执行结果
pub type ListenerResult = Result<(), BoxError>;

/// 监听器返回的 future
pub type ListenerFuture = BoxFuture<'static, ListenerResult>;

/// 按事件名订阅的监听器，接收事件载荷
pub type EventListener = Arc<dyn Fn(Value) -> ListenerFuture + Send + Sync>;

/// 通配/全局监听器，接收完整的事件信封
pub type EnvelopeListener = Arc<dyn Fn(EventEnvelope) -> ListenerFuture + Send + Sync>;

/// 等待者的载荷过滤条件
pub type WaitFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// 将异步闭包包装为 [`EventListener`]
pub fn event_listener<F, Fut>(f: F) -> EventListener
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ListenerResult> + Send + 'static,
{
    Arc::new(move |data| -> ListenerFuture { Box::pin(f(data)) })
}

/// 将异步闭包包装为 [`EnvelopeListener`]
pub fn envelope_listener<F, Fut>(f: F) -> EnvelopeListener
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ListenerResult> + Send + 'static,
{
    Arc::new(move |envelope| -> ListenerFuture { Box::pin(f(envelope)) })
}

/// 将同步闭包包装为 [`WaitFilter`]
pub fn wait_filter<F>(f: F) -> WaitFilter
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}
