//! 作用域事件总线
//!
//! 作用域总线是父总线上的一个视图：所有订阅和发布都映射为父总线上的 `prefix:event`。
//! 作用域内的使用者看不到前缀，父总线上的订阅者通过带前缀的事件名收到同一次发布。

use crate::bus::EventBus;
use infrastructure_common::EventBusResult;
use messaging_abstractions::{
    EnvelopeListener, EventEnvelope, EventHistoryEntry, EventListener, SubscriptionId, WaitFilter,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const SCOPE_SEPARATOR: char = ':';

/// 带前缀的作用域总线
#[derive(Debug, Clone)]
pub struct ScopedEventBus {
    parent: EventBus,
    prefix: String,
}

impl ScopedEventBus {
    pub(crate) fn new(parent: EventBus, prefix: impl Into<String>) -> Self {
        Self {
            parent,
            prefix: prefix.into(),
        }
    }

    /// 作用域前缀
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 父总线
    pub fn parent(&self) -> &EventBus {
        &self.parent
    }

    /// 事件在父总线上的名称
    pub fn scoped_name(&self, event: &str) -> String {
        format!("{}{}{}", self.prefix, SCOPE_SEPARATOR, event)
    }

    fn strip_prefix(&self, listener: EnvelopeListener) -> EnvelopeListener {
        let scope = format!("{}{}", self.prefix, SCOPE_SEPARATOR);
        Arc::new(move |mut envelope: EventEnvelope| {
            if let Some(local) = envelope.event.strip_prefix(scope.as_str()) {
                envelope.event = local.to_string();
            }
            listener(envelope)
        })
    }

    pub fn on(&self, event: &str, listener: EventListener) -> SubscriptionId {
        self.parent.on(self.scoped_name(event), listener)
    }

    pub fn on_with_priority(
        &self,
        event: &str,
        priority: i32,
        listener: EventListener,
    ) -> SubscriptionId {
        self.parent
            .on_with_priority(self.scoped_name(event), priority, listener)
    }

    pub fn once(&self, event: &str, listener: EventListener) -> SubscriptionId {
        self.parent.once(self.scoped_name(event), listener)
    }

    /// 在作用域内按通配模式订阅，信封中的事件名不含前缀
    pub fn on_pattern(
        &self,
        pattern: &str,
        listener: EnvelopeListener,
    ) -> EventBusResult<SubscriptionId> {
        self.parent
            .on_pattern(&self.scoped_name(pattern), self.strip_prefix(listener))
    }

    /// 订阅作用域内的所有事件
    pub fn on_any(&self, listener: EnvelopeListener) -> EventBusResult<SubscriptionId> {
        self.on_pattern("**", listener)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.parent.off(id)
    }

    /// 发布作用域事件，作用域订阅者与父总线上 `prefix:event` 的订阅者各收到一次
    pub async fn emit(&self, event: &str, data: Value) -> EventBusResult<usize> {
        self.parent.emit(&self.scoped_name(event), data).await
    }

    pub fn wait_for(
        &self,
        event: &str,
        timeout: Duration,
        filter: Option<WaitFilter>,
    ) -> impl Future<Output = EventBusResult<Value>> + Send + 'static {
        self.parent.wait_for(self.scoped_name(event), timeout, filter)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.parent.listener_count(&self.scoped_name(event))
    }

    /// 作用域内的事件历史，事件名不含前缀
    pub fn get_history(&self, limit: Option<usize>) -> Vec<EventHistoryEntry> {
        let scope = format!("{}{}", self.prefix, SCOPE_SEPARATOR);
        let entries: Vec<EventHistoryEntry> = self
            .parent
            .get_history(None, None)
            .into_iter()
            .filter_map(|mut entry| {
                let local = entry.event.strip_prefix(scope.as_str())?.to_string();
                entry.event = local;
                Some(entry)
            })
            .collect();
        let skip = limit.map_or(0, |limit| entries.len().saturating_sub(limit));
        entries.into_iter().skip(skip).collect()
    }

    /// 创建嵌套作用域，前缀为 `parent:child`
    pub fn create_scoped(&self, prefix: &str) -> ScopedEventBus {
        ScopedEventBus::new(self.parent.clone(), self.scoped_name(prefix))
    }
}
