//! 事件总线实现

use crate::scoped::ScopedEventBus;
use futures::future::join_all;
use futures::FutureExt;
use infrastructure_common::{EventBusError, EventBusResult};
use messaging_abstractions::{
    EnvelopeListener, EventEnvelope, EventHistoryEntry, EventInterceptor, EventListener,
    EventPattern, ListenerFuture, SubscriptionId, WaitFilter,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// 默认订阅优先级
pub const DEFAULT_PRIORITY: i32 = 0;

/// 事件总线配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusOptions {
    /// 是否启用，禁用时 `emit` 静默返回
    pub enabled: bool,
    /// 是否记录事件历史
    pub history_enabled: bool,
    /// 历史记录上限，超出后淘汰最旧的记录
    pub max_history_size: usize,
}

impl Default for EventBusOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            history_enabled: true,
            max_history_size: 100,
        }
    }
}

impl EventBusOptions {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_history_enabled(mut self, enabled: bool) -> Self {
        self.history_enabled = enabled;
        self
    }

    pub fn with_max_history_size(mut self, size: usize) -> Self {
        self.max_history_size = size;
        self
    }
}

enum SubscriptionTarget {
    Exact(String),
    Pattern(EventPattern),
}

impl SubscriptionTarget {
    fn matches(&self, event: &str) -> bool {
        match self {
            Self::Exact(name) => name == event,
            Self::Pattern(pattern) => pattern.matches(event),
        }
    }
}

enum ListenerKind {
    Data(EventListener),
    Envelope(EnvelopeListener),
}

struct Subscription {
    id: SubscriptionId,
    target: SubscriptionTarget,
    listener: ListenerKind,
    once: bool,
    priority: i32,
}

struct Waiter {
    id: u64,
    event: String,
    filter: Option<WaitFilter>,
    sender: oneshot::Sender<Value>,
}

#[derive(Default)]
struct BusState {
    /// 按优先级升序排列，同优先级保持注册顺序
    subscriptions: Vec<Arc<Subscription>>,
    any_listeners: Vec<(SubscriptionId, EnvelopeListener)>,
    interceptors: Vec<Arc<dyn EventInterceptor>>,
    waiters: Vec<Waiter>,
    history: VecDeque<EventHistoryEntry>,
    next_waiter_id: u64,
}

struct BusInner {
    state: Mutex<BusState>,
    enabled: AtomicBool,
    history_enabled: AtomicBool,
    max_history_size: AtomicUsize,
}

/// 进程内事件总线
///
/// 克隆得到的是同一总线的句柄。任何锁都不会跨越监听器的 await 点持有，
/// 监听器内部可以安全地再次订阅、退订或发布事件。
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("EventBus")
            .field("enabled", &self.is_enabled())
            .field("subscriptions", &state.subscriptions.len())
            .field("any_listeners", &state.any_listeners.len())
            .field("interceptors", &state.interceptors.len())
            .field("waiters", &state.waiters.len())
            .field("history", &state.history.len())
            .finish()
    }
}

impl EventBus {
    /// 使用默认配置创建事件总线
    pub fn new() -> Self {
        Self::with_options(EventBusOptions::default())
    }

    /// 使用指定配置创建事件总线
    pub fn with_options(options: EventBusOptions) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                enabled: AtomicBool::new(options.enabled),
                history_enabled: AtomicBool::new(options.history_enabled),
                max_history_size: AtomicUsize::new(options.max_history_size),
            }),
        }
    }

    /// 订阅事件，使用默认优先级
    pub fn on(&self, event: impl Into<String>, listener: EventListener) -> SubscriptionId {
        self.on_with_priority(event, DEFAULT_PRIORITY, listener)
    }

    /// 订阅事件，优先级数值越小越先执行
    pub fn on_with_priority(
        &self,
        event: impl Into<String>,
        priority: i32,
        listener: EventListener,
    ) -> SubscriptionId {
        self.subscribe(
            SubscriptionTarget::Exact(event.into()),
            ListenerKind::Data(listener),
            false,
            priority,
        )
    }

    /// 一次性订阅，首次触发后自动退订
    pub fn once(&self, event: impl Into<String>, listener: EventListener) -> SubscriptionId {
        self.once_with_priority(event, DEFAULT_PRIORITY, listener)
    }

    /// 带优先级的一次性订阅
    pub fn once_with_priority(
        &self,
        event: impl Into<String>,
        priority: i32,
        listener: EventListener,
    ) -> SubscriptionId {
        self.subscribe(
            SubscriptionTarget::Exact(event.into()),
            ListenerKind::Data(listener),
            true,
            priority,
        )
    }

    /// 按通配模式订阅，监听器收到完整的事件信封
    pub fn on_pattern(
        &self,
        pattern: &str,
        listener: EnvelopeListener,
    ) -> EventBusResult<SubscriptionId> {
        self.on_pattern_with_priority(pattern, DEFAULT_PRIORITY, listener)
    }

    /// 带优先级的通配订阅
    pub fn on_pattern_with_priority(
        &self,
        pattern: &str,
        priority: i32,
        listener: EnvelopeListener,
    ) -> EventBusResult<SubscriptionId> {
        let pattern = EventPattern::new(pattern)?;
        Ok(self.subscribe(
            SubscriptionTarget::Pattern(pattern),
            ListenerKind::Envelope(listener),
            false,
            priority,
        ))
    }

    /// 订阅所有事件，在普通订阅者之后执行
    pub fn on_any(&self, listener: EnvelopeListener) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.inner.state.lock().any_listeners.push((id, listener));
        debug!("添加全局监听器: {}", id);
        id
    }

    fn subscribe(
        &self,
        target: SubscriptionTarget,
        listener: ListenerKind,
        once: bool,
        priority: i32,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        if let SubscriptionTarget::Exact(event) = &target {
            debug!("订阅事件: {} (订阅: {}, 优先级: {}, 一次性: {})", event, id, priority, once);
        }

        let subscription = Arc::new(Subscription {
            id,
            target,
            listener,
            once,
            priority,
        });

        let mut state = self.inner.state.lock();
        let position = state
            .subscriptions
            .partition_point(|existing| existing.priority <= priority);
        state.subscriptions.insert(position, subscription);
        id
    }

    /// 退订，返回订阅是否存在
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.subscriptions.len() + state.any_listeners.len();
        state.subscriptions.retain(|subscription| subscription.id != id);
        state.any_listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = before != state.subscriptions.len() + state.any_listeners.len();
        if removed {
            debug!("退订: {}", id);
        }
        removed
    }

    /// 移除指定事件的全部精确订阅；传入 `None` 时移除所有订阅和全局监听器
    pub fn remove_all_listeners(&self, event: Option<&str>) -> usize {
        let mut state = self.inner.state.lock();
        match event {
            Some(name) => {
                let before = state.subscriptions.len();
                state.subscriptions.retain(|subscription| match &subscription.target {
                    SubscriptionTarget::Exact(existing) => existing != name,
                    _ => true,
                });
                before - state.subscriptions.len()
            }
            None => {
                let removed = state.subscriptions.len() + state.any_listeners.len();
                state.subscriptions.clear();
                state.any_listeners.clear();
                removed
            }
        }
    }

    /// 会收到该事件的订阅数量（精确订阅与匹配的通配订阅，不含全局监听器）
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .state
            .lock()
            .subscriptions
            .iter()
            .filter(|subscription| subscription.target.matches(event))
            .count()
    }

    /// 存在精确订阅的事件名，按字典序排列
    pub fn event_names(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        state
            .subscriptions
            .iter()
            .filter_map(|subscription| match &subscription.target {
                SubscriptionTarget::Exact(name) => Some(name.clone()),
                SubscriptionTarget::Pattern(_) => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 发布事件，返回收到事件的监听器数量
    ///
    /// 总线禁用或被拦截器否决时返回 `Ok(0)`。单个监听器失败只记录日志；
    /// 拦截器转换失败会通知所有拦截器的 `on_error` 并返回错误。
    pub async fn emit(&self, event: &str, data: Value) -> EventBusResult<usize> {
        if !self.is_enabled() {
            return Ok(0);
        }

        let started = Instant::now();
        let interceptors = self.inner.state.lock().interceptors.clone();

        for interceptor in &interceptors {
            if !interceptor.before_emit(event, &data) {
                debug!("事件被拦截器取消: {} (拦截器: {})", event, interceptor.name());
                return Ok(0);
            }
        }

        let mut data = data;
        for interceptor in &interceptors {
            data = match interceptor.transform(event, data) {
                Ok(transformed) => transformed,
                Err(e) => {
                    let error = EventBusError::InterceptorFailed {
                        interceptor: interceptor.name().to_string(),
                        event: event.to_string(),
                        message: e.to_string(),
                    };
                    for observer in &interceptors {
                        observer.on_error(event, &error);
                    }
                    return Err(error);
                }
            };
        }

        // 一次性订阅在同一把锁内从活动列表移除，保证最多投递一次
        let (subscriptions, any_listeners) = {
            let mut state = self.inner.state.lock();
            let matched: Vec<Arc<Subscription>> = state
                .subscriptions
                .iter()
                .filter(|subscription| subscription.target.matches(event))
                .cloned()
                .collect();
            state
                .subscriptions
                .retain(|subscription| !(subscription.once && subscription.target.matches(event)));
            (matched, state.any_listeners.clone())
        };

        let envelope = EventEnvelope::new(event, data.clone());
        let mut deliveries = Vec::with_capacity(subscriptions.len() + any_listeners.len());
        for subscription in &subscriptions {
            let future = match &subscription.listener {
                ListenerKind::Data(listener) => listener(data.clone()),
                ListenerKind::Envelope(listener) => listener(envelope.clone()),
            };
            deliveries.push(Self::deliver(event, subscription.id, future));
        }
        for (id, listener) in &any_listeners {
            deliveries.push(Self::deliver(event, *id, listener(envelope.clone())));
        }

        let listener_count = deliveries.len();
        let failures = join_all(deliveries)
            .await
            .into_iter()
            .filter(|delivered| !delivered)
            .count();
        if failures > 0 {
            warn!("事件 {} 有{}个监听器执行失败", event, failures);
        }

        self.resolve_waiters(event, &data);

        if self.is_history_enabled() {
            self.record_history(EventHistoryEntry {
                id: uuid::Uuid::new_v4(),
                event: event.to_string(),
                data: data.clone(),
                timestamp: envelope.timestamp,
                listener_count,
                duration: started.elapsed(),
            });
        }

        for interceptor in &interceptors {
            interceptor.after_emit(event, &data, listener_count);
        }

        Ok(listener_count)
    }

    async fn deliver(event: &str, id: SubscriptionId, future: ListenerFuture) -> bool {
        let message = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "监听器发生 panic".to_string(),
        };

        let error = EventBusError::ListenerExecution {
            event: event.to_string(),
            subscription_id: id.to_string(),
            message,
        };
        error!("{}", error);
        false
    }

    fn resolve_waiters(&self, event: &str, data: &Value) {
        let candidates: Vec<Waiter> = {
            let mut state = self.inner.state.lock();
            state.waiters.retain(|waiter| !waiter.sender.is_closed());
            let (matching, others): (Vec<Waiter>, Vec<Waiter>) = state
                .waiters
                .drain(..)
                .partition(|waiter| waiter.event == event);
            state.waiters = others;
            matching
        };

        if candidates.is_empty() {
            return;
        }

        // 过滤条件在锁外执行
        let mut pending = Vec::new();
        for waiter in candidates {
            let accepted = waiter.filter.as_ref().map_or(true, |filter| filter(data));
            if accepted {
                if waiter.sender.send(data.clone()).is_ok() {
                    debug!("等待者已完成: {} (等待者: {})", event, waiter.id);
                }
            } else {
                pending.push(waiter);
            }
        }

        if !pending.is_empty() {
            self.inner.state.lock().waiters.extend(pending);
        }
    }

    fn record_history(&self, entry: EventHistoryEntry) {
        let max_size = self.inner.max_history_size.load(Ordering::Relaxed);
        let mut state = self.inner.state.lock();
        state.history.push_back(entry);
        while state.history.len() > max_size {
            state.history.pop_front();
        }
    }

    /// 等待下一次满足条件的事件
    ///
    /// 等待者在调用时立即登记，返回的 future 可以稍后再 await。`timeout` 为零表示不超时。
    /// 超时后等待者被移除，之后到达的事件不会再完成它。
    pub fn wait_for(
        &self,
        event: impl Into<String>,
        timeout: Duration,
        filter: Option<WaitFilter>,
    ) -> impl Future<Output = EventBusResult<Value>> + Send + 'static {
        let event = event.into();
        let (sender, receiver) = oneshot::channel();
        let waiter_id = {
            let mut state = self.inner.state.lock();
            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.waiters.push(Waiter {
                id,
                event: event.clone(),
                filter,
                sender,
            });
            id
        };
        debug!("登记等待者: {} (等待者: {}, 超时: {:?})", event, waiter_id, timeout);

        let bus: Weak<BusInner> = Arc::downgrade(&self.inner);
        async move {
            if timeout.is_zero() {
                return receiver
                    .await
                    .map_err(|_| EventBusError::WaiterCancelled { event });
            }

            match tokio::time::timeout(timeout, receiver).await {
                Ok(Ok(data)) => Ok(data),
                Ok(Err(_)) => Err(EventBusError::WaiterCancelled { event }),
                Err(_) => {
                    if let Some(inner) = bus.upgrade() {
                        inner.state.lock().waiters.retain(|waiter| waiter.id != waiter_id);
                    }
                    Err(EventBusError::WaiterTimeout {
                        event,
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            }
        }
    }

    /// 尚未完成的等待者数量
    pub fn pending_waiters(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.waiters.retain(|waiter| !waiter.sender.is_closed());
        state.waiters.len()
    }

    /// 取消等待者；传入 `None` 时取消全部，被取消的等待者返回 `WaiterCancelled`
    pub fn cancel_waiters(&self, event: Option<&str>) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.waiters.len();
        match event {
            Some(name) => state.waiters.retain(|waiter| waiter.event != name),
            None => state.waiters.clear(),
        }
        before - state.waiters.len()
    }

    /// 添加拦截器，按添加顺序执行
    pub fn add_interceptor(&self, interceptor: Arc<dyn EventInterceptor>) {
        info!("添加事件拦截器: {}", interceptor.name());
        self.inner.state.lock().interceptors.push(interceptor);
    }

    /// 按名称移除拦截器
    pub fn remove_interceptor(&self, name: &str) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.interceptors.len();
        state.interceptors.retain(|interceptor| interceptor.name() != name);
        let removed = before != state.interceptors.len();
        if removed {
            info!("移除事件拦截器: {}", name);
        }
        removed
    }

    /// 查询事件历史，按发布顺序返回最近的记录
    pub fn get_history(&self, event: Option<&str>, limit: Option<usize>) -> Vec<EventHistoryEntry> {
        let state = self.inner.state.lock();
        let matching: Vec<&EventHistoryEntry> = state
            .history
            .iter()
            .filter(|entry| event.map_or(true, |name| entry.event == name))
            .collect();
        let skip = limit.map_or(0, |limit| matching.len().saturating_sub(limit));
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.inner.state.lock().history.clear();
    }

    pub fn set_history_enabled(&self, enabled: bool) {
        self.inner.history_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_history_enabled(&self) -> bool {
        self.inner.history_enabled.load(Ordering::Relaxed)
    }

    /// 调整历史上限，立即淘汰超出的旧记录
    pub fn set_max_history_size(&self, size: usize) {
        self.inner.max_history_size.store(size, Ordering::Relaxed);
        let mut state = self.inner.state.lock();
        while state.history.len() > size {
            state.history.pop_front();
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        info!("事件总线{}", if enabled { "已启用" } else { "已禁用" });
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// 创建带前缀的作用域总线
    pub fn create_scoped(&self, prefix: impl Into<String>) -> ScopedEventBus {
        ScopedEventBus::new(self.clone(), prefix)
    }
}
