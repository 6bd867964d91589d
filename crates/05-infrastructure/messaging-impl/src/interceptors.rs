//! 内置事件拦截器

use infrastructure_common::{EventBusError, SchemaValidationError};
use messaging_abstractions::{EventInterceptor, EventRegistry};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 日志拦截器，记录每一次事件分发
#[derive(Debug, Default)]
pub struct LoggingInterceptor;

impl EventInterceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "LoggingInterceptor"
    }

    fn before_emit(&self, event: &str, data: &Value) -> bool {
        debug!("开始分发事件: event={}, data={}", event, data);
        true
    }

    fn after_emit(&self, event: &str, _data: &Value, listener_count: usize) {
        info!("事件分发完成: event={}, listeners={}", event, listener_count);
    }

    fn on_error(&self, event: &str, error: &EventBusError) {
        error!("事件分发失败: event={}, error={}", event, error);
    }
}

/// 载荷校验拦截器
///
/// 按 [`EventRegistry`] 中登记的结构校验载荷，校验失败的事件被否决。
/// 已弃用的事件照常分发并输出警告。严格模式下未登记的事件同样被否决。
pub struct SchemaValidationInterceptor {
    registry: Arc<EventRegistry>,
    strict: bool,
    rejected: AtomicUsize,
}

impl SchemaValidationInterceptor {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self {
            registry,
            strict: false,
            rejected: AtomicUsize::new(0),
        }
    }

    /// 否决所有未登记的事件
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// 被否决的事件数量
    pub fn rejected_count(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl EventInterceptor for SchemaValidationInterceptor {
    fn name(&self) -> &str {
        "SchemaValidationInterceptor"
    }

    fn before_emit(&self, event: &str, data: &Value) -> bool {
        match self.registry.validate(event, data) {
            Ok(()) => {
                if self.registry.is_deprecated(event) {
                    warn!(
                        "发布已弃用的事件: {} ({})",
                        event,
                        self.registry
                            .deprecation_message(event)
                            .unwrap_or_default()
                    );
                }
                true
            }
            Err(SchemaValidationError::UnknownEvent { .. }) if !self.strict => true,
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("事件载荷校验失败，已取消分发: {}", e);
                false
            }
        }
    }
}
