//! 事件拦截器接口

use infrastructure_common::{BoxError, EventBusError};
use serde_json::Value;

/// 事件拦截器 trait
///
/// 拦截器对同一总线上的所有事件生效，按注册顺序执行。所有钩子都有默认实现，
/// 实现者只需覆盖关心的部分。
pub trait EventInterceptor: Send + Sync {
    /// 拦截器名称，用于移除和日志
    fn name(&self) -> &str;

    /// 分发前调用，返回 `false` 取消本次分发
    fn before_emit(&self, _event: &str, _data: &Value) -> bool {
        true
    }

    /// 转换事件载荷，接收上一个拦截器的输出
    fn transform(&self, _event: &str, data: Value) -> Result<Value, BoxError> {
        Ok(data)
    }

    /// 分发完成后调用
    fn after_emit(&self, _event: &str, _data: &Value, _listener_count: usize) {}

    /// 分发过程出错时调用
    fn on_error(&self, _event: &str, _error: &EventBusError) {}
}
