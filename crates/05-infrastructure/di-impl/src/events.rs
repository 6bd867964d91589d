//! 生命周期事件名称

/// 服务注册完成，载荷 `{ id, name, version }`
pub const SERVICE_REGISTERED: &str = "service:registered";

/// 服务已注销，载荷 `{ id, name }`
pub const SERVICE_UNREGISTERED: &str = "service:unregistered";

/// 服务状态变化，载荷 `{ id, name, oldStatus, newStatus }`
pub const SERVICE_STATUS_CHANGED: &str = "service:status:changed";

/// 单个服务完成一次健康检查，载荷 `{ id, name, healthy, status, durationMs }`
pub const SERVICE_HEALTH_CHECK: &str = "service:health:check";
