//! 服务生命周期管理

use crate::errors::BoxError;
use crate::health::HealthStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 服务生命周期状态
///
/// 状态机:
///
/// ```text
/// REGISTERED --init--> INITIALIZING --ok--> ACTIVE
/// INITIALIZING --fail--> ERROR
/// ACTIVE <--restored-- UNHEALTHY <--failed-- ACTIVE
/// ACTIVE --stop--> STOPPING --ok--> STOPPED
/// STOPPING --fail--> ERROR
/// STOPPED --init--> INITIALIZING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    /// 已注册，尚未启动
    Registered,
    /// 初始化中
    Initializing,
    /// 运行中
    Active,
    /// 健康检查未通过
    Unhealthy,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
    /// 错误状态
    Error,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::Registered
    }
}

impl ServiceStatus {
    /// 是否处于运行阶段（需要停止时调用停止钩子）
    pub fn is_running(self) -> bool {
        matches!(self, Self::Active | Self::Unhealthy)
    }

    /// 是否可以（重新）启动
    pub fn can_start(self) -> bool {
        matches!(self, Self::Registered | Self::Stopped)
    }

    /// 检查状态转换是否合法，相同状态视为合法（由调用方按空操作处理）
    pub fn can_transition_to(self, next: ServiceStatus) -> bool {
        use ServiceStatus::*;

        if self == next {
            return true;
        }

        match self {
            Registered => matches!(next, Initializing | Stopping | Error),
            Initializing => matches!(next, Active | Stopping | Error),
            Active => matches!(next, Unhealthy | Stopping | Stopped | Error),
            Unhealthy => matches!(next, Active | Stopping | Stopped | Error),
            Stopping => matches!(next, Stopped | Error),
            Stopped => matches!(next, Initializing | Stopping | Error),
            Error => matches!(next, Stopping),
        }
    }

    /// 状态名称
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::Initializing => "INITIALIZING",
            Self::Active => "ACTIVE",
            Self::Unhealthy => "UNHEALTHY",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务生命周期钩子
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// 服务启动
    async fn on_start(&self) -> Result<(), BoxError>;

    /// 服务停止
    async fn on_stop(&self) -> Result<(), BoxError>;
}

/// 健康检查钩子
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    /// 执行健康检查，返回错误表示检查本身异常
    async fn check_health(&self) -> Result<HealthStatus, BoxError> {
        Ok(HealthStatus::healthy())
    }
}

/// 可被生命周期管理器驱动的服务
///
/// 管理器只依赖这一契约，不依赖具体的服务类型。
pub trait Service: Lifecycle + HealthCheckable + 'static {}

impl<T> Service for T where T: Lifecycle + HealthCheckable + 'static {}

/// 已注册的服务实例
///
/// 同时保存 trait object 与 `Any` 视图，以便按具体类型解析。
#[derive(Clone)]
pub struct ServiceInstance {
    service: Arc<dyn Service>,
    any: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ServiceInstance {
    /// 从具体服务创建实例
    pub fn new<S>(service: Arc<S>) -> Self
    where
        S: Service + Send + Sync,
    {
        Self {
            service: service.clone(),
            any: service,
            type_name: std::any::type_name::<S>(),
        }
    }

    /// 获取服务 trait object
    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    /// 按具体类型获取服务
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.any.clone().downcast::<T>().ok()
    }

    /// 具体类型名称
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("type_name", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopService;

    #[async_trait]
    impl Lifecycle for NoopService {
        async fn on_start(&self) -> Result<(), BoxError> {
            Ok(())
        }

        async fn on_stop(&self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl HealthCheckable for NoopService {}

    #[test]
    fn test_status_transitions() {
        use ServiceStatus::*;

        assert!(Registered.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Active));
        assert!(Active.can_transition_to(Unhealthy));
        assert!(Unhealthy.can_transition_to(Active));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Initializing));
        assert!(Active.can_transition_to(Active));

        assert!(!Registered.can_transition_to(Active));
        assert!(!Stopped.can_transition_to(Active));
        assert!(!Error.can_transition_to(Initializing));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ServiceStatus::Unhealthy).unwrap();
        assert_eq!(json, "\"UNHEALTHY\"");
        assert_eq!(ServiceStatus::Active.to_string(), "ACTIVE");
    }

    #[tokio::test]
    async fn test_service_instance_downcast() {
        let instance = ServiceInstance::new(Arc::new(NoopService));

        assert!(instance.downcast::<NoopService>().is_some());
        assert!(instance.downcast::<String>().is_none());
        assert!(instance.service().on_start().await.is_ok());
        assert!(instance.service().check_health().await.unwrap().is_healthy());
    }
}
