//! 服务运行时主入口

use crate::builder::RuntimeBuilder;
use di_abstractions::ServiceRegistry;
use di_impl::{DefaultServiceResolver, ServiceLifecycleManager, ShutdownReport};
use infrastructure_common::{
    aggregate_health, HealthCheckResult, HealthStatus, InfrastructureResult, Service,
    ServiceMetadata, ServiceStatus,
};
use messaging_abstractions::EventRegistry;
use messaging_impl::EventBus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// 服务运行时
///
/// 组合根：持有一条事件总线、一个生命周期管理器、一个解析器和一个事件注册表。
/// 由调用方显式构建并传递，不提供全局实例。
pub struct ServiceRuntime {
    event_bus: EventBus,
    event_registry: Arc<EventRegistry>,
    manager: ServiceLifecycleManager,
    resolver: DefaultServiceResolver,
    /// 运行状态
    status: Arc<RwLock<RuntimeStatus>>,
    /// 统计信息
    metrics: Arc<RwLock<RuntimeMetrics>>,
}

impl ServiceRuntime {
    /// 创建运行时构建器
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn new(
        event_bus: EventBus,
        event_registry: Arc<EventRegistry>,
        manager: ServiceLifecycleManager,
        resolver: DefaultServiceResolver,
    ) -> Self {
        Self {
            event_bus,
            event_registry,
            manager,
            resolver,
            status: Arc::new(RwLock::new(RuntimeStatus::Initialized)),
            metrics: Arc::new(RwLock::new(RuntimeMetrics::default())),
        }
    }

    /// 注册服务
    pub async fn register<S>(
        &self,
        service: Arc<S>,
        metadata: ServiceMetadata,
    ) -> InfrastructureResult<String>
    where
        S: Service + Send + Sync,
    {
        Ok(self.manager.register(service, metadata).await?)
    }

    /// 注销服务
    pub async fn unregister(&self, id: &str) -> InfrastructureResult<()> {
        Ok(self.manager.unregister(id).await?)
    }

    /// 启动运行时，按依赖顺序初始化所有服务
    pub async fn start(&self) -> InfrastructureResult<()> {
        info!("启动服务运行时");
        self.set_status(RuntimeStatus::Starting).await;
        {
            let mut metrics = self.metrics.write().await;
            metrics.start_time = Some(chrono::Utc::now());
            metrics.stop_time = None;
        }

        if let Err(e) = self.manager.initialize_all().await {
            error!("服务初始化失败: {}", e);
            self.set_status(RuntimeStatus::Failed).await;
            return Err(e.into());
        }

        self.set_status(RuntimeStatus::Running).await;
        info!("服务运行时启动完成");
        Ok(())
    }

    /// 停止运行时，按逆序停止所有服务
    pub async fn stop(&self) -> InfrastructureResult<ShutdownReport> {
        info!("停止服务运行时");
        self.set_status(RuntimeStatus::Stopping).await;

        let report = self.manager.stop_all().await;
        if !report.is_clean() {
            warn!("{}个服务停止失败", report.failed.len());
        }

        self.set_status(RuntimeStatus::Stopped).await;
        self.metrics.write().await.stop_time = Some(chrono::Utc::now());

        info!("服务运行时停止完成");
        Ok(report)
    }

    /// 执行一次健康检查并汇总整体健康状态
    ///
    /// 处于 `ERROR` 状态的服务计为不健康。
    pub async fn overall_health(&self) -> HealthStatus {
        let checked = self.manager.health_check_all().await;
        let mut results: Vec<HealthCheckResult> = self
            .manager
            .health_results()
            .await
            .into_iter()
            .filter(|result| checked.contains_key(&result.service_id))
            .collect();

        for registration in self
            .manager
            .get_services_by_status(ServiceStatus::Error)
            .await
        {
            if checked.contains_key(&registration.id) {
                continue;
            }
            results.push(HealthCheckResult::new(
                &registration.id,
                registration.name(),
                HealthStatus::unhealthy("服务处于错误状态"),
                Duration::ZERO,
            ));
        }

        aggregate_health(&results)
    }

    /// 获取运行状态
    pub async fn status(&self) -> RuntimeStatus {
        *self.status.read().await
    }

    /// 获取统计信息
    pub async fn metrics(&self) -> RuntimeMetrics {
        let mut metrics = self.metrics.read().await.clone();
        let services = self.manager.get_all_services().await;
        metrics.registered_services_count = services.len();
        metrics.active_services_count = services
            .iter()
            .filter(|registration| registration.is_active())
            .count();
        metrics.health_check_count = self.manager.health_check_runs();
        metrics.event_history_size = self.event_bus.get_history(None, None).len();
        metrics
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn event_registry(&self) -> &Arc<EventRegistry> {
        &self.event_registry
    }

    pub fn manager(&self) -> &ServiceLifecycleManager {
        &self.manager
    }

    pub fn resolver(&self) -> &DefaultServiceResolver {
        &self.resolver
    }

    async fn set_status(&self, status: RuntimeStatus) {
        *self.status.write().await = status;
    }
}

/// 运行时状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeStatus {
    /// 已初始化
    Initialized,
    /// 启动中
    Starting,
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
    /// 失败
    Failed,
}

/// 运行时统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    /// 启动时间
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 停止时间
    pub stop_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 已注册的服务数量
    pub registered_services_count: usize,
    /// 活动服务数量
    pub active_services_count: usize,
    /// 健康检查执行轮数
    pub health_check_count: u64,
    /// 事件历史记录数量
    pub event_history_size: usize,
}

impl RuntimeMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(chrono::Utc::now() - start),
            _ => None,
        }
    }
}
