//! 服务生命周期管理器
//!
//! 负责服务注册、按依赖顺序启动与停止、状态转换和周期性健康检查，
//! 并通过事件总线广播生命周期事件。

use crate::events::{
    SERVICE_HEALTH_CHECK, SERVICE_REGISTERED, SERVICE_STATUS_CHANGED, SERVICE_UNREGISTERED,
};
use async_trait::async_trait;
use di_abstractions::{DependencyGraph, ServiceRegistry};
use futures::FutureExt;
use infrastructure_common::{
    BoxError, DependencyError, HealthCheckResult, HealthStatus, LifecycleError, LifecycleResult,
    Service, ServiceInstance, ServiceMetadata, ServiceRegistration, ServiceStatus,
};
use messaging_impl::EventBus;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// 生命周期管理器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleManagerOptions {
    /// 周期性健康检查间隔，`None` 表示不启动后台检查
    pub health_check_interval: Option<Duration>,
    /// 单个服务健康检查的超时时间，超时视为不健康
    pub health_check_timeout: Duration,
}

impl Default for LifecycleManagerOptions {
    fn default() -> Self {
        Self {
            health_check_interval: Some(Duration::from_secs(30)),
            health_check_timeout: Duration::from_secs(5),
        }
    }
}

impl LifecycleManagerOptions {
    pub fn with_health_check_interval(mut self, interval: Option<Duration>) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = timeout;
        self
    }
}

/// 停止所有服务的结果汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// 成功停止的服务 ID，按停止顺序
    pub stopped: Vec<String>,
    /// 停止失败的服务 ID 与错误信息
    pub failed: Vec<(String, String)>,
}

impl ShutdownReport {
    /// 是否全部成功
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
struct ManagerState {
    registrations: HashMap<String, ServiceRegistration>,
    /// 按注册顺序排列的 ID
    order: Vec<String>,
    graph: DependencyGraph,
    health_results: HashMap<String, HealthCheckResult>,
}

impl ManagerState {
    fn by_name(&self, name: &str) -> impl Iterator<Item = &ServiceRegistration> + '_ {
        let name = name.to_string();
        self.order
            .iter()
            .filter_map(|id| self.registrations.get(id))
            .filter(move |registration| registration.metadata.name == name)
    }

    fn has_active(&self, name: &str) -> bool {
        self.by_name(name).any(ServiceRegistration::is_active)
    }

    /// 按剩余的注册记录重建依赖图
    fn rebuild_graph(&mut self) {
        let mut graph = DependencyGraph::new();
        for registration in self.order.iter().filter_map(|id| self.registrations.get(id)) {
            let metadata = &registration.metadata;
            graph.add_service(&metadata.name, metadata.priority);
            for dependency in &metadata.dependencies {
                if let Err(e) = graph.add_dependency(&metadata.name, dependency) {
                    error!("重建依赖图失败: {}", e);
                }
            }
        }
        self.graph = graph;
    }
}

struct ManagerInner {
    state: RwLock<ManagerState>,
    event_bus: EventBus,
    options: LifecycleManagerOptions,
    monitor: parking_lot::Mutex<Option<JoinHandle<()>>>,
    health_check_runs: AtomicU64,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.get_mut().take() {
            handle.abort();
        }
    }
}

/// 服务生命周期管理器
///
/// 克隆得到的是同一管理器的句柄。注册记录只由管理器修改，
/// 查询接口返回克隆出的快照。调用服务钩子期间不持有任何锁。
#[derive(Clone)]
pub struct ServiceLifecycleManager {
    inner: Arc<ManagerInner>,
}

impl ServiceLifecycleManager {
    /// 创建新的生命周期管理器
    pub fn new(event_bus: EventBus) -> Self {
        Self::with_options(event_bus, LifecycleManagerOptions::default())
    }

    /// 使用指定配置创建生命周期管理器
    pub fn with_options(event_bus: EventBus, options: LifecycleManagerOptions) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: RwLock::new(ManagerState::default()),
                event_bus,
                options,
                monitor: parking_lot::Mutex::new(None),
                health_check_runs: AtomicU64::new(0),
            }),
        }
    }

    /// 生命周期事件使用的事件总线
    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn options(&self) -> &LifecycleManagerOptions {
        &self.inner.options
    }

    /// 注册服务
    pub async fn register<S>(
        &self,
        service: Arc<S>,
        metadata: ServiceMetadata,
    ) -> LifecycleResult<String>
    where
        S: Service + Send + Sync,
    {
        self.register_instance(ServiceInstance::new(service), metadata)
            .await
    }

    /// 注册服务实例
    ///
    /// 同名同版本已注册时返回 `RegistrationConflict`；声明的依赖引入循环时，
    /// 注册表和依赖图都恢复到调用前的状态并返回完整的环路径。
    pub async fn register_instance(
        &self,
        instance: ServiceInstance,
        metadata: ServiceMetadata,
    ) -> LifecycleResult<String> {
        let registration = ServiceRegistration::new(metadata, instance);
        let id = registration.id.clone();
        let name = registration.metadata.name.clone();
        let version = registration.metadata.version.clone();

        {
            let mut state = self.inner.state.write().await;

            if let Some(existing) = state
                .by_name(&name)
                .find(|existing| existing.metadata.version == version)
            {
                return Err(DependencyError::RegistrationConflict {
                    name,
                    version,
                    existing_id: existing.id.clone(),
                }
                .into());
            }

            let snapshot = state.graph.clone();
            state.graph.add_service(&name, registration.metadata.priority);
            for dependency in &registration.metadata.dependencies {
                if let Err(e) = state.graph.add_dependency(&name, dependency) {
                    state.graph = snapshot;
                    warn!("注册服务失败，已回滚: {}@{}, 原因: {}", name, version, e);
                    return Err(e.into());
                }
            }

            state.order.push(id.clone());
            state.registrations.insert(id.clone(), registration);
        }

        info!("注册服务: {}@{} (id: {})", name, version, id);
        self.announce(
            SERVICE_REGISTERED,
            json!({ "id": id, "name": name, "version": version }),
        )
        .await;

        Ok(id)
    }

    /// 注销服务
    ///
    /// 仍有活动服务依赖它时只输出警告，不阻止注销。
    pub async fn unregister(&self, id: &str) -> LifecycleResult<()> {
        let (registration, active_dependents) = {
            let state = self.inner.state.read().await;
            let registration = state
                .registrations
                .get(id)
                .cloned()
                .ok_or_else(|| DependencyError::not_found(id))?;
            let active_dependents: Vec<String> = state
                .graph
                .get_dependents(registration.name())
                .into_iter()
                .filter(|dependent| state.has_active(dependent))
                .collect();
            (registration, active_dependents)
        };

        if !active_dependents.is_empty() {
            warn!(
                "注销的服务仍被活动服务依赖: {} (id: {}), 依赖方: {:?}",
                registration.name(),
                id,
                active_dependents
            );
        }

        let was_running = registration.status.is_running();
        self.update_service_status(id, ServiceStatus::Stopping).await?;
        if was_running {
            if let Err(e) = guard_hook(registration.instance.service().on_stop()).await {
                warn!("注销时停止服务失败: {} (id: {}), 原因: {}", registration.name(), id, e);
            }
        }

        {
            let mut state = self.inner.state.write().await;
            state.registrations.remove(id);
            state.order.retain(|existing| existing != id);
            state.health_results.remove(id);
            state.rebuild_graph();
        }

        info!("注销服务: {} (id: {})", registration.name(), id);
        self.announce(
            SERVICE_UNREGISTERED,
            json!({
                "id": id,
                "name": registration.name(),
                "activeDependents": active_dependents,
            }),
        )
        .await;

        Ok(())
    }

    /// 按依赖顺序启动所有可启动的服务
    ///
    /// 依赖未处于活动状态的服务被标记为 `ERROR` 并跳过。某个服务启动失败且有其他服务依赖它时，
    /// 立即中止并返回 `InitializationFailed`。全部完成后启动后台健康检查。
    pub async fn initialize_all(&self) -> LifecycleResult<()> {
        let order = {
            let state = self.inner.state.read().await;
            state.graph.get_initialization_order()?
        };
        info!("开始初始化服务，共{}个节点: {:?}", order.len(), order);

        for name in &order {
            let candidates: Vec<ServiceRegistration> = {
                let state = self.inner.state.read().await;
                state
                    .by_name(name)
                    .filter(|registration| registration.status.can_start())
                    .cloned()
                    .collect()
            };

            for registration in candidates {
                self.initialize_service(&registration).await?;
            }
        }

        self.start_health_monitor();
        info!("服务初始化完成");
        Ok(())
    }

    async fn initialize_service(&self, registration: &ServiceRegistration) -> LifecycleResult<()> {
        let id = registration.id.as_str();
        let name = registration.name();

        let unmet = {
            let state = self.inner.state.read().await;
            registration
                .metadata
                .external_dependencies()
                .find(|dependency| !state.has_active(dependency))
                .map(str::to_string)
        };
        if let Some(dependency) = unmet {
            let error = DependencyError::DependencyUnmet {
                service: name.to_string(),
                dependency,
            };
            warn!("{} (id: {})", error, id);
            self.update_service_status(id, ServiceStatus::Error).await?;
            return Ok(());
        }

        self.update_service_status(id, ServiceStatus::Initializing)
            .await?;
        debug!("启动服务: {} (id: {})", name, id);

        match guard_hook(registration.instance.service().on_start()).await {
            Ok(()) => {
                self.update_service_status(id, ServiceStatus::Active).await?;
                info!("服务已启动: {} (id: {})", name, id);
                Ok(())
            }
            Err(source) => {
                error!("服务启动失败: {} (id: {}), 原因: {}", name, id, source);
                self.update_service_status(id, ServiceStatus::Error).await?;

                let dependents = {
                    let state = self.inner.state.read().await;
                    state.graph.get_dependents(name)
                };
                if dependents.is_empty() {
                    return Ok(());
                }

                Err(LifecycleError::InitializationFailed {
                    id: id.to_string(),
                    name: name.to_string(),
                    dependents,
                    source,
                })
            }
        }
    }

    /// 按初始化顺序的逆序停止所有运行中的服务
    ///
    /// 单个服务停止失败会被记录并标记为 `ERROR`，不影响其余服务。
    pub async fn stop_all(&self) -> ShutdownReport {
        self.stop_health_monitor();

        let targets: Vec<ServiceRegistration> = {
            let state = self.inner.state.read().await;
            let names = state.graph.get_shutdown_order().unwrap_or_else(|e| {
                warn!("无法计算停止顺序，按注册顺序逆序停止: {}", e);
                let mut names: Vec<String> = state
                    .order
                    .iter()
                    .filter_map(|id| state.registrations.get(id))
                    .map(|registration| registration.metadata.name.clone())
                    .collect();
                names.dedup();
                names.reverse();
                names
            });

            let mut targets = Vec::new();
            for name in &names {
                let mut instances: Vec<ServiceRegistration> = state
                    .by_name(name)
                    .filter(|registration| registration.status.is_running())
                    .cloned()
                    .collect();
                instances.reverse();
                targets.extend(instances);
            }
            targets
        };

        info!("开始停止服务，共{}个", targets.len());
        let mut report = ShutdownReport::default();
        for registration in targets {
            match self.stop_service(&registration).await {
                Ok(()) => report.stopped.push(registration.id),
                Err(message) => report.failed.push((registration.id, message)),
            }
        }

        if report.is_clean() {
            info!("所有服务已停止");
        } else {
            warn!("部分服务停止失败: {:?}", report.failed);
        }
        report
    }

    async fn stop_service(&self, registration: &ServiceRegistration) -> Result<(), String> {
        let id = registration.id.as_str();
        self.update_service_status(id, ServiceStatus::Stopping)
            .await
            .map_err(|e| e.to_string())?;

        let outcome = guard_hook(registration.instance.service().on_stop()).await;
        let next = if outcome.is_ok() {
            ServiceStatus::Stopped
        } else {
            ServiceStatus::Error
        };
        if let Err(e) = self.update_service_status(id, next).await {
            warn!("更新服务状态失败: {}", e);
        }

        match outcome {
            Ok(()) => {
                debug!("服务已停止: {} (id: {})", registration.name(), id);
                Ok(())
            }
            Err(e) => {
                error!("服务停止失败: {} (id: {}), 原因: {}", registration.name(), id, e);
                Err(e.to_string())
            }
        }
    }

    /// 对所有运行中的服务执行一次健康检查，返回每个服务是否通过
    ///
    /// 通过（含降级）转为 `ACTIVE`，未通过或超时转为 `UNHEALTHY`，检查本身出错转为 `ERROR`。
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let targets: Vec<ServiceRegistration> = {
            let state = self.inner.state.read().await;
            state
                .order
                .iter()
                .filter_map(|id| state.registrations.get(id))
                .filter(|registration| registration.status.is_running())
                .cloned()
                .collect()
        };

        let timeout = self.inner.options.health_check_timeout;
        let mut results = HashMap::with_capacity(targets.len());

        for registration in targets {
            let id = registration.id.clone();
            let started = Instant::now();
            let check = guard_hook(registration.instance.service().check_health());

            let (next, status) = match tokio::time::timeout(timeout, check).await {
                Ok(Ok(status)) if status.is_passing() => (ServiceStatus::Active, status),
                Ok(Ok(status)) => (ServiceStatus::Unhealthy, status),
                Ok(Err(e)) => {
                    error!("健康检查出错: {} (id: {}), 原因: {}", registration.name(), id, e);
                    (ServiceStatus::Error, HealthStatus::unhealthy(e.to_string()))
                }
                Err(_) => {
                    warn!("健康检查超时: {} (id: {}, {:?})", registration.name(), id, timeout);
                    (ServiceStatus::Unhealthy, HealthStatus::unhealthy("健康检查超时"))
                }
            };

            let result =
                HealthCheckResult::new(&id, registration.name(), status, started.elapsed());
            let passing = next == ServiceStatus::Active;
            {
                let mut state = self.inner.state.write().await;
                match state.registrations.get_mut(&id) {
                    Some(current) => current.last_health_check = Some(result.checked_at),
                    None => continue,
                }
                state.health_results.insert(id.clone(), result.clone());
            }

            if let Err(e) = self.update_service_status(&id, next).await {
                debug!("健康检查后未更新状态: {}", e);
            }

            self.announce(
                SERVICE_HEALTH_CHECK,
                json!({
                    "id": id,
                    "name": registration.name(),
                    "healthy": passing,
                    "status": result.status,
                    "durationMs": u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
                }),
            )
            .await;

            results.insert(id, passing);
        }

        self.inner.health_check_runs.fetch_add(1, Ordering::Relaxed);
        results
    }

    /// 最近一次健康检查的结果，按注册顺序
    pub async fn health_results(&self) -> Vec<HealthCheckResult> {
        let state = self.inner.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.health_results.get(id))
            .cloned()
            .collect()
    }

    /// 已完成的健康检查轮数
    pub fn health_check_runs(&self) -> u64 {
        self.inner.health_check_runs.load(Ordering::Relaxed)
    }

    /// 更新服务状态，这是修改状态的唯一入口
    ///
    /// 相同状态为空操作；非法转换返回 `InvalidStatusTransition`；
    /// 每次实际变化都会发布 `service:status:changed` 事件。
    pub async fn update_service_status(
        &self,
        id: &str,
        status: ServiceStatus,
    ) -> LifecycleResult<()> {
        let (name, old) = {
            let mut state = self.inner.state.write().await;
            let registration = state
                .registrations
                .get_mut(id)
                .ok_or_else(|| DependencyError::not_found(id))?;
            let old = registration.status;

            if old == status {
                return Ok(());
            }
            if !old.can_transition_to(status) {
                return Err(LifecycleError::InvalidStatusTransition {
                    id: id.to_string(),
                    from: old,
                    to: status,
                });
            }

            registration.status = status;
            (registration.metadata.name.clone(), old)
        };

        debug!("服务状态变更: {} (id: {}) {} -> {}", name, id, old, status);
        self.announce(
            SERVICE_STATUS_CHANGED,
            json!({
                "id": id,
                "name": name,
                "oldStatus": old.as_str(),
                "newStatus": status.as_str(),
            }),
        )
        .await;

        Ok(())
    }

    /// 当前依赖图的快照
    pub async fn dependency_graph(&self) -> DependencyGraph {
        self.inner.state.read().await.graph.clone()
    }

    /// 已注册的服务数量
    pub async fn service_count(&self) -> usize {
        self.inner.state.read().await.registrations.len()
    }

    /// 后台健康检查是否在运行
    pub fn is_health_monitor_running(&self) -> bool {
        self.inner
            .monitor
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 启动后台健康检查，已在运行时不重复启动
    ///
    /// 检查由单个任务串行执行，上一轮未完成时错过的间隔直接跳过。
    fn start_health_monitor(&self) {
        let interval = match self.inner.options.health_check_interval {
            Some(interval) if !interval.is_zero() => interval,
            _ => return,
        };

        let mut monitor = self.inner.monitor.lock();
        if monitor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let manager: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        *monitor = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = manager.upgrade() else {
                    break;
                };
                let results = ServiceLifecycleManager { inner }.health_check_all().await;
                debug!("周期性健康检查完成，共{}个服务", results.len());
            }
        }));
        info!("后台健康检查已启动，间隔: {:?}", interval);
    }

    fn stop_health_monitor(&self) {
        if let Some(handle) = self.inner.monitor.lock().take() {
            handle.abort();
            info!("后台健康检查已停止");
        }
    }

    async fn announce(&self, event: &str, payload: Value) {
        if let Err(e) = self.inner.event_bus.emit(event, payload).await {
            warn!("发布生命周期事件失败: {}, 原因: {}", event, e);
        }
    }
}

#[async_trait]
impl ServiceRegistry for ServiceLifecycleManager {
    async fn get_service(&self, id: &str) -> Option<ServiceRegistration> {
        self.inner.state.read().await.registrations.get(id).cloned()
    }

    async fn get_service_by_name(&self, name: &str) -> Option<ServiceRegistration> {
        let state = self.inner.state.read().await;
        let found = state
            .by_name(name)
            .find(|registration| registration.is_active())
            .or_else(|| state.by_name(name).next())
            .cloned();
        found
    }

    async fn get_services_by_name(&self, name: &str) -> Vec<ServiceRegistration> {
        let state = self.inner.state.read().await;
        let found = state.by_name(name).cloned().collect();
        found
    }

    async fn get_all_services(&self) -> Vec<ServiceRegistration> {
        let state = self.inner.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.registrations.get(id))
            .cloned()
            .collect()
    }

    async fn get_services_by_tag(&self, tag: &str) -> Vec<ServiceRegistration> {
        let state = self.inner.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.registrations.get(id))
            .filter(|registration| registration.metadata.has_tag(tag))
            .cloned()
            .collect()
    }

    async fn get_services_by_status(&self, status: ServiceStatus) -> Vec<ServiceRegistration> {
        let state = self.inner.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.registrations.get(id))
            .filter(|registration| registration.status == status)
            .cloned()
            .collect()
    }
}

/// 执行服务钩子，钩子内的 panic 转换为错误
async fn guard_hook<T, F>(hook: F) -> Result<T, BoxError>
where
    F: Future<Output = Result<T, BoxError>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(panic_message(payload).into()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("服务钩子发生 panic: {}", detail),
        None => "服务钩子发生 panic".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_common::{HealthCheckable, Lifecycle};
    use messaging_abstractions::event_listener;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Health {
        Healthy,
        Degraded,
        Unhealthy,
        Failing,
        Hanging,
        Panicking,
    }

    struct TestService {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_start: bool,
        fail_stop: bool,
        health: Mutex<Health>,
    }

    impl TestService {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log: log.clone(),
                fail_start: false,
                fail_stop: false,
                health: Mutex::new(Health::Healthy),
            }
        }

        fn failing_start(mut self) -> Self {
            self.fail_start = true;
            self
        }

        fn failing_stop(mut self) -> Self {
            self.fail_stop = true;
            self
        }

        fn set_health(&self, health: Health) {
            *self.health.lock() = health;
        }
    }

    #[async_trait]
    impl Lifecycle for TestService {
        async fn on_start(&self) -> Result<(), BoxError> {
            self.log.lock().push(format!("start:{}", self.name));
            if self.fail_start {
                return Err(format!("{} start failed", self.name).into());
            }
            Ok(())
        }

        async fn on_stop(&self) -> Result<(), BoxError> {
            self.log.lock().push(format!("stop:{}", self.name));
            if self.fail_stop {
                return Err(format!("{} stop failed", self.name).into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl HealthCheckable for TestService {
        async fn check_health(&self) -> Result<HealthStatus, BoxError> {
            let health = *self.health.lock();
            match health {
                Health::Healthy => Ok(HealthStatus::healthy()),
                Health::Degraded => Ok(HealthStatus::degraded("slow")),
                Health::Unhealthy => Ok(HealthStatus::unhealthy("down")),
                Health::Failing => Err("check crashed".into()),
                Health::Hanging => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(HealthStatus::healthy())
                }
                Health::Panicking => panic!("{} health check exploded", self.name),
            }
        }
    }

    fn manager() -> ServiceLifecycleManager {
        ServiceLifecycleManager::with_options(
            EventBus::new(),
            LifecycleManagerOptions::default()
                .with_health_check_interval(None)
                .with_health_check_timeout(Duration::from_millis(50)),
        )
    }

    async fn register_platform(
        manager: &ServiceLifecycleManager,
        log: &Arc<Mutex<Vec<String>>>,
        db: TestService,
    ) -> (String, String, String) {
        let users = manager
            .register(
                Arc::new(TestService::new("users", log)),
                ServiceMetadata::new("users", "1.0.0")
                    .with_dependencies(["db", "cache"])
                    .with_priority(30),
            )
            .await
            .unwrap();
        let db = manager
            .register(Arc::new(db), ServiceMetadata::new("db", "1.0.0").with_priority(10))
            .await
            .unwrap();
        let cache = manager
            .register(
                Arc::new(TestService::new("cache", log)),
                ServiceMetadata::new("cache", "1.0.0").with_priority(20),
            )
            .await
            .unwrap();
        (db, cache, users)
    }

    async fn status_of(manager: &ServiceLifecycleManager, id: &str) -> ServiceStatus {
        manager.get_service(id).await.unwrap().status
    }

    #[tokio::test]
    async fn test_register_conflict_and_queries() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = manager
            .register(
                Arc::new(TestService::new("cache", &log)),
                ServiceMetadata::new("cache", "1.0.0").with_tag("storage"),
            )
            .await
            .unwrap();

        let conflict = manager
            .register(
                Arc::new(TestService::new("cache", &log)),
                ServiceMetadata::new("cache", "1.0.0"),
            )
            .await;
        assert!(matches!(
            conflict,
            Err(LifecycleError::Dependency(DependencyError::RegistrationConflict {
                ref existing_id,
                ..
            })) if *existing_id == first
        ));

        let second = manager
            .register(
                Arc::new(TestService::new("cache", &log)),
                ServiceMetadata::new("cache", "2.0.0"),
            )
            .await
            .unwrap();

        assert_eq!(manager.get_services_by_name("cache").await.len(), 2);
        assert_eq!(manager.get_service_by_name("cache").await.unwrap().id, first);
        assert_eq!(manager.get_services_by_tag("storage").await.len(), 1);
        assert_eq!(
            manager
                .get_services_by_status(ServiceStatus::Registered)
                .await
                .len(),
            2
        );

        manager
            .update_service_status(&second, ServiceStatus::Initializing)
            .await
            .unwrap();
        manager
            .update_service_status(&second, ServiceStatus::Active)
            .await
            .unwrap();
        assert_eq!(manager.get_service_by_name("cache").await.unwrap().id, second);
        assert!(manager.get_service_by_name("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_circular_registration_is_rolled_back() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));

        for (name, dependency) in [("A", "B"), ("B", "C")] {
            manager
                .register(
                    Arc::new(TestService::new(name, &log)),
                    ServiceMetadata::new(name, "1.0.0").with_dependency(dependency),
                )
                .await
                .unwrap();
        }
        let graph_before = manager.dependency_graph().await;

        let result = manager
            .register(
                Arc::new(TestService::new("C", &log)),
                ServiceMetadata::new("C", "1.0.0").with_dependency("A"),
            )
            .await;

        match result {
            Err(LifecycleError::Dependency(DependencyError::CircularDependency { path })) => {
                assert_eq!(path, vec!["A", "B", "C", "A"]);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        let names: Vec<String> = manager
            .get_all_services()
            .await
            .into_iter()
            .map(|registration| registration.metadata.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(manager.dependency_graph().await, graph_before);
        assert!(manager.get_service_by_name("C").await.is_none());
    }

    #[tokio::test]
    async fn test_initialize_all_in_dependency_order() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (db, cache, users) =
            register_platform(&manager, &log, TestService::new("db", &log)).await;

        manager.initialize_all().await.unwrap();

        assert_eq!(*log.lock(), vec!["start:db", "start:cache", "start:users"]);
        for id in [&db, &cache, &users] {
            assert_eq!(status_of(&manager, id).await, ServiceStatus::Active);
        }
    }

    #[tokio::test]
    async fn test_initialize_all_aborts_when_dependency_fails() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (db, cache, users) = register_platform(
            &manager,
            &log,
            TestService::new("db", &log).failing_start(),
        )
        .await;

        let error = manager.initialize_all().await.unwrap_err();

        match error {
            LifecycleError::InitializationFailed { id, dependents, .. } => {
                assert_eq!(id, db);
                assert_eq!(dependents, vec!["users"]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(*log.lock(), vec!["start:db"]);
        assert_eq!(status_of(&manager, &db).await, ServiceStatus::Error);
        assert_eq!(status_of(&manager, &cache).await, ServiceStatus::Registered);
        assert_eq!(status_of(&manager, &users).await, ServiceStatus::Registered);
    }

    #[tokio::test]
    async fn test_unmet_dependency_marks_error_and_continues() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));

        let reports = manager
            .register(
                Arc::new(TestService::new("reports", &log)),
                ServiceMetadata::new("reports", "1.0.0").with_dependency("warehouse"),
            )
            .await
            .unwrap();
        let mailer = manager
            .register(
                Arc::new(TestService::new("mailer", &log)),
                ServiceMetadata::new("mailer", "1.0.0").with_dependency("mailer"),
            )
            .await
            .unwrap();

        manager.initialize_all().await.unwrap();

        assert_eq!(status_of(&manager, &reports).await, ServiceStatus::Error);
        assert_eq!(status_of(&manager, &mailer).await, ServiceStatus::Active);
        assert_eq!(*log.lock(), vec!["start:mailer"]);
    }

    #[tokio::test]
    async fn test_stop_all_is_best_effort_in_reverse_order() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let users_service = TestService::new("users", &log);
        let db = manager
            .register(
                Arc::new(TestService::new("db", &log)),
                ServiceMetadata::new("db", "1.0.0").with_priority(10),
            )
            .await
            .unwrap();
        let cache = manager
            .register(
                Arc::new(TestService::new("cache", &log).failing_stop()),
                ServiceMetadata::new("cache", "1.0.0")
                    .with_dependency("db")
                    .with_priority(20),
            )
            .await
            .unwrap();
        let users = manager
            .register(
                Arc::new(users_service),
                ServiceMetadata::new("users", "1.0.0").with_dependencies(["db", "cache"]),
            )
            .await
            .unwrap();

        manager.initialize_all().await.unwrap();
        log.lock().clear();

        let report = manager.stop_all().await;

        assert_eq!(*log.lock(), vec!["stop:users", "stop:cache", "stop:db"]);
        assert_eq!(report.stopped, vec![users.clone(), db.clone()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, cache);
        assert!(!report.is_clean());
        assert_eq!(status_of(&manager, &users).await, ServiceStatus::Stopped);
        assert_eq!(status_of(&manager, &cache).await, ServiceStatus::Error);
        assert_eq!(status_of(&manager, &db).await, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stopped_services_can_restart() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = manager
            .register(
                Arc::new(TestService::new("worker", &log)),
                ServiceMetadata::new("worker", "1.0.0"),
            )
            .await
            .unwrap();

        manager.initialize_all().await.unwrap();
        manager.stop_all().await;
        assert_eq!(status_of(&manager, &id).await, ServiceStatus::Stopped);

        manager.initialize_all().await.unwrap();
        assert_eq!(status_of(&manager, &id).await, ServiceStatus::Active);
        assert_eq!(
            *log.lock(),
            vec!["start:worker", "stop:worker", "start:worker"]
        );
    }

    #[tokio::test]
    async fn test_health_check_transitions() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let service = Arc::new(TestService::new("api", &log));
        let worker = Arc::new(TestService::new("worker", &log));
        let id = manager
            .register(service.clone(), ServiceMetadata::new("api", "1.0.0"))
            .await
            .unwrap();
        let worker_id = manager
            .register(worker.clone(), ServiceMetadata::new("worker", "1.0.0"))
            .await
            .unwrap();
        manager.initialize_all().await.unwrap();

        let results = manager.health_check_all().await;
        assert_eq!(results.get(&id), Some(&true));
        assert!(manager.get_service(&id).await.unwrap().last_health_check.is_some());

        service.set_health(Health::Unhealthy);
        assert_eq!(manager.health_check_all().await.get(&id), Some(&false));
        assert_eq!(status_of(&manager, &id).await, ServiceStatus::Unhealthy);

        service.set_health(Health::Degraded);
        assert_eq!(manager.health_check_all().await.get(&id), Some(&true));
        assert_eq!(status_of(&manager, &id).await, ServiceStatus::Active);

        service.set_health(Health::Hanging);
        assert_eq!(manager.health_check_all().await.get(&id), Some(&false));
        assert_eq!(status_of(&manager, &id).await, ServiceStatus::Unhealthy);

        worker.set_health(Health::Failing);
        let results = manager.health_check_all().await;
        assert_eq!(results.get(&worker_id), Some(&false));
        assert_eq!(status_of(&manager, &worker_id).await, ServiceStatus::Error);

        let results = manager.health_check_all().await;
        assert!(!results.contains_key(&worker_id));
        assert_eq!(manager.health_check_runs(), 6);
        assert_eq!(manager.health_results().await.len(), 2);
    }

    #[tokio::test]
    async fn test_status_change_events() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));

        let sink = events.clone();
        manager.event_bus().on(
            SERVICE_STATUS_CHANGED,
            event_listener(move |data| {
                let sink = sink.clone();
                async move {
                    sink.lock().push(format!(
                        "{}->{}",
                        data["oldStatus"].as_str().unwrap_or_default(),
                        data["newStatus"].as_str().unwrap_or_default()
                    ));
                    Ok(())
                }
            }),
        );
        let registered = Arc::new(Mutex::new(0));
        let counter = registered.clone();
        manager.event_bus().on(
            SERVICE_REGISTERED,
            event_listener(move |_| {
                let counter = counter.clone();
                async move {
                    *counter.lock() += 1;
                    Ok(())
                }
            }),
        );

        let id = manager
            .register(
                Arc::new(TestService::new("api", &log)),
                ServiceMetadata::new("api", "1.0.0"),
            )
            .await
            .unwrap();
        manager.initialize_all().await.unwrap();
        manager
            .update_service_status(&id, ServiceStatus::Active)
            .await
            .unwrap();

        assert_eq!(*registered.lock(), 1);
        assert_eq!(
            *events.lock(),
            vec!["REGISTERED->INITIALIZING", "INITIALIZING->ACTIVE"]
        );
    }

    #[tokio::test]
    async fn test_invalid_transition_and_unknown_id() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = manager
            .register(
                Arc::new(TestService::new("api", &log)),
                ServiceMetadata::new("api", "1.0.0"),
            )
            .await
            .unwrap();

        assert!(matches!(
            manager.update_service_status(&id, ServiceStatus::Active).await,
            Err(LifecycleError::InvalidStatusTransition {
                from: ServiceStatus::Registered,
                to: ServiceStatus::Active,
                ..
            })
        ));
        assert!(matches!(
            manager.unregister("missing").await,
            Err(LifecycleError::Dependency(DependencyError::ServiceNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unregister_stops_running_service_and_updates_graph() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (db, _cache, users) =
            register_platform(&manager, &log, TestService::new("db", &log)).await;
        manager.initialize_all().await.unwrap();
        log.lock().clear();

        let payloads = Arc::new(Mutex::new(Vec::new()));
        let sink = payloads.clone();
        manager.event_bus().on(
            SERVICE_UNREGISTERED,
            event_listener(move |data| {
                let sink = sink.clone();
                async move {
                    sink.lock().push(data);
                    Ok(())
                }
            }),
        );

        manager.unregister(&db).await.unwrap();

        assert_eq!(*log.lock(), vec!["stop:db"]);
        assert_eq!(payloads.lock()[0]["name"], "db");
        assert_eq!(payloads.lock()[0]["activeDependents"], json!(["users"]));
        assert!(manager.get_service(&db).await.is_none());
        assert_eq!(status_of(&manager, &users).await, ServiceStatus::Active);
        let graph = manager.dependency_graph().await;
        assert_eq!(graph.get_dependencies("users"), vec!["db", "cache"]);

        manager.unregister(&users).await.unwrap();
        let graph = manager.dependency_graph().await;
        assert!(!graph.contains("users"));
        assert!(!graph.contains("db"));
        assert_eq!(manager.service_count().await, 1);
        assert_eq!(payloads.lock()[1]["activeDependents"], json!([]));
    }

    #[tokio::test]
    async fn test_stop_all_stops_unhealthy_service() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let service = Arc::new(TestService::new("search", &log));
        let id = manager
            .register(service.clone(), ServiceMetadata::new("search", "1.0.0"))
            .await
            .unwrap();
        manager.initialize_all().await.unwrap();

        service.set_health(Health::Unhealthy);
        assert_eq!(manager.health_check_all().await.get(&id), Some(&false));
        assert_eq!(status_of(&manager, &id).await, ServiceStatus::Unhealthy);
        log.lock().clear();

        let report = manager.stop_all().await;

        assert!(report.is_clean());
        assert_eq!(report.stopped, vec![id.clone()]);
        assert_eq!(*log.lock(), vec!["stop:search"]);
        assert_eq!(status_of(&manager, &id).await, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_panicking_health_check_marks_error() {
        let manager = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let service = Arc::new(TestService::new("reports", &log));
        let id = manager
            .register(service.clone(), ServiceMetadata::new("reports", "1.0.0"))
            .await
            .unwrap();
        manager.initialize_all().await.unwrap();

        service.set_health(Health::Panicking);
        let results = manager.health_check_all().await;

        assert_eq!(results.get(&id), Some(&false));
        assert_eq!(status_of(&manager, &id).await, ServiceStatus::Error);
        let recorded = manager.health_results().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].service_id, id);
        assert!(recorded[0].status.is_unhealthy());
    }

    #[tokio::test]
    async fn test_health_monitor_survives_panicking_check() {
        let manager = ServiceLifecycleManager::with_options(
            EventBus::new(),
            LifecycleManagerOptions::default()
                .with_health_check_interval(Some(Duration::from_millis(20))),
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let service = Arc::new(TestService::new("reports", &log));
        manager
            .register(service.clone(), ServiceMetadata::new("reports", "1.0.0"))
            .await
            .unwrap();
        manager
            .register(
                Arc::new(TestService::new("api", &log)),
                ServiceMetadata::new("api", "1.0.0"),
            )
            .await
            .unwrap();
        service.set_health(Health::Panicking);

        manager.initialize_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(manager.is_health_monitor_running());
        assert!(manager.health_check_runs() >= 2);
        let api = manager.get_service_by_name("api").await.unwrap();
        assert_eq!(api.status, ServiceStatus::Active);
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_background_health_monitor() {
        let manager = ServiceLifecycleManager::with_options(
            EventBus::new(),
            LifecycleManagerOptions::default()
                .with_health_check_interval(Some(Duration::from_millis(20))),
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        manager
            .register(
                Arc::new(TestService::new("api", &log)),
                ServiceMetadata::new("api", "1.0.0"),
            )
            .await
            .unwrap();

        manager.initialize_all().await.unwrap();
        assert!(manager.is_health_monitor_running());
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(manager.health_check_runs() >= 2);

        manager.stop_all().await;
        assert!(!manager.is_health_monitor_running());
        let runs = manager.health_check_runs();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(manager.health_check_runs(), runs);
    }
}
