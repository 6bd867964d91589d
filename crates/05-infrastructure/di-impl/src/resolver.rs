//! 服务解析器实现

use async_trait::async_trait;
use di_abstractions::{ResolveOptions, ServiceRegistry, ServiceResolver};
use infrastructure_common::{DependencyError, DependencyResult, Service, ServiceRegistration};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// 默认服务解析器
///
/// 只读取注册表，不修改任何状态。
#[derive(Clone)]
pub struct DefaultServiceResolver {
    registry: Arc<dyn ServiceRegistry>,
    options: ResolveOptions,
}

impl DefaultServiceResolver {
    /// 创建新的解析器
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self::with_options(registry, ResolveOptions::default())
    }

    /// 使用指定选项创建解析器
    pub fn with_options(registry: Arc<dyn ServiceRegistry>, options: ResolveOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// 按具体类型解析服务
    pub async fn resolve_as<T>(&self, name: &str) -> DependencyResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let registration = self.active_registration(name).await?;
        registration
            .instance
            .downcast::<T>()
            .ok_or_else(|| DependencyError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// 使用默认超时等待服务
    pub async fn wait_for_default(&self, name: &str) -> DependencyResult<Arc<dyn Service>> {
        self.wait_for(name, self.options.default_timeout).await
    }

    async fn active_registration(&self, name: &str) -> DependencyResult<ServiceRegistration> {
        let registrations = self.registry.get_services_by_name(name).await;
        let first_status = match registrations.first() {
            Some(first) => first.status,
            None => return Err(DependencyError::not_found(name)),
        };

        registrations
            .into_iter()
            .find(ServiceRegistration::is_active)
            .ok_or_else(|| DependencyError::ServiceNotActive {
                name: name.to_string(),
                status: first_status,
            })
    }
}

#[async_trait]
impl ServiceResolver for DefaultServiceResolver {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Service>, DependencyError> {
        let registration = self.active_registration(name).await?;
        Ok(registration.instance.service().clone())
    }

    async fn resolve_all(&self, name: &str) -> Vec<Arc<dyn Service>> {
        self.registry
            .get_services_by_name(name)
            .await
            .into_iter()
            .filter(ServiceRegistration::is_active)
            .map(|registration| registration.instance.service().clone())
            .collect()
    }

    async fn has(&self, name: &str) -> bool {
        !self.registry.get_services_by_name(name).await.is_empty()
    }

    async fn wait_for(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn Service>, DependencyError> {
        let deadline = Instant::now() + timeout;
        debug!("等待服务可用: {} (超时: {:?})", name, timeout);

        loop {
            if let Ok(service) = self.resolve(name).await {
                return Ok(service);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DependencyError::ResolutionTimeout {
                    name: name.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            tokio::time::sleep(self.options.poll_interval.min(deadline - now)).await;
        }
    }
}
