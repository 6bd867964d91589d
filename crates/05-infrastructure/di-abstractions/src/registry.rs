//! 服务注册表只读接口

use async_trait::async_trait;
use infrastructure_common::{ServiceRegistration, ServiceStatus};

/// 服务注册表 trait
///
/// 生命周期管理器对外暴露的纯查询接口，所有方法都没有副作用。
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// 按注册 ID 获取服务
    async fn get_service(&self, id: &str) -> Option<ServiceRegistration>;

    /// 按名称获取服务，优先返回活动实例，否则返回最早注册的实例
    async fn get_service_by_name(&self, name: &str) -> Option<ServiceRegistration>;

    /// 按注册顺序获取同名的所有实例
    async fn get_services_by_name(&self, name: &str) -> Vec<ServiceRegistration>;

    /// 按注册顺序获取所有服务
    async fn get_all_services(&self) -> Vec<ServiceRegistration>;

    /// 获取带有指定标签的服务
    async fn get_services_by_tag(&self, tag: &str) -> Vec<ServiceRegistration>;

    /// 获取处于指定状态的服务
    async fn get_services_by_status(&self, status: ServiceStatus) -> Vec<ServiceRegistration>;
}
