//! 服务解析器抽象接口
//!
//! 提供按名称查找活动服务实例的能力

use async_trait::async_trait;
use infrastructure_common::{DependencyError, Service};
use std::sync::Arc;
use std::time::Duration;

/// 服务解析器 trait
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// 解析指定名称的活动服务
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Service>, DependencyError>;

    /// 解析指定名称的所有活动实例
    async fn resolve_all(&self, name: &str) -> Vec<Arc<dyn Service>>;

    /// 检查是否注册了指定名称的服务
    async fn has(&self, name: &str) -> bool;

    /// 轮询等待服务进入活动状态
    async fn wait_for(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn Service>, DependencyError>;
}

/// 解析选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// 等待服务时的轮询间隔
    pub poll_interval: Duration,
    /// 默认等待超时时间
    pub default_timeout: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            default_timeout: Duration::from_secs(5),
        }
    }
}
