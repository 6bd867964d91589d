//! 服务元数据与注册记录

use crate::lifecycle::{ServiceInstance, ServiceStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// 服务元数据
///
/// 注册时提供，之后不可变。`name` 是逻辑标识，同名服务可以有多个版本的实例。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    /// 服务名称
    pub name: String,
    /// 服务版本
    pub version: String,
    /// 服务描述
    #[serde(default)]
    pub description: Option<String>,
    /// 服务标签
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// 依赖的服务名称列表
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// 启动优先级，数值越小越先启动、越晚停止
    #[serde(default)]
    pub priority: i32,
    /// 健康检查端点
    #[serde(default)]
    pub health_endpoint: Option<String>,
}

impl ServiceMetadata {
    /// 创建新的服务元数据
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            tags: BTreeSet::new(),
            dependencies: Vec::new(),
            priority: 0,
            health_endpoint: None,
        }
    }

    /// 设置描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 添加标签
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// 添加依赖
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// 设置依赖列表
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 设置健康检查端点
    pub fn with_health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = Some(endpoint.into());
        self
    }

    /// 是否带有指定标签
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// 不含自身的依赖列表
    pub fn external_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .map(String::as_str)
            .filter(move |dep| *dep != self.name)
    }
}

static REGISTRATION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// 服务注册记录
///
/// 由生命周期管理器独占维护，对外只提供克隆出的快照。
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    /// 注册 ID，进程内唯一
    pub id: String,
    /// 服务元数据
    pub metadata: ServiceMetadata,
    /// 服务实例
    pub instance: ServiceInstance,
    /// 注册时间
    pub registered_at: chrono::DateTime<chrono::Utc>,
    /// 最近一次健康检查时间
    pub last_health_check: Option<chrono::DateTime<chrono::Utc>>,
    /// 当前状态
    pub status: ServiceStatus,
}

impl ServiceRegistration {
    /// 创建新的注册记录，状态为 `REGISTERED`
    pub fn new(metadata: ServiceMetadata, instance: ServiceInstance) -> Self {
        let registered_at = chrono::Utc::now();
        let sequence = REGISTRATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let id = format!(
            "{}@{}-{}-{}",
            metadata.name,
            metadata.version,
            registered_at.timestamp_millis(),
            sequence
        );

        Self {
            id,
            metadata,
            instance,
            registered_at,
            last_health_check: None,
            status: ServiceStatus::Registered,
        }
    }

    /// 服务名称
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// 服务版本
    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// 是否处于活动状态
    pub fn is_active(&self) -> bool {
        self.status == ServiceStatus::Active
    }
}
