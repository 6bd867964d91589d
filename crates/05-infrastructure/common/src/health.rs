//! 健康检查相关接口定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 健康状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "data")]
pub enum HealthStatus {
    /// 健康状态
    Healthy,
    /// 降级状态
    Degraded {
        message: String,
        details: Option<HashMap<String, String>>,
    },
    /// 不健康状态
    Unhealthy {
        error: String,
        details: Option<HashMap<String, String>>,
    },
}

impl HealthStatus {
    /// 创建健康状态
    pub fn healthy() -> Self {
        Self::Healthy
    }

    /// 创建降级状态
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::Degraded {
            message: message.into(),
            details: None,
        }
    }

    /// 创建不健康状态
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self::Unhealthy {
            error: error.into(),
            details: None,
        }
    }

    /// 创建不健康状态（带详情）
    pub fn unhealthy_with_details(
        error: impl Into<String>,
        details: HashMap<String, String>,
    ) -> Self {
        Self::Unhealthy {
            error: error.into(),
            details: Some(details),
        }
    }

    /// 检查是否健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 检查是否降级
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// 检查是否不健康
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy { .. })
    }

    /// 降级仍视为可用
    pub fn is_passing(&self) -> bool {
        !self.is_unhealthy()
    }
}

/// 单个服务的健康检查结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// 服务注册 ID
    pub service_id: String,
    /// 服务名称
    pub service_name: String,
    /// 健康状态
    pub status: HealthStatus,
    /// 检查耗时
    pub duration: Duration,
    /// 检查时间
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl HealthCheckResult {
    /// 创建新的健康检查结果
    pub fn new(
        service_id: impl Into<String>,
        service_name: impl Into<String>,
        status: HealthStatus,
        duration: Duration,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            service_name: service_name.into(),
            status,
            duration,
            checked_at: chrono::Utc::now(),
        }
    }

    /// 检查是否通过
    pub fn is_passing(&self) -> bool {
        self.status.is_passing()
    }
}

/// 汇总多个检查结果得到整体健康状态
pub fn aggregate_health(results: &[HealthCheckResult]) -> HealthStatus {
    let unhealthy: HashMap<String, String> = results
        .iter()
        .filter(|r| r.status.is_unhealthy())
        .map(|r| (r.service_id.clone(), format!("{:?}", r.status)))
        .collect();

    if !unhealthy.is_empty() {
        return HealthStatus::unhealthy_with_details(
            format!("{}个服务不健康", unhealthy.len()),
            unhealthy,
        );
    }

    let degraded_count = results.iter().filter(|r| r.status.is_degraded()).count();
    if degraded_count > 0 {
        HealthStatus::degraded(format!("{}个服务降级", degraded_count))
    } else {
        HealthStatus::healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, status: HealthStatus) -> HealthCheckResult {
        HealthCheckResult::new(id, id, status, Duration::from_millis(1))
    }

    #[test]
    fn test_degraded_is_passing() {
        assert!(HealthStatus::degraded("slow").is_passing());
        assert!(!HealthStatus::unhealthy("down").is_passing());
    }

    #[test]
    fn test_aggregate_health() {
        assert!(aggregate_health(&[]).is_healthy());

        let results = vec![
            result("a", HealthStatus::healthy()),
            result("b", HealthStatus::degraded("slow")),
        ];
        assert!(aggregate_health(&results).is_degraded());

        let results = vec![
            result("a", HealthStatus::unhealthy("down")),
            result("b", HealthStatus::degraded("slow")),
        ];
        match aggregate_health(&results) {
            HealthStatus::Unhealthy { details, .. } => {
                assert!(details.unwrap().contains_key("a"));
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }
}
