//! 错误类型定义

use crate::lifecycle::ServiceStatus;
use thiserror::Error;

/// 服务钩子、监听器等外部代码返回的错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 依赖与注册相关的错误类型
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("服务已注册: {name}@{version} (id: {existing_id})")]
    RegistrationConflict {
        name: String,
        version: String,
        existing_id: String,
    },

    #[error("检测到循环依赖: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("服务未注册: {key}")]
    ServiceNotFound { key: String },

    #[error("服务未处于活动状态: {name} (当前状态: {status})")]
    ServiceNotActive { name: String, status: ServiceStatus },

    #[error("依赖未满足: {service} 依赖的 {dependency} 未处于活动状态")]
    DependencyUnmet { service: String, dependency: String },

    #[error("等待服务超时: {name} ({timeout_ms}ms)")]
    ResolutionTimeout { name: String, timeout_ms: u64 },

    #[error("服务类型不匹配: {name}, 期望类型: {expected}")]
    TypeMismatch { name: String, expected: String },
}

impl DependencyError {
    /// 创建服务未注册错误
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::ServiceNotFound { key: key.into() }
    }
}

/// 生命周期管理错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("非法的状态转换: {id} {from} -> {to}")]
    InvalidStatusTransition {
        id: String,
        from: ServiceStatus,
        to: ServiceStatus,
    },

    #[error("服务初始化失败: {name} ({id}), 受影响的依赖方: {dependents:?}, 原因: {source}")]
    InitializationFailed {
        id: String,
        name: String,
        dependents: Vec<String>,
        source: BoxError,
    },

    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

/// 事件载荷校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaValidationError {
    #[error("事件未注册: {event}")]
    UnknownEvent { event: String },

    #[error("事件载荷必须是对象: {event}")]
    PayloadNotObject { event: String },

    #[error("必需字段缺失: {event}.{field}")]
    MissingField { event: String, field: String },

    #[error("字段类型错误: {event}.{field}, 期望类型: {expected}, 实际类型: {actual}")]
    InvalidFieldType {
        event: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("不允许的字段: {event}.{field}")]
    UnexpectedField { event: String, field: String },
}

/// 事件总线错误类型
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("监听器执行失败: {event} (订阅: {subscription_id}), 原因: {message}")]
    ListenerExecution {
        event: String,
        subscription_id: String,
        message: String,
    },

    #[error("等待事件超时: {event} ({timeout_ms}ms)")]
    WaiterTimeout { event: String, timeout_ms: u64 },

    #[error("等待事件已取消: {event}")]
    WaiterCancelled { event: String },

    #[error("拦截器执行失败: {interceptor} 处理 {event} 时出错: {message}")]
    InterceptorFailed {
        interceptor: String,
        event: String,
        message: String,
    },

    #[error("事件模式无效: {pattern}, 原因: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("依赖错误: {source}")]
    DependencyError {
        #[from]
        source: DependencyError,
    },

    #[error("生命周期错误: {source}")]
    LifecycleError {
        #[from]
        source: LifecycleError,
    },

    #[error("事件总线错误: {source}")]
    EventBusError {
        #[from]
        source: EventBusError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type EventBusResult<T> = Result<T, EventBusError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;
