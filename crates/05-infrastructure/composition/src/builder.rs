//! 运行时构建器

use crate::config::RuntimeConfig;
use crate::logging::{init_logging, LoggingConfig};
use crate::runtime::ServiceRuntime;
use di_abstractions::ResolveOptions;
use di_impl::{DefaultServiceResolver, LifecycleManagerOptions, ServiceLifecycleManager};
use infrastructure_common::InfrastructureError;
use messaging_abstractions::{EventDefinition, EventInterceptor, EventRegistry};
use messaging_impl::{EventBus, EventBusOptions, LoggingInterceptor, SchemaValidationInterceptor};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 运行时构建器
///
/// 使用建造者模式组装事件总线、生命周期管理器和解析器
pub struct RuntimeBuilder {
    /// 运行时配置
    config: RuntimeConfig,
    lifecycle_options: Option<LifecycleManagerOptions>,
    event_bus_options: Option<EventBusOptions>,
    resolve_options: Option<ResolveOptions>,
    /// 是否启用日志初始化
    logging_enabled: bool,
    /// 日志配置
    logging_config: Option<LoggingConfig>,
    interceptors: Vec<Arc<dyn EventInterceptor>>,
    event_definitions: Vec<EventDefinition>,
    /// `Some(strict)` 表示启用载荷校验
    schema_validation: Option<bool>,
    event_logging: bool,
}

impl RuntimeBuilder {
    /// 创建新的运行时构建器
    pub fn new() -> Self {
        Self::from_config(RuntimeConfig::default())
    }

    /// 使用已加载的配置创建构建器
    pub fn from_config(config: RuntimeConfig) -> Self {
        Self {
            config,
            lifecycle_options: None,
            event_bus_options: None,
            resolve_options: None,
            logging_enabled: false, // 默认不初始化日志，避免测试中重复初始化
            logging_config: None,
            interceptors: Vec::new(),
            event_definitions: Vec::new(),
            schema_validation: None,
            event_logging: false,
        }
    }

    /// 从配置文件和环境变量加载配置
    pub fn load_config<P: AsRef<Path>>(
        path: Option<P>,
        env_prefix: &str,
    ) -> Result<Self, InfrastructureError> {
        let path: Option<&Path> = path.as_ref().map(|p| p.as_ref());
        if let Some(path) = path {
            info!("加载运行时配置文件: {}", path.display());
        }
        let config = RuntimeConfig::load(path, env_prefix)?;
        Ok(Self::from_config(config))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// 覆盖生命周期管理选项
    pub fn with_lifecycle_options(mut self, options: LifecycleManagerOptions) -> Self {
        self.lifecycle_options = Some(options);
        self
    }

    /// 覆盖事件总线选项
    pub fn with_event_bus_options(mut self, options: EventBusOptions) -> Self {
        self.event_bus_options = Some(options);
        self
    }

    /// 覆盖解析选项
    pub fn with_resolve_options(mut self, options: ResolveOptions) -> Self {
        self.resolve_options = Some(options);
        self
    }

    /// 配置日志，未指定时使用配置文件中的 `[logging]`
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self.logging_enabled = true;
        self
    }

    /// 按配置文件中的 `[logging]` 初始化日志
    pub fn enable_logging(mut self) -> Self {
        self.logging_enabled = true;
        self
    }

    /// 添加事件拦截器
    pub fn with_interceptor(mut self, interceptor: Arc<dyn EventInterceptor>) -> Self {
        debug!("添加事件拦截器: {}", interceptor.name());
        self.interceptors.push(interceptor);
        self
    }

    /// 登记事件定义
    pub fn with_event_definition(mut self, definition: EventDefinition) -> Self {
        self.event_definitions.push(definition);
        self
    }

    /// 启用载荷校验，`strict` 时未登记的事件也会被否决
    pub fn enable_schema_validation(mut self, strict: bool) -> Self {
        self.schema_validation = Some(strict);
        self
    }

    /// 记录每一次事件分发
    pub fn enable_event_logging(mut self) -> Self {
        self.event_logging = true;
        self
    }

    /// 构建运行时实例
    pub fn build(self) -> Result<ServiceRuntime, InfrastructureError> {
        if self.logging_enabled {
            let logging_config = match self.logging_config {
                Some(config) => config,
                None => self.config.logging_config()?,
            };
            init_logging(&logging_config)?;
        }

        info!("开始构建服务运行时");

        let event_bus = EventBus::with_options(
            self.event_bus_options
                .unwrap_or_else(|| self.config.event_bus_options()),
        );

        let event_registry = Arc::new(EventRegistry::new());
        for definition in self.event_definitions {
            debug!("登记事件: {}", definition.name);
            event_registry.register(definition);
        }

        if self.event_logging {
            event_bus.add_interceptor(Arc::new(LoggingInterceptor));
        }
        if let Some(strict) = self.schema_validation {
            info!("启用事件载荷校验 (strict: {})", strict);
            let interceptor = SchemaValidationInterceptor::new(event_registry.clone());
            let interceptor = if strict { interceptor.strict() } else { interceptor };
            event_bus.add_interceptor(Arc::new(interceptor));
        }
        for interceptor in self.interceptors {
            event_bus.add_interceptor(interceptor);
        }

        let manager = ServiceLifecycleManager::with_options(
            event_bus.clone(),
            self.lifecycle_options
                .unwrap_or_else(|| self.config.lifecycle_options()),
        );
        let resolver = DefaultServiceResolver::with_options(
            Arc::new(manager.clone()),
            self.resolve_options
                .unwrap_or_else(|| self.config.resolve_options()),
        );

        info!("服务运行时构建完成");
        Ok(ServiceRuntime::new(event_bus, event_registry, manager, resolver))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
