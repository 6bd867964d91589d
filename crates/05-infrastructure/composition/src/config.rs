//! 运行时配置
//!
//! 配置分为 `[lifecycle]`、`[event_bus]`、`[resolver]`、`[logging]` 四节，时间均以毫秒表示。
//! 加载顺序：默认值 -> 配置文件（可选）-> 带前缀的环境变量。

use crate::logging::LoggingConfig;
use di_abstractions::ResolveOptions;
use di_impl::LifecycleManagerOptions;
use infrastructure_common::{ConfigError, ConfigResult};
use messaging_impl::EventBusOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error};

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "RUNTIME";

/// 环境变量分隔符，如 `RUNTIME__LIFECYCLE__HEALTH_CHECK_TIMEOUT_MS`
pub const ENV_SEPARATOR: &str = "__";

/// 生命周期管理配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    /// 后台健康检查间隔，0 表示禁用
    pub health_check_interval_ms: u64,
    pub health_check_timeout_ms: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            health_check_interval_ms: 30_000,
            health_check_timeout_ms: 5_000,
        }
    }
}

/// 服务解析配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub poll_interval_ms: u64,
    pub default_timeout_ms: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            default_timeout_ms: 5_000,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 日志级别：trace、debug、info、warn、error
    pub level: String,
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_file: bool,
    pub show_line_number: bool,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

/// 运行时配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub lifecycle: LifecycleSettings,
    pub event_bus: EventBusOptions,
    pub resolver: ResolverSettings,
    pub logging: LoggingSettings,
}

impl RuntimeConfig {
    /// 从可选的配置文件和环境变量加载配置
    ///
    /// 文件格式由扩展名决定（toml、json、yaml）。指定的文件不存在时返回 `FileNotFound`。
    pub fn load(path: Option<&Path>, env_prefix: &str) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!("加载配置文件: {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                error!("配置构建失败: {}", e);
                ConfigError::ParseError {
                    source: Box::new(e),
                }
            })?;

        let config: RuntimeConfig = settings.try_deserialize().map_err(|e| {
            error!("配置绑定失败: {}", e);
            ConfigError::ParseError {
                source: Box::new(e),
            }
        })?;

        config.validate()?;
        debug!("运行时配置加载完成: {:?}", config);
        Ok(config)
    }

    /// 只从环境变量加载配置
    pub fn from_env(env_prefix: &str) -> ConfigResult<Self> {
        Self::load(None, env_prefix)
    }

    /// 校验配置取值
    pub fn validate(&self) -> ConfigResult<()> {
        if self.lifecycle.health_check_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "lifecycle.health_check_timeout_ms 必须大于 0".to_string(),
            });
        }
        if self.resolver.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "resolver.poll_interval_ms 必须大于 0".to_string(),
            });
        }
        LoggingConfig::try_from(&self.logging)?;
        Ok(())
    }

    pub fn lifecycle_options(&self) -> LifecycleManagerOptions {
        let interval = match self.lifecycle.health_check_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        LifecycleManagerOptions::default()
            .with_health_check_interval(interval)
            .with_health_check_timeout(Duration::from_millis(
                self.lifecycle.health_check_timeout_ms,
            ))
    }

    pub fn event_bus_options(&self) -> EventBusOptions {
        self.event_bus.clone()
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            poll_interval: Duration::from_millis(self.resolver.poll_interval_ms),
            default_timeout: Duration::from_millis(self.resolver.default_timeout_ms),
        }
    }

    pub fn logging_config(&self) -> ConfigResult<LoggingConfig> {
        LoggingConfig::try_from(&self.logging)
    }
}
