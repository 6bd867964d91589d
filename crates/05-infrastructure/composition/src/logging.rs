//! 日志初始化

use crate::config::LoggingSettings;
use infrastructure_common::{ConfigError, InfrastructureError};
use tracing::info;

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: tracing::Level,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }
}

impl TryFrom<&LoggingSettings> for LoggingConfig {
    type Error = ConfigError;

    fn try_from(settings: &LoggingSettings) -> Result<Self, Self::Error> {
        let level = settings
            .level
            .parse::<tracing::Level>()
            .map_err(|_| ConfigError::ValidationError {
                message: format!("无效的日志级别: {}", settings.level),
            })?;

        Ok(Self {
            level,
            show_target: settings.show_target,
            show_thread_ids: settings.show_thread_ids,
            show_file: settings.show_file,
            show_line_number: settings.show_line_number,
            json_format: settings.json_format,
        })
    }
}

/// 初始化全局日志订阅者，进程内只能成功一次
pub fn init_logging(config: &LoggingConfig) -> Result<(), InfrastructureError> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.level)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| InfrastructureError::BootstrapFailed {
        message: format!("日志初始化失败: {}", e),
    })?;

    info!("日志系统初始化完成");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_from_settings() {
        let settings = LoggingSettings {
            level: "WARN".to_string(),
            json_format: true,
            ..LoggingSettings::default()
        };

        let config = LoggingConfig::try_from(&settings).unwrap();
        assert_eq!(config.level, tracing::Level::WARN);
        assert!(config.json_format);
        assert!(config.show_target);
    }

    #[test]
    fn test_presets() {
        assert_eq!(LoggingConfig::development().level, tracing::Level::DEBUG);
        assert!(LoggingConfig::production().json_format);
        assert_eq!(LoggingConfig::default().level, tracing::Level::INFO);
    }
}
