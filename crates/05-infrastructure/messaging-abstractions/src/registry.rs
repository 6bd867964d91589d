//! 事件注册表
//!
//! 记录事件名的描述、版本、弃用标记以及可选的载荷结构，供拦截器在分发前校验。

use dashmap::DashMap;
use infrastructure_common::SchemaValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// 载荷字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
}

impl FieldType {
    /// 判断 JSON 值是否符合该类型
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Null => value.is_null(),
        }
    }

    /// 类型名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
        }
    }

    /// JSON 值的实际类型名称
    pub fn name_of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_f64() => "number",
            Value::Number(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// 单个字段的约束
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub field_type: FieldType,
    pub required: bool,
}

/// 事件载荷结构
///
/// 载荷必须是 JSON 对象。必需字段缺失、字段类型不符，或在禁止额外字段时出现未声明的字段，
/// 都会导致校验失败。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSchema>,
    #[serde(default = "default_allow_additional_fields")]
    pub allow_additional_fields: bool,
}

fn default_allow_additional_fields() -> bool {
    true
}

impl Default for EventSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSchema {
    /// 创建空结构，允许任意字段
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            allow_additional_fields: true,
        }
    }

    /// 添加必需字段
    pub fn required_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(
            name.into(),
            FieldSchema {
                field_type,
                required: true,
            },
        );
        self
    }

    /// 添加可选字段
    pub fn optional_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(
            name.into(),
            FieldSchema {
                field_type,
                required: false,
            },
        );
        self
    }

    /// 禁止未声明的字段
    pub fn deny_additional_fields(mut self) -> Self {
        self.allow_additional_fields = false;
        self
    }

    /// 校验事件载荷
    pub fn validate(&self, event: &str, data: &Value) -> Result<(), SchemaValidationError> {
        let object = data
            .as_object()
            .ok_or_else(|| SchemaValidationError::PayloadNotObject {
                event: event.to_string(),
            })?;

        for (name, field) in &self.fields {
            match object.get(name) {
                None if field.required => {
                    return Err(SchemaValidationError::MissingField {
                        event: event.to_string(),
                        field: name.clone(),
                    });
                }
                None => {}
                Some(value) if !field.field_type.accepts(value) => {
                    return Err(SchemaValidationError::InvalidFieldType {
                        event: event.to_string(),
                        field: name.clone(),
                        expected: field.field_type.as_str().to_string(),
                        actual: FieldType::name_of(value).to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        if !self.allow_additional_fields {
            if let Some(extra) = object.keys().find(|key| !self.fields.contains_key(*key)) {
                return Err(SchemaValidationError::UnexpectedField {
                    event: event.to_string(),
                    field: extra.clone(),
                });
            }
        }

        Ok(())
    }
}

/// 事件定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub deprecation_message: Option<String>,
    #[serde(default)]
    pub schema: Option<EventSchema>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl EventDefinition {
    /// 创建事件定义
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            version: default_version(),
            deprecated: false,
            deprecation_message: None,
            schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_schema(mut self, schema: EventSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// 标记为已弃用
    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = true;
        self.deprecation_message = Some(message.into());
        self
    }
}

/// 事件注册表
///
/// 并发安全，可在多个总线或拦截器之间共享（外层包一层 `Arc`）。
#[derive(Debug, Default)]
pub struct EventRegistry {
    definitions: DashMap<String, EventDefinition>,
}

impl EventRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册事件定义，返回被替换的旧定义
    pub fn register(&self, definition: EventDefinition) -> Option<EventDefinition> {
        info!("注册事件: {} (版本: {})", definition.name, definition.version);
        self.definitions.insert(definition.name.clone(), definition)
    }

    /// 注销事件定义
    pub fn unregister(&self, name: &str) -> Option<EventDefinition> {
        debug!("注销事件: {}", name);
        self.definitions.remove(name).map(|(_, definition)| definition)
    }

    /// 获取事件定义
    pub fn get(&self, name: &str) -> Option<EventDefinition> {
        self.definitions.get(name).map(|entry| entry.value().clone())
    }

    /// 事件是否已注册
    pub fn is_registered(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// 按名称排序的所有事件定义
    pub fn list(&self) -> Vec<EventDefinition> {
        let mut definitions: Vec<EventDefinition> = self
            .definitions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// 将已注册事件标记为弃用，事件不存在时返回 `false`
    pub fn deprecate(&self, name: &str, message: impl Into<String>) -> bool {
        match self.definitions.get_mut(name) {
            Some(mut entry) => {
                entry.deprecated = true;
                entry.deprecation_message = Some(message.into());
                info!("事件已弃用: {}", name);
                true
            }
            None => false,
        }
    }

    /// 事件是否已弃用
    pub fn is_deprecated(&self, name: &str) -> bool {
        self.definitions
            .get(name)
            .map(|entry| entry.deprecated)
            .unwrap_or(false)
    }

    /// 弃用说明
    pub fn deprecation_message(&self, name: &str) -> Option<String> {
        self.definitions
            .get(name)
            .and_then(|entry| entry.deprecation_message.clone())
    }

    /// 按注册的结构校验载荷
    ///
    /// 未注册的事件返回 [`SchemaValidationError::UnknownEvent`]，未声明结构的事件总是通过。
    pub fn validate(&self, name: &str, data: &Value) -> Result<(), SchemaValidationError> {
        let entry = self
            .definitions
            .get(name)
            .ok_or_else(|| SchemaValidationError::UnknownEvent {
                event: name.to_string(),
            })?;

        match &entry.schema {
            Some(schema) => schema.validate(name, data),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn clear(&self) {
        self.definitions.clear();
    }
}
