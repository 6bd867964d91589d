//! 事件名通配匹配
//!
//! 事件名以 `.` 分段，模式中 `*` 匹配恰好一个分段，`**` 匹配任意个字符（可跨越分段）。
//! 模式对整个事件名做锚定匹配。

use infrastructure_common::{EventBusError, EventBusResult};
use regex::Regex;
use std::fmt;

const SEGMENT_SEPARATOR: char = '.';
const SINGLE_SEGMENT: &str = "[^.]+";
const ANY_SEGMENTS: &str = ".*";

/// 编译后的事件名模式
#[derive(Debug, Clone)]
pub struct EventPattern {
    source: String,
    regex: Regex,
}

impl EventPattern {
    /// 编译事件名模式
    pub fn new(pattern: impl Into<String>) -> EventBusResult<Self> {
        let source = pattern.into();
        if source.is_empty() {
            return Err(EventBusError::InvalidPattern {
                pattern: source,
                message: "模式不能为空".to_string(),
            });
        }

        let mut expression = String::from("^");
        for (index, segment) in source.split(SEGMENT_SEPARATOR).enumerate() {
            if segment.is_empty() {
                return Err(EventBusError::InvalidPattern {
                    pattern: source.clone(),
                    message: format!("第{}个分段为空", index + 1),
                });
            }
            if index > 0 {
                expression.push_str(r"\.");
            }
            expression.push_str(&Self::segment_expression(segment));
        }
        expression.push('$');

        let regex = Regex::new(&expression).map_err(|e| EventBusError::InvalidPattern {
            pattern: source.clone(),
            message: e.to_string(),
        })?;

        Ok(Self { source, regex })
    }

    fn segment_expression(segment: &str) -> String {
        if segment == "**" {
            return ANY_SEGMENTS.to_string();
        }

        segment
            .split("**")
            .map(|part| {
                part.split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(SINGLE_SEGMENT)
            })
            .collect::<Vec<_>>()
            .join(ANY_SEGMENTS)
    }

    /// 模式原文
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 模式是否包含通配符
    pub fn is_wildcard(&self) -> bool {
        self.source.contains('*')
    }

    /// 判断事件名是否匹配
    pub fn matches(&self, event: &str) -> bool {
        self.regex.is_match(event)
    }
}

impl PartialEq for EventPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for EventPattern {}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// 模式集合，任一模式匹配即视为匹配
#[derive(Debug, Clone, Default)]
pub struct EventPatternMatcher {
    patterns: Vec<EventPattern>,
}

impl EventPatternMatcher {
    /// 创建空的模式集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加模式，重复添加同一模式不产生副本
    pub fn add_pattern(&mut self, pattern: &str) -> EventBusResult<()> {
        if self.patterns.iter().any(|p| p.as_str() == pattern) {
            return Ok(());
        }
        self.patterns.push(EventPattern::new(pattern)?);
        Ok(())
    }

    /// 移除模式
    pub fn remove_pattern(&mut self, pattern: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.as_str() != pattern);
        self.patterns.len() != before
    }

    /// 清空所有模式
    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    /// 判断事件名是否匹配任一模式
    pub fn matches(&self, event: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(event))
    }

    /// 返回第一个匹配的模式
    pub fn find_match(&self, event: &str) -> Option<&EventPattern> {
        self.patterns.iter().find(|p| p.matches(event))
    }

    /// 当前所有模式原文
    pub fn patterns(&self) -> Vec<&str> {
        self.patterns.iter().map(EventPattern::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
