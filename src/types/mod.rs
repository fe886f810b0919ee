mod context;
mod error;
mod message;

pub use context::*;
pub use error::*;
pub use message::*;

use crate::sql::RuleStatement;
use crate::topic::TopicFilter;
use crate::utils::Template;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 规则集定义, 部署时一次性加载
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

/// 主题规则: 主题过滤 + 条件 -> 动作列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// 规则唯一标识
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 规则语句, 例如 `SELECT *, topic(3) as device FROM 'a/#'`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// 不写 sql 时可直接给出过滤器, 等价于 `SELECT *`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_filter: Option<String>,
    /// 为 false 时规则永远不参与评估
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub actions: Vec<Action>,
    pub error_action: ErrorAction,
}

fn default_enabled() -> bool {
    true
}

/// 规则动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    EmitMetric {
        namespace: String,
        name: Template,
        value: Template,
        #[serde(default)]
        unit: MetricUnit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Template>,
    },
    Invoke {
        target: String,
    },
    WriteLog {
        destination: String,
    },
}

impl Action {
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::EmitMetric { .. } => "emit_metric",
            Action::Invoke { .. } => "invoke",
            Action::WriteLog { .. } => "write_log",
        }
    }
}

/// 动作失败时的兜底动作, 每条规则恰好一个
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorAction {
    WriteLog { destination: String },
}

impl ErrorAction {
    pub fn destination(&self) -> &str {
        match self {
            ErrorAction::WriteLog { destination } => destination,
        }
    }
}

/// CloudWatch 指标单位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    #[default]
    None,
    Seconds,
    Microseconds,
    Milliseconds,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Bits,
    Kilobits,
    Megabits,
    Gigabits,
    Terabits,
    Percent,
    Count,
    #[serde(rename = "Bytes/Second")]
    BytesPerSecond,
    #[serde(rename = "Bits/Second")]
    BitsPerSecond,
    #[serde(rename = "Count/Second")]
    CountPerSecond,
}

impl Rule {
    /// 解析规则语句, sql 与 topic_filter 必须且只能给出一个
    pub fn statement(&self) -> Result<RuleStatement, RuleError> {
        match (&self.sql, &self.topic_filter) {
            (Some(sql), None) => RuleStatement::parse(sql),
            (None, Some(filter)) => Ok(RuleStatement::select_all(TopicFilter::parse(filter)?)),
            (Some(_), Some(_)) => Err(RuleError::ConfigError(format!(
                "规则 {} 不能同时指定 sql 和 topic_filter",
                self.name
            ))),
            (None, None) => Err(RuleError::ConfigError(format!(
                "规则 {} 缺少 sql 或 topic_filter",
                self.name
            ))),
        }
    }
}

impl RuleSet {
    pub fn from_json(content: &str) -> Result<Self, RuleError> {
        let rule_set: RuleSet = serde_json::from_str(content)?;
        rule_set.validate()?;
        Ok(rule_set)
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        let mut names = HashSet::new();
        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                return Err(RuleError::ConfigError("规则名称不能为空".to_string()));
            }
            if !names.insert(rule.name.as_str()) {
                return Err(RuleError::DuplicateRule(rule.name.clone()));
            }
            rule.statement()?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }
}
