use crate::topic::topic_segment;
use crate::types::RuleError;
use crate::utils::lookup_path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Field(String),
    Topic(i64),
}

/// `${...}` 替换模板
///
/// 支持 `${weight}`、`${state.weight}` 与 `${topic(3)}`。
/// 整个模板只有一个占位符时保留原始 JSON 类型。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template {
    raw: String,
    #[serde(skip)]
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, RuleError> {
        let mut parts = Vec::new();
        let mut rest = raw;

        while let Some(start) = rest.find("${") {
            if start > 0 {
                parts.push(Part::Text(rest[..start].to_string()));
            }
            let end = rest[start..].find('}').ok_or_else(|| {
                RuleError::InvalidStatement(format!("模板占位符未闭合: {}", raw))
            })?;
            let expr = rest[start + 2..start + end].trim();
            parts.push(Self::parse_expr(expr, raw)?);
            rest = &rest[start + end + 1..];
        }

        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    fn parse_expr(expr: &str, raw: &str) -> Result<Part, RuleError> {
        if expr.is_empty() {
            return Err(RuleError::InvalidStatement(format!("空的模板占位符: {}", raw)));
        }

        if let Some(args) = expr.strip_prefix("topic(").and_then(|e| e.strip_suffix(')')) {
            let args = args.trim();
            if args.is_empty() {
                return Ok(Part::Topic(0));
            }
            let index = args.parse::<i64>().map_err(|_| {
                RuleError::InvalidStatement(format!("topic() 参数必须是整数: {}", raw))
            })?;
            return Ok(Part::Topic(index));
        }

        Ok(Part::Field(expr.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn resolve(&self, record: &Map<String, Value>, topic: &str) -> Result<Value, RuleError> {
        if let [single] = self.parts.as_slice() {
            if !matches!(single, Part::Text(_)) {
                return Self::resolve_part(single, record, topic);
            }
        }

        let mut out = String::new();
        for part in &self.parts {
            match Self::resolve_part(part, record, topic)? {
                Value::String(s) => out.push_str(&s),
                other => out.push_str(&other.to_string()),
            }
        }
        Ok(Value::String(out))
    }

    pub fn resolve_string(&self, record: &Map<String, Value>, topic: &str) -> Result<String, RuleError> {
        match self.resolve(record, topic)? {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    fn resolve_part(part: &Part, record: &Map<String, Value>, topic: &str) -> Result<Value, RuleError> {
        match part {
            Part::Text(text) => Ok(Value::String(text.clone())),
            Part::Field(path) => lookup_path(record, path)
                .cloned()
                .ok_or_else(|| RuleError::MalformedMessage(format!("缺少字段: {}", path))),
            Part::Topic(index) => topic_segment(topic, *index)
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| {
                    RuleError::MalformedMessage(format!("主题 {} 没有第 {} 个层级", topic, index))
                }),
        }
    }
}

impl TryFrom<String> for Template {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.raw
    }
}
