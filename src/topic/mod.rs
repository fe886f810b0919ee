//! MQTT 风格的主题过滤器
//!
//! | 过滤器      | 含义                         |
//! |-------------|------------------------------|
//! | `a/b/c`     | 精确匹配                     |
//! | `a/+/c`     | `+` 匹配恰好一个层级         |
//! | `a/#`       | `#` 匹配末尾的一个或多个层级 |

use crate::types::RuleError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterSegment {
    Literal(String),
    /// `+`
    SingleLevel,
    /// `#`
    MultiLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicFilter {
    raw: String,
    #[serde(skip)]
    segments: Vec<FilterSegment>,
}

impl TopicFilter {
    pub fn parse(filter: &str) -> Result<Self, RuleError> {
        let invalid = |reason: &str| RuleError::InvalidTopicFilter {
            filter: filter.to_string(),
            reason: reason.to_string(),
        };

        if filter.is_empty() {
            return Err(invalid("过滤器为空"));
        }

        let parts: Vec<&str> = filter.split('/').collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "+" => FilterSegment::SingleLevel,
                "#" => {
                    if i != last {
                        return Err(invalid("'#' 只能作为最后一个层级"));
                    }
                    FilterSegment::MultiLevel
                }
                p if p.contains('+') || p.contains('#') => {
                    return Err(invalid("通配符必须独占一个层级"));
                }
                p => FilterSegment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: filter.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }


    /// 判断主题是否匹配, 大小写敏感
    pub fn matches(&self, topic: &str) -> bool {
        let levels: Vec<&str> = topic.split('/').collect();

        // `$` 开头的系统主题不参与首层通配
        if topic.starts_with('$') && !matches!(self.segments.first(), Some(FilterSegment::Literal(_))) {
            return false;
        }

        let mut idx = 0;
        for segment in &self.segments {
            match segment {
                FilterSegment::MultiLevel => return idx < levels.len(),
                FilterSegment::SingleLevel => {
                    if idx >= levels.len() {
                        return false;
                    }
                }
                FilterSegment::Literal(lit) => match levels.get(idx) {
                    Some(level) if level == lit => {}
                    _ => return false,
                },
            }
            idx += 1;
        }

        idx == levels.len()
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for TopicFilter {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TopicFilter> for String {
    fn from(filter: TopicFilter) -> Self {
        filter.raw
    }
}

/// 取主题的第 n 个层级, 与 `topic(n)` 语义一致
///
/// `n` 从 1 开始, 负数从末尾倒数, 0 返回完整主题
pub fn topic_segment(topic: &str, n: i64) -> Option<&str> {
    if n == 0 {
        return Some(topic);
    }

    let levels: Vec<&str> = topic.split('/').collect();
    let idx = if n > 0 {
        usize::try_from(n - 1).ok()?
    } else {
        levels.len().checked_sub(usize::try_from(n.unsigned_abs()).ok()?)?
    };

    levels.get(idx).copied()
}
