mod cat_sensor;

pub use cat_sensor::*;

use crate::engine::{Sinks, TopicRouter};
use crate::sinks::{HttpInvoker, HttpInvokerConfig};
use crate::types::{RuleError, RuleSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// 路由器配置: 规则集 + 可选的 HTTP 调用端
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(flatten)]
    pub rule_set: RuleSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoker: Option<HttpInvokerConfig>,
}

impl RouterConfig {
    pub fn from_json(content: &str) -> Result<Self, RuleError> {
        let config: RouterConfig = serde_json::from_str(content)?;
        config.rule_set.validate()?;
        Ok(config)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// 按配置创建路由器, 配置了 invoker 时替换默认调用端
    pub fn into_router(self, mut sinks: Sinks) -> Result<TopicRouter, RuleError> {
        if let Some(invoker) = self.invoker {
            sinks.invoker = Arc::new(HttpInvoker::new(invoker)?);
        }
        TopicRouter::new(self.rule_set, sinks)
    }
}
