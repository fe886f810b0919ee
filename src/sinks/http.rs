use super::FunctionInvoker;
use crate::types::RuleError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpInvokerConfig {
    /// 目标名称 -> URL
    pub endpoints: HashMap<String, String>,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_ms: Option<u64>,
}

/// 以 HTTP POST 方式把消息投递给通知目标
#[derive(Debug)]
pub struct HttpInvoker {
    config: HttpInvokerConfig,
    client: Client,
}

impl HttpInvoker {
    pub fn new(config: HttpInvokerConfig) -> Result<Self, RuleError> {
        // 默认 1 秒超时, 与通知函数的调用超时一致
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.unwrap_or(1000)))
            .build()
            .map_err(|e| RuleError::ConfigError(format!("HTTP客户端创建失败: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl FunctionInvoker for HttpInvoker {
    async fn invoke(&self, target: &str, payload: &Map<String, Value>) -> Result<(), RuleError> {
        let url = self
            .config
            .endpoints
            .get(target)
            .ok_or_else(|| RuleError::TargetNotFound(target.to_string()))?;

        let mut request = self.client.post(url).json(payload);

        // 添加请求头
        if let Some(headers) = &self.config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.send().await.map_err(|e| {
            error!("调用 {} 失败: {}", target, e);
            RuleError::Sink(format!("HTTP请求失败: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RuleError::Sink(format!(
                "HTTP请求返回错误状态码: {}",
                status
            )));
        }

        debug!("调用 {} 成功: {}", target, status);
        Ok(())
    }
}
