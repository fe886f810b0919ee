use crate::types::RuleError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// 入站的 MQTT 发布消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: Map<String, Value>,
    pub metadata: HashMap<String, String>,
    /// 接收时间 (毫秒)
    pub timestamp: i64,
}

impl Message {
    pub fn new(topic: &str, payload: Value) -> Result<Self, RuleError> {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                return Err(RuleError::MalformedMessage(format!(
                    "消息体必须是 JSON 对象, 实际为: {}",
                    other
                )))
            }
        };

        Ok(Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            payload,
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// 从原始字节解析消息体
    pub fn from_json(topic: &str, bytes: &[u8]) -> Result<Self, RuleError> {
        let payload: Value = serde_json::from_slice(bytes)
            .map_err(|e| RuleError::MalformedMessage(format!("消息体不是合法 JSON: {}", e)))?;
        Self::new(topic, payload)
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}
