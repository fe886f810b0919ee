use crate::engine::ActionHandler;
use crate::sinks::LogSink;
use crate::types::{ActionContext, RuleError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub destination: String,
}

pub struct LogAction {
    config: LogConfig,
    sink: Arc<dyn LogSink>,
}

impl LogAction {
    pub fn new(config: LogConfig, sink: Arc<dyn LogSink>) -> Self {
        Self { config, sink }
    }

    fn format_record(&self, ctx: &ActionContext<'_>) -> Value {
        let mut record = ctx.record.clone();

        // 附加主题和时间戳
        record
            .entry("topic")
            .or_insert_with(|| Value::String(ctx.msg.topic.clone()));
        record
            .entry("timestamp")
            .or_insert_with(|| Value::from(ctx.msg.timestamp));

        Value::Object(record)
    }
}

impl std::fmt::Debug for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogAction")
            .field("destination", &self.config.destination)
            .finish()
    }
}

#[async_trait]
impl ActionHandler for LogAction {
    async fn handle(&self, ctx: ActionContext<'_>) -> Result<(), RuleError> {
        let record = self.format_record(&ctx);
        debug!("写入日志组 {}", self.config.destination);
        self.sink.write(&self.config.destination, record).await
    }

    fn type_name(&self) -> &'static str {
        "write_log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemoryLogSink;
    use crate::types::Message;
    use serde_json::json;

    #[tokio::test]
    async fn writes_record_with_topic() {
        let sink = Arc::new(MemoryLogSink::new());
        let action = LogAction::new(
            LogConfig {
                destination: "status".to_string(),
            },
            sink.clone(),
        );
        let msg = Message::new("catsensor/status/dev", json!({"message": "calibrated"}))
            .unwrap()
            .with_timestamp(7);
        let record = msg.payload.clone();

        action
            .handle(ActionContext::new("StatusRule", 0, &msg, &record))
            .await
            .unwrap();

        assert_eq!(
            sink.records_for("status").await,
            vec![json!({"message": "calibrated", "topic": "catsensor/status/dev", "timestamp": 7})]
        );
    }
}
