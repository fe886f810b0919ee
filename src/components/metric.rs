use crate::engine::ActionHandler;
use crate::sinks::{MetricDatum, MetricsSink};
use crate::types::{ActionContext, MetricUnit, RuleError};
use crate::utils::{as_number, Template};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MetricConfig {
    pub namespace: String,
    pub name: Template,
    pub value: Template,
    pub unit: MetricUnit,
    pub timestamp: Option<Template>,
}

/// 指标动作: 从消息中取值并写入指标端
#[derive(Debug)]
pub struct MetricAction {
    config: MetricConfig,
    sink: Arc<dyn MetricsSink>,
}

impl MetricAction {
    pub fn new(config: MetricConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self { config, sink }
    }

    fn build_datum(&self, ctx: &ActionContext<'_>) -> Result<MetricDatum, RuleError> {
        let name = self.config.name.resolve_string(ctx.record, ctx.topic())?;

        let raw = self.config.value.resolve(ctx.record, ctx.topic())?;
        let value = as_number(&raw).ok_or_else(|| {
            RuleError::MalformedMessage(format!("指标值不是数字: {}", raw))
        })?;

        let timestamp = match &self.config.timestamp {
            Some(template) => {
                let raw = template.resolve(ctx.record, ctx.topic())?;
                as_number(&raw).map(|t| t as i64).ok_or_else(|| {
                    RuleError::MalformedMessage(format!("指标时间戳不是数字: {}", raw))
                })?
            }
            None => ctx.msg.timestamp,
        };

        Ok(MetricDatum {
            namespace: self.config.namespace.clone(),
            name,
            value,
            unit: self.config.unit,
            timestamp,
        })
    }
}

#[async_trait]
impl ActionHandler for MetricAction {
    async fn handle(&self, ctx: ActionContext<'_>) -> Result<(), RuleError> {
        let datum = self.build_datum(&ctx)?;
        debug!("{}/{} = {}", datum.namespace, datum.name, datum.value);
        self.sink.put_metric(datum).await
    }

    fn type_name(&self) -> &'static str {
        "emit_metric"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemoryMetricsSink;
    use crate::types::Message;
    use serde_json::json;

    fn action(value: &str, sink: Arc<MemoryMetricsSink>) -> MetricAction {
        timed_action(value, None, sink)
    }

    fn timed_action(value: &str, timestamp: Option<&str>, sink: Arc<MemoryMetricsSink>) -> MetricAction {
        MetricAction::new(
            MetricConfig {
                namespace: "CatSensor".to_string(),
                name: Template::parse("${device}/weight").unwrap(),
                value: Template::parse(value).unwrap(),
                unit: MetricUnit::None,
                timestamp: timestamp.map(|t| Template::parse(t).unwrap()),
            },
            sink,
        )
    }

    #[tokio::test]
    async fn emits_numeric_value() {
        let sink = Arc::new(MemoryMetricsSink::new());
        let msg = Message::new("catsensor/weight_data/dev", json!({"weight": "4200"}))
            .unwrap()
            .with_timestamp(42);
        let record = json!({"weight": "4200", "device": "dev"}).as_object().cloned().unwrap();

        action("${weight}", sink.clone())
            .handle(ActionContext::new("r", 0, &msg, &record))
            .await
            .unwrap();

        let metrics = sink.metrics().await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "dev/weight");
        assert_eq!(metrics[0].value, 4200.0);
        assert_eq!(metrics[0].timestamp, 42);
    }

    #[tokio::test]
    async fn non_numeric_value_is_malformed() {
        let sink = Arc::new(MemoryMetricsSink::new());
        let msg = Message::new("a/b/c", json!({"weight": "heavy"})).unwrap();
        let record = json!({"weight": "heavy", "device": "c"}).as_object().cloned().unwrap();

        let err = action("${weight}", sink.clone())
            .handle(ActionContext::new("r", 0, &msg, &record))
            .await
            .unwrap_err();

        assert!(matches!(err, RuleError::MalformedMessage(_)));
        assert!(sink.metrics().await.is_empty());
    }

    #[tokio::test]
    async fn non_finite_value_is_malformed() {
        let sink = Arc::new(MemoryMetricsSink::new());
        let msg = Message::new("a/b/c", json!({"weight": "NaN"})).unwrap();
        let record = json!({"weight": "NaN", "device": "c"}).as_object().cloned().unwrap();

        let err = action("${weight}", sink.clone())
            .handle(ActionContext::new("r", 0, &msg, &record))
            .await
            .unwrap_err();

        assert!(matches!(err, RuleError::MalformedMessage(_)));
        assert!(sink.metrics().await.is_empty());
    }

    #[tokio::test]
    async fn timestamp_from_template() {
        let sink = Arc::new(MemoryMetricsSink::new());
        let msg = Message::new("a/b/c", json!({"weight": 10, "ts": 1_700_000_000_000i64}))
            .unwrap()
            .with_timestamp(42);
        let record = json!({"weight": 10, "ts": "1700000000000", "device": "c"})
            .as_object()
            .cloned()
            .unwrap();

        timed_action("${weight}", Some("${ts}"), sink.clone())
            .handle(ActionContext::new("r", 0, &msg, &record))
            .await
            .unwrap();

        let metrics = sink.metrics().await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].timestamp, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn non_numeric_timestamp_is_malformed() {
        let sink = Arc::new(MemoryMetricsSink::new());
        let msg = Message::new("a/b/c", json!({"weight": 10, "ts": "yesterday"})).unwrap();
        let record = json!({"weight": 10, "ts": "yesterday", "device": "c"})
            .as_object()
            .cloned()
            .unwrap();

        let err = timed_action("${weight}", Some("${ts}"), sink.clone())
            .handle(ActionContext::new("r", 0, &msg, &record))
            .await
            .unwrap_err();

        match err {
            RuleError::MalformedMessage(msg) => assert!(msg.contains("时间戳")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(sink.metrics().await.is_empty());
    }
}
