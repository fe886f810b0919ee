use super::{FunctionInvoker, LogSink, MetricDatum, MetricsSink};
use crate::types::RuleError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tokio::sync::RwLock;

/// 内存指标端, 用于测试和演示
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    data: RwLock<Vec<MetricDatum>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn metrics(&self) -> Vec<MetricDatum> {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl MetricsSink for MemoryMetricsSink {
    async fn put_metric(&self, datum: MetricDatum) -> Result<(), RuleError> {
        self.data.write().await.push(datum);
        Ok(())
    }
}

/// 内存日志端, 可指定写入失败的日志组
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: RwLock<Vec<(String, Value)>>,
    failing: HashSet<String>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(destinations: &[&str]) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            failing: destinations.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub async fn records(&self) -> Vec<(String, Value)> {
        self.records.read().await.clone()
    }

    pub async fn records_for(&self, destination: &str) -> Vec<Value> {
        self.records
            .read()
            .await
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn write(&self, destination: &str, record: Value) -> Result<(), RuleError> {
        if self.failing.contains(destination) {
            return Err(RuleError::Sink(format!("日志组不可写: {}", destination)));
        }
        self.records
            .write()
            .await
            .push((destination.to_string(), record));
        Ok(())
    }
}

/// 记录所有调用的调用端, 可指定不可达的目标
#[derive(Debug, Default)]
pub struct RecordingInvoker {
    calls: RwLock<Vec<(String, Map<String, Value>)>>,
    unreachable: HashSet<String>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(targets: &[&str]) -> Self {
        Self {
            calls: RwLock::new(Vec::new()),
            unreachable: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub async fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl FunctionInvoker for RecordingInvoker {
    async fn invoke(&self, target: &str, payload: &Map<String, Value>) -> Result<(), RuleError> {
        if self.unreachable.contains(target) {
            return Err(RuleError::Sink(format!("调用目标不可达: {}", target)));
        }
        self.calls
            .write()
            .await
            .push((target.to_string(), payload.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok, block_on};

    #[test]
    fn failing_destinations() {
        let sink = MemoryLogSink::failing_on(&["broken"]);

        assert_ok!(block_on(sink.write("status", json!({"a": 1}))));
        assert_err!(block_on(sink.write("broken", json!({"a": 2}))));

        assert_eq!(block_on(sink.records()), vec![("status".to_string(), json!({"a": 1}))]);
    }

    #[test]
    fn unreachable_targets() {
        let invoker = RecordingInvoker::unreachable(&["down"]);
        let payload = Map::new();

        assert_ok!(block_on(invoker.invoke("up", &payload)));
        assert_err!(block_on(invoker.invoke("down", &payload)));
        assert_eq!(block_on(invoker.calls()).len(), 1);
    }
}
