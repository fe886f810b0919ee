mod http;
mod memory;

pub use http::{HttpInvoker, HttpInvokerConfig};
pub use memory::{MemoryLogSink, MemoryMetricsSink, RecordingInvoker};

use crate::types::{MetricUnit, RuleError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;
use tracing::info;

/// 一条指标数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    pub namespace: String,
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    /// 毫秒时间戳
    pub timestamp: i64,
}

/// 指标输出端
#[async_trait]
pub trait MetricsSink: Send + Sync + Debug {
    async fn put_metric(&self, datum: MetricDatum) -> Result<(), RuleError>;
}

/// 日志输出端, destination 对应日志组名称
#[async_trait]
pub trait LogSink: Send + Sync + Debug {
    async fn write(&self, destination: &str, record: Value) -> Result<(), RuleError>;
}

/// 通知/函数调用端
#[async_trait]
pub trait FunctionInvoker: Send + Sync + Debug {
    async fn invoke(&self, target: &str, payload: &Map<String, Value>) -> Result<(), RuleError>;
}

/// 通过 tracing 输出指标
#[derive(Debug, Default)]
pub struct TracingMetricsSink;

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn put_metric(&self, datum: MetricDatum) -> Result<(), RuleError> {
        info!(
            namespace = %datum.namespace,
            metric = %datum.name,
            value = datum.value,
            unit = ?datum.unit,
            timestamp = datum.timestamp,
            "put metric"
        );
        Ok(())
    }
}

/// 通过 tracing 输出日志记录
#[derive(Debug, Default)]
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn write(&self, destination: &str, record: Value) -> Result<(), RuleError> {
        info!(destination = %destination, "{}", record);
        Ok(())
    }
}

/// 只记录调用, 不做任何投递
#[derive(Debug, Default)]
pub struct TracingInvoker;

#[async_trait]
impl FunctionInvoker for TracingInvoker {
    async fn invoke(&self, target: &str, payload: &Map<String, Value>) -> Result<(), RuleError> {
        let payload = Value::Object(payload.clone());
        info!(target_fn = %target, "invoke: {}", payload);
        Ok(())
    }
}
