use crate::components::{InvokeAction, LogAction, LogConfig, MetricAction, MetricConfig};
use crate::sinks::{
    FunctionInvoker, LogSink, MetricsSink, TracingInvoker, TracingLogSink, TracingMetricsSink,
};
use crate::types::{Action, ActionContext, RuleError};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ActionHandler: Send + Sync + std::fmt::Debug {
    async fn handle(&self, ctx: ActionContext<'_>) -> Result<(), RuleError>;
    fn type_name(&self) -> &'static str;
}

/// 动作所依赖的外部输出端
#[derive(Debug, Clone)]
pub struct Sinks {
    pub metrics: Arc<dyn MetricsSink>,
    pub logs: Arc<dyn LogSink>,
    pub invoker: Arc<dyn FunctionInvoker>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self {
            metrics: Arc::new(TracingMetricsSink),
            logs: Arc::new(TracingLogSink),
            invoker: Arc::new(TracingInvoker),
        }
    }
}

impl Sinks {
    /// 根据动作定义创建处理器
    pub fn create_handler(&self, action: &Action) -> Arc<dyn ActionHandler> {
        match action {
            Action::EmitMetric {
                namespace,
                name,
                value,
                unit,
                timestamp,
            } => Arc::new(MetricAction::new(
                MetricConfig {
                    namespace: namespace.clone(),
                    name: name.clone(),
                    value: value.clone(),
                    unit: *unit,
                    timestamp: timestamp.clone(),
                },
                self.metrics.clone(),
            )),
            Action::Invoke { target } => {
                Arc::new(InvokeAction::new(target.clone(), self.invoker.clone()))
            }
            Action::WriteLog { destination } => Arc::new(LogAction::new(
                LogConfig {
                    destination: destination.clone(),
                },
                self.logs.clone(),
            )),
        }
    }
}
