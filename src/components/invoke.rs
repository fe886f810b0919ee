use crate::engine::ActionHandler;
use crate::sinks::FunctionInvoker;
use crate::types::{ActionContext, RuleError};
use async_trait::async_trait;
use std::sync::Arc;

/// 调用通知函数, 传入投影后的完整记录
#[derive(Debug)]
pub struct InvokeAction {
    target: String,
    invoker: Arc<dyn FunctionInvoker>,
}

impl InvokeAction {
    pub fn new(target: String, invoker: Arc<dyn FunctionInvoker>) -> Self {
        Self { target, invoker }
    }
}

#[async_trait]
impl ActionHandler for InvokeAction {
    async fn handle(&self, ctx: ActionContext<'_>) -> Result<(), RuleError> {
        self.invoker.invoke(&self.target, ctx.record).await
    }

    fn type_name(&self) -> &'static str {
        "invoke"
    }
}
