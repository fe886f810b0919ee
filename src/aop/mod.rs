use crate::types::{ActionContext, Message, RuleError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// 动作拦截器
#[async_trait]
pub trait ActionInterceptor: Send + Sync {
    /// 动作执行前
    async fn before<'a>(&self, ctx: &ActionContext<'a>) -> Result<(), RuleError>;

    /// 动作执行后
    async fn after<'a>(&self, ctx: &ActionContext<'a>) -> Result<(), RuleError>;

    /// 动作执行出错时
    async fn error<'a>(&self, ctx: &ActionContext<'a>, error: &RuleError) -> Result<(), RuleError>;
}

/// 消息拦截器
#[async_trait]
pub trait MessageInterceptor: Send + Sync {
    /// 路由前
    async fn before_route(&self, msg: &Message) -> Result<(), RuleError>;

    /// 路由后, matched 为命中的规则名
    async fn after_route(&self, msg: &Message, matched: &[String]) -> Result<(), RuleError>;
}

/// 拦截器管理器
#[derive(Clone, Default)]
pub struct InterceptorManager {
    action_interceptors: Vec<Arc<dyn ActionInterceptor>>,
    msg_interceptors: Vec<Arc<dyn MessageInterceptor>>,
}

impl InterceptorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action_interceptor(&mut self, interceptor: Arc<dyn ActionInterceptor>) {
        self.action_interceptors.push(interceptor);
    }

    pub fn add_msg_interceptor(&mut self, interceptor: Arc<dyn MessageInterceptor>) {
        self.msg_interceptors.push(interceptor);
    }

    pub async fn before_action<'a>(&self, ctx: &ActionContext<'a>) -> Result<(), RuleError> {
        for interceptor in &self.action_interceptors {
            interceptor.before(ctx).await?;
        }
        Ok(())
    }

    pub async fn after_action<'a>(&self, ctx: &ActionContext<'a>) -> Result<(), RuleError> {
        for interceptor in &self.action_interceptors {
            interceptor.after(ctx).await?;
        }
        Ok(())
    }

    pub async fn action_error<'a>(
        &self,
        ctx: &ActionContext<'a>,
        error: &RuleError,
    ) -> Result<(), RuleError> {
        for interceptor in &self.action_interceptors {
            interceptor.error(ctx, error).await?;
        }
        Ok(())
    }

    pub async fn before_route(&self, msg: &Message) -> Result<(), RuleError> {
        for interceptor in &self.msg_interceptors {
            interceptor.before_route(msg).await?;
        }
        Ok(())
    }

    pub async fn after_route(&self, msg: &Message, matched: &[String]) -> Result<(), RuleError> {
        for interceptor in &self.msg_interceptors {
            interceptor.after_route(msg, matched).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for InterceptorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorManager")
            .field("action_interceptors", &self.action_interceptors.len())
            .field("msg_interceptors", &self.msg_interceptors.len())
            .finish()
    }
}

/// 日志拦截器
#[derive(Debug, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl ActionInterceptor for LoggingInterceptor {
    async fn before<'a>(&self, ctx: &ActionContext<'a>) -> Result<(), RuleError> {
        debug!("规则 {} 动作 {} 开始执行", ctx.rule, ctx.index);
        Ok(())
    }

    async fn after<'a>(&self, ctx: &ActionContext<'a>) -> Result<(), RuleError> {
        debug!("规则 {} 动作 {} 执行完成", ctx.rule, ctx.index);
        Ok(())
    }

    async fn error<'a>(&self, ctx: &ActionContext<'a>, error: &RuleError) -> Result<(), RuleError> {
        warn!("规则 {} 动作 {} 执行失败: {}", ctx.rule, ctx.index, error);
        Ok(())
    }
}

#[async_trait]
impl MessageInterceptor for LoggingInterceptor {
    async fn before_route(&self, msg: &Message) -> Result<(), RuleError> {
        debug!("收到消息 {} 主题 {}", msg.id, msg.topic);
        Ok(())
    }

    async fn after_route(&self, msg: &Message, matched: &[String]) -> Result<(), RuleError> {
        debug!("消息 {} 命中规则 {:?}", msg.id, matched);
        Ok(())
    }
}
