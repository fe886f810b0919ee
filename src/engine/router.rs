use crate::aop::{ActionInterceptor, InterceptorManager, MessageInterceptor};
use crate::engine::{
    ActionHandler, ActionOutcome, ActionStatus, ErrorActionStatus, RoutingReport, RuleOutcome,
    Sinks,
};
use crate::sinks::{FunctionInvoker, LogSink, MetricsSink};
use crate::sql::RuleStatement;
use crate::types::{ActionContext, ErrorAction, Message, RuleError, RuleSet};
use futures::future::join_all;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 编译后的规则
#[derive(Debug)]
struct CompiledRule {
    name: String,
    enabled: bool,
    statement: RuleStatement,
    actions: Vec<Arc<dyn ActionHandler>>,
    error_action: ErrorAction,
}

impl CompiledRule {
    fn selects(&self, msg: &Message) -> bool {
        if !self.enabled || !self.statement.filter.matches(&msg.topic) {
            return false;
        }
        if !self.statement.evaluate(msg) {
            debug!("规则 {} 的 WHERE 条件不满足, 跳过消息 {}", self.name, msg.id);
            return false;
        }
        true
    }
}

/// 主题路由器
///
/// 规则在构建时一次性编译, 之后只读, 可以在多个任务间克隆共享。
#[derive(Debug, Clone)]
pub struct TopicRouter {
    rules: Arc<Vec<CompiledRule>>,
    sinks: Sinks,
    interceptors: Arc<InterceptorManager>,
}

pub struct RouterBuilder {
    rule_set: RuleSet,
    sinks: Sinks,
    interceptors: InterceptorManager,
}

impl RouterBuilder {
    pub fn new(rule_set: RuleSet) -> Self {
        Self {
            rule_set,
            sinks: Sinks::default(),
            interceptors: InterceptorManager::new(),
        }
    }

    pub fn sinks(mut self, sinks: Sinks) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.metrics = sink;
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.logs = sink;
        self
    }

    pub fn invoker(mut self, invoker: Arc<dyn FunctionInvoker>) -> Self {
        self.sinks.invoker = invoker;
        self
    }

    pub fn action_interceptor(mut self, interceptor: Arc<dyn ActionInterceptor>) -> Self {
        self.interceptors.add_action_interceptor(interceptor);
        self
    }

    pub fn msg_interceptor(mut self, interceptor: Arc<dyn MessageInterceptor>) -> Self {
        self.interceptors.add_msg_interceptor(interceptor);
        self
    }

    pub fn build(self) -> Result<TopicRouter, RuleError> {
        self.rule_set.validate()?;

        let mut rules = Vec::with_capacity(self.rule_set.rules.len());
        for rule in &self.rule_set.rules {
            let statement = rule.statement()?;
            let actions = rule
                .actions
                .iter()
                .map(|action| self.sinks.create_handler(action))
                .collect();

            debug!(
                "编译规则 {}: 过滤器 {}, {} 个动作, 启用: {}",
                rule.name,
                statement.filter,
                rule.actions.len(),
                rule.enabled
            );

            rules.push(CompiledRule {
                name: rule.name.clone(),
                enabled: rule.enabled,
                statement,
                actions,
                error_action: rule.error_action.clone(),
            });
        }

        info!("规则加载成功, 共 {} 条", rules.len());

        Ok(TopicRouter {
            rules: Arc::new(rules),
            sinks: self.sinks,
            interceptors: Arc::new(self.interceptors),
        })
    }
}

impl TopicRouter {
    pub fn builder(rule_set: RuleSet) -> RouterBuilder {
        RouterBuilder::new(rule_set)
    }

    pub fn new(rule_set: RuleSet, sinks: Sinks) -> Result<Self, RuleError> {
        RouterBuilder::new(rule_set).sinks(sinks).build()
    }

    pub fn from_json(content: &str, sinks: Sinks) -> Result<Self, RuleError> {
        Self::new(RuleSet::from_json(content)?, sinks)
    }

    pub async fn from_file(path: impl AsRef<Path>, sinks: Sinks) -> Result<Self, RuleError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content, sinks)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// 返回会处理该消息的规则名, 按规则集顺序
    pub fn matching_rules(&self, msg: &Message) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.selects(msg))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// 路由一条消息
    ///
    /// 没有命中规则不算错误, 返回空报告。单个动作失败会触发规则的
    /// 错误动作, 不影响同一规则的其他动作。
    pub async fn route(&self, msg: Message) -> Result<RoutingReport, RuleError> {
        self.interceptors.before_route(&msg).await?;

        let mut report = RoutingReport::new(msg.id, &msg.topic);

        for rule in self.rules.iter().filter(|r| r.selects(&msg)) {
            let outcome = self.execute_rule(rule, &msg).await?;
            report.rules.push(outcome);
        }

        if report.is_empty() {
            debug!("消息 {} 主题 {} 没有匹配的规则", msg.id, msg.topic);
        }

        let matched: Vec<String> = report.rules.iter().map(|r| r.rule.clone()).collect();
        self.interceptors.after_route(&msg, &matched).await?;

        Ok(report)
    }

    async fn execute_rule(
        &self,
        rule: &CompiledRule,
        msg: &Message,
    ) -> Result<RuleOutcome, RuleError> {
        let record = rule.statement.project(msg);

        // 同一规则的动作并发执行, 结果按动作顺序返回
        let results = join_all(rule.actions.iter().enumerate().map(|(index, handler)| {
            let ctx = ActionContext::new(&rule.name, index, msg, &record);
            self.execute_action(handler.as_ref(), ctx)
        }))
        .await;

        // 拦截器错误要等所有失败动作的错误动作执行完后再返回
        let mut intercepted = None;
        let mut actions = Vec::with_capacity(results.len());
        for (index, run) in results.into_iter().enumerate() {
            let handler = &rule.actions[index];
            if let Err(e) = run.interceptor {
                warn!("规则 {} 动作 {} 被拦截器中止: {}", rule.name, index, e);
                if intercepted.is_none() {
                    intercepted = Some(e);
                }
            }

            let status = match run.result {
                None => continue,
                Some(Ok(())) => ActionStatus::Succeeded,
                Some(Err(e)) => {
                    let failure = RuleError::ActionFailure {
                        rule: rule.name.clone(),
                        index,
                        cause: e.to_string(),
                    };
                    warn!("{}", failure);

                    let error_action = self
                        .run_error_action(rule, index, handler.type_name(), &e, msg)
                        .await;
                    ActionStatus::Failed {
                        cause: e.to_string(),
                        error_action,
                    }
                }
            };

            actions.push(ActionOutcome {
                index,
                action_type: handler.type_name(),
                status,
            });
        }

        if let Some(e) = intercepted {
            return Err(e);
        }

        Ok(RuleOutcome {
            rule: rule.name.clone(),
            actions,
        })
    }

    /// 执行单个动作
    ///
    /// `before` 拦截器拒绝时动作不会执行, `result` 为 `None`。
    /// `after`/`error` 拦截器失败不影响动作本身的结果, 失败的动作
    /// 仍会触发错误动作, 之后整条消息以拦截器错误中止。
    async fn execute_action(&self, handler: &dyn ActionHandler, ctx: ActionContext<'_>) -> ActionRun {
        if let Err(e) = self.interceptors.before_action(&ctx).await {
            return ActionRun {
                result: None,
                interceptor: Err(e),
            };
        }

        let result = handler.handle(ctx).await;
        let interceptor = match &result {
            Ok(()) => self.interceptors.after_action(&ctx).await,
            Err(e) => self.interceptors.action_error(&ctx, e).await,
        };

        ActionRun {
            result: Some(result),
            interceptor,
        }
    }

    async fn run_error_action(
        &self,
        rule: &CompiledRule,
        index: usize,
        action_type: &str,
        cause: &RuleError,
        msg: &Message,
    ) -> ErrorActionStatus {
        let record = error_record(&rule.name, index, action_type, cause, msg);

        let result = match &rule.error_action {
            ErrorAction::WriteLog { destination } => self.sinks.logs.write(destination, record).await,
        };

        match result {
            Ok(()) => ErrorActionStatus::Logged,
            Err(e) => {
                // 错误动作本身失败时不再重试
                error!(
                    "规则 {} 的错误动作写入 {} 失败: {}",
                    rule.name,
                    rule.error_action.destination(),
                    e
                );
                ErrorActionStatus::Failed(e.to_string())
            }
        }
    }
}

struct ActionRun {
    result: Option<Result<(), RuleError>>,
    interceptor: Result<(), RuleError>,
}

fn error_record(
    rule: &str,
    index: usize,
    action_type: &str,
    cause: &RuleError,
    msg: &Message,
) -> Value {
    json!({
        "rule_name": rule,
        "action_index": index,
        "action_type": action_type,
        "error_kind": cause.kind(),
        "error": cause.to_string(),
        "message_id": msg.id,
        "topic": msg.topic,
        "payload": Value::Object(msg.payload.clone()),
        "timestamp": msg.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{MemoryLogSink, MemoryMetricsSink, RecordingInvoker};
    use crate::types::{Action, Rule};
    use crate::utils::Template;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rule(name: &str, filter: &str, actions: Vec<Action>) -> Rule {
        Rule {
            name: name.to_string(),
            description: None,
            sql: None,
            topic_filter: Some(filter.to_string()),
            enabled: true,
            actions,
            error_action: ErrorAction::WriteLog {
                destination: "errors".to_string(),
            },
        }
    }

    fn log(destination: &str) -> Action {
        Action::WriteLog {
            destination: destination.to_string(),
        }
    }

    #[tokio::test]
    async fn routes_to_all_matching_rules_in_order() {
        let logs = Arc::new(MemoryLogSink::new());
        let router = TopicRouter::builder(RuleSet {
            rules: vec![
                rule("wide", "a/#", vec![log("wide")]),
                rule("narrow", "a/+/c", vec![log("narrow")]),
                rule("other", "b/#", vec![log("other")]),
            ],
        })
        .log_sink(logs.clone())
        .build()
        .unwrap();

        let report = router.route(Message::new("a/b/c", json!({})).unwrap()).await.unwrap();

        assert_eq!(report.matched_rules(), vec!["wide", "narrow"]);
        assert_eq!(logs.records_for("wide").await.len(), 1);
        assert_eq!(logs.records_for("narrow").await.len(), 1);
        assert!(logs.records_for("other").await.is_empty());
    }

    #[tokio::test]
    async fn failed_error_action_is_reported() {
        let logs = Arc::new(MemoryLogSink::failing_on(&["errors"]));
        let invoker = Arc::new(RecordingInvoker::unreachable(&["notify"]));
        let router = TopicRouter::builder(RuleSet {
            rules: vec![rule(
                "r",
                "a/#",
                vec![
                    Action::Invoke {
                        target: "notify".to_string(),
                    },
                    log("ok"),
                ],
            )],
        })
        .log_sink(logs.clone())
        .invoker(invoker)
        .build()
        .unwrap();

        let report = router.route(Message::new("a/b", json!({})).unwrap()).await.unwrap();
        let actions = &report.rule("r").unwrap().actions;

        match &actions[0].status {
            ActionStatus::Failed { error_action, .. } => {
                assert!(matches!(error_action, ErrorActionStatus::Failed(_)))
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(actions[1].succeeded());
        assert_eq!(logs.records_for("ok").await.len(), 1);
    }

    #[tokio::test]
    async fn where_clause_filters_messages() {
        let metrics = Arc::new(MemoryMetricsSink::new());
        let mut heavy = rule(
            "heavy",
            "unused",
            vec![Action::EmitMetric {
                namespace: "N".to_string(),
                name: Template::parse("w").unwrap(),
                value: Template::parse("${weight}").unwrap(),
                unit: Default::default(),
                timestamp: None,
            }],
        );
        heavy.topic_filter = None;
        heavy.sql = Some("SELECT weight FROM 'scale/+' WHERE weight > 1000".to_string());

        let router = TopicRouter::builder(RuleSet { rules: vec![heavy] })
            .metrics_sink(metrics.clone())
            .build()
            .unwrap();

        let light = router
            .route(Message::new("scale/1", json!({"weight": 10})).unwrap())
            .await
            .unwrap();
        assert!(light.is_empty());

        let report = router
            .route(Message::new("scale/1", json!({"weight": 4200})).unwrap())
            .await
            .unwrap();
        assert_eq!(report.matched_rules(), vec!["heavy"]);
        assert_eq!(metrics.metrics().await[0].value, 4200.0);
    }

    #[derive(Default)]
    struct Counting {
        before: AtomicUsize,
        errors: AtomicUsize,
    }

    #[async_trait]
    impl ActionInterceptor for Counting {
        async fn before<'a>(&self, _ctx: &ActionContext<'a>) -> Result<(), RuleError> {
            self.before.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn after<'a>(&self, _ctx: &ActionContext<'a>) -> Result<(), RuleError> {
            Ok(())
        }

        async fn error<'a>(&self, _ctx: &ActionContext<'a>, _e: &RuleError) -> Result<(), RuleError> {
            self.errors.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Reject;

    #[async_trait]
    impl MessageInterceptor for Reject {
        async fn before_route(&self, msg: &Message) -> Result<(), RuleError> {
            Err(RuleError::Intercepted(msg.topic.clone()))
        }

        async fn after_route(&self, _msg: &Message, _matched: &[String]) -> Result<(), RuleError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn interceptors_observe_actions() {
        let counting = Arc::new(Counting::default());
        let router = TopicRouter::builder(RuleSet {
            rules: vec![rule(
                "r",
                "a/#",
                vec![
                    log("ok"),
                    Action::Invoke {
                        target: "down".to_string(),
                    },
                ],
            )],
        })
        .log_sink(Arc::new(MemoryLogSink::new()))
        .invoker(Arc::new(RecordingInvoker::unreachable(&["down"])))
        .action_interceptor(counting.clone())
        .build()
        .unwrap();

        router.route(Message::new("a/b", json!({})).unwrap()).await.unwrap();

        assert_eq!(counting.before.load(Ordering::SeqCst), 2);
        assert_eq!(counting.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn message_interceptor_can_abort() {
        let logs = Arc::new(MemoryLogSink::new());
        let router = TopicRouter::builder(RuleSet {
            rules: vec![rule("r", "a/#", vec![log("ok")])],
        })
        .log_sink(logs.clone())
        .msg_interceptor(Arc::new(Reject))
        .build()
        .unwrap();

        let err = router.route(Message::new("a/b", json!({})).unwrap()).await.unwrap_err();
        assert!(matches!(err, RuleError::Intercepted(_)));
        assert!(logs.records().await.is_empty());
    }

    struct FailingAfter;

    #[async_trait]
    impl ActionInterceptor for FailingAfter {
        async fn before<'a>(&self, _ctx: &ActionContext<'a>) -> Result<(), RuleError> {
            Ok(())
        }

        async fn after<'a>(&self, ctx: &ActionContext<'a>) -> Result<(), RuleError> {
            Err(RuleError::Intercepted(format!("{}#{}", ctx.rule, ctx.index)))
        }

        async fn error<'a>(&self, _ctx: &ActionContext<'a>, _e: &RuleError) -> Result<(), RuleError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_siblings_are_logged_before_interceptor_aborts() {
        let logs = Arc::new(MemoryLogSink::new());
        let router = TopicRouter::builder(RuleSet {
            rules: vec![rule(
                "r",
                "a/#",
                vec![
                    log("ok"),
                    Action::Invoke {
                        target: "down".to_string(),
                    },
                ],
            )],
        })
        .log_sink(logs.clone())
        .invoker(Arc::new(RecordingInvoker::unreachable(&["down"])))
        .action_interceptor(Arc::new(FailingAfter))
        .build()
        .unwrap();

        let err = router.route(Message::new("a/b", json!({})).unwrap()).await.unwrap_err();
        assert!(matches!(err, RuleError::Intercepted(ref at) if at == "r#0"));

        let errors = logs.records_for("errors").await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["action_index"], json!(1));
        assert_eq!(errors[0]["action_type"], json!("invoke"));
    }
}
