use iot_rule_rs::engine::Sinks;
use iot_rule_rs::sinks::{MemoryLogSink, MemoryMetricsSink, RecordingInvoker};
use iot_rule_rs::{Message, RouterConfig, RuleSet, TopicRouter};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let metrics = Arc::new(MemoryMetricsSink::new());
    let logs = Arc::new(MemoryLogSink::new());
    let invoker = Arc::new(RecordingInvoker::new());
    let sinks = Sinks {
        metrics: metrics.clone(),
        logs: logs.clone(),
        invoker: invoker.clone(),
    };

    // 传入配置文件时使用文件中的规则, 否则使用内置规则集
    let router = match std::env::args().nth(1) {
        Some(path) => RouterConfig::from_file(&path).await?.into_router(sinks)?,
        None => TopicRouter::new(RuleSet::cat_sensor()?, sinks)?,
    };
    info!("已加载规则: {:?}", router.rule_names());

    let messages = vec![
        Message::new("catsensor/weight_data/WeightMonitor", json!({"weight": 4200}))?,
        Message::new("catsensor/status/WeightMonitor", json!({"message": "キャリブレーション完了"}))?,
        Message::new(
            "$aws/events/presence/connected/WeightMonitor",
            json!({"eventType": "connected", "clientId": "WeightMonitor"}),
        )?,
        Message::new("catsensor/weight_data/WeightMonitor", json!({"weigth": 4100}))?,
        Message::new("other/unrelated/path", json!({}))?,
    ];

    // 每条消息独立路由
    let mut tasks = Vec::new();
    for msg in messages {
        let router = router.clone();
        tasks.push(tokio::spawn(async move { router.route(msg).await }));
    }

    for task in tasks {
        let report = task.await??;
        info!("{}", serde_json::to_string(&report)?);
    }

    info!("指标: {:?}", metrics.metrics().await);
    info!("日志: {:?}", logs.records().await);
    info!("调用: {:?}", invoker.calls().await);

    Ok(())
}
