use serde::Serialize;
use uuid::Uuid;

/// 单条消息的路由结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingReport {
    pub message_id: Uuid,
    pub topic: String,
    pub rules: Vec<RuleOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule: String,
    /// 与规则中的动作顺序一致
    pub actions: Vec<ActionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub index: usize,
    pub action_type: &'static str,
    pub status: ActionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed {
        cause: String,
        error_action: ErrorActionStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorActionStatus {
    Logged,
    Failed(String),
}

impl RoutingReport {
    pub fn new(message_id: Uuid, topic: &str) -> Self {
        Self {
            message_id,
            topic: topic.to_string(),
            rules: Vec::new(),
        }
    }

    /// 没有命中任何规则
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn matched_rules(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.rule.as_str()).collect()
    }

    pub fn rule(&self, name: &str) -> Option<&RuleOutcome> {
        self.rules.iter().find(|r| r.rule == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ActionOutcome)> {
        self.rules.iter().flat_map(|r| {
            r.actions
                .iter()
                .filter(|a| !a.succeeded())
                .map(move |a| (r.rule.as_str(), a))
        })
    }
}

impl ActionOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, ActionStatus::Succeeded)
    }
}
