use crate::types::{Action, ErrorAction, MetricUnit, Rule, RuleError, RuleSet};
use crate::utils::Template;

pub const CAT_SENSOR_NAMESPACE: &str = "CatSensor";
pub const NOTIFY_FUNCTION: &str = "LineNotifyFunction";
pub const STATUS_LOG_GROUP: &str = "IoTStatusRuleActionLogGroup";
pub const ERROR_LOG_GROUP: &str = "IoTRuleErrorActionLogGroup";

pub const WEIGHT_RULE: &str = "CatSensorRule";
pub const CONNECTION_RULE: &str = "CatSensorConnectionRule";
pub const STATUS_RULE: &str = "CatSensorStatusRule";

fn error_action() -> ErrorAction {
    ErrorAction::WriteLog {
        destination: ERROR_LOG_GROUP.to_string(),
    }
}

impl RuleSet {
    /// 猫体重计的规则集
    ///
    /// - 体重数据: 写入指标并发送通知
    /// - 上下线事件: 发送通知, 默认禁用
    /// - 设备状态: 写入状态日志组
    pub fn cat_sensor() -> Result<Self, RuleError> {
        let weight = Rule {
            name: WEIGHT_RULE.to_string(),
            description: Some("体重数据写入指标并通知".to_string()),
            sql: Some("SELECT *, topic(3) as device FROM 'catsensor/weight_data/#'".to_string()),
            topic_filter: None,
            enabled: true,
            actions: vec![
                Action::EmitMetric {
                    namespace: CAT_SENSOR_NAMESPACE.to_string(),
                    name: Template::parse("${topic(-1)}/weight")?,
                    value: Template::parse("${weight}")?,
                    unit: MetricUnit::None,
                    timestamp: None,
                },
                Action::Invoke {
                    target: NOTIFY_FUNCTION.to_string(),
                },
            ],
            error_action: error_action(),
        };

        let connection = Rule {
            name: CONNECTION_RULE.to_string(),
            description: Some("设备上下线通知".to_string()),
            sql: Some("SELECT * FROM '$aws/events/presence/+/WeightMonitor'".to_string()),
            topic_filter: None,
            enabled: false,
            actions: vec![Action::Invoke {
                target: NOTIFY_FUNCTION.to_string(),
            }],
            error_action: error_action(),
        };

        let status = Rule {
            name: STATUS_RULE.to_string(),
            description: Some("设备状态写入日志".to_string()),
            sql: Some("SELECT *, topic(3) as device FROM 'catsensor/status/#'".to_string()),
            topic_filter: None,
            enabled: true,
            actions: vec![Action::WriteLog {
                destination: STATUS_LOG_GROUP.to_string(),
            }],
            error_action: error_action(),
        };

        Ok(Self {
            rules: vec![weight, connection, status],
        })
    }
}
