use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("无效的主题过滤器 '{filter}': {reason}")]
    InvalidTopicFilter { filter: String, reason: String },

    #[error("规则语句解析失败: {0}")]
    InvalidStatement(String),

    #[error("规则名称重复: {0}")]
    DuplicateRule(String),

    /// 消息缺少动作所需的字段, 或字段类型不符
    #[error("消息格式错误: {0}")]
    MalformedMessage(String),

    #[error("调用目标未找到: {0}")]
    TargetNotFound(String),

    #[error("规则 {rule} 的第 {index} 个动作执行失败: {cause}")]
    ActionFailure {
        rule: String,
        index: usize,
        cause: String,
    },

    #[error("输出端错误: {0}")]
    Sink(String),

    #[error("拦截器拒绝: {0}")]
    Intercepted(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RuleError {
    /// 动作失败时写入错误记录的类别名
    pub fn kind(&self) -> &'static str {
        match self {
            RuleError::ConfigError(_) => "ConfigError",
            RuleError::InvalidTopicFilter { .. } => "InvalidTopicFilter",
            RuleError::InvalidStatement(_) => "InvalidStatement",
            RuleError::DuplicateRule(_) => "DuplicateRule",
            RuleError::MalformedMessage(_) => "MalformedMessage",
            RuleError::TargetNotFound(_) => "TargetNotFound",
            RuleError::ActionFailure { .. } => "ActionFailure",
            RuleError::Sink(_) => "Sink",
            RuleError::Intercepted(_) => "Intercepted",
            RuleError::Io(_) => "Io",
        }
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(e: serde_json::Error) -> Self {
        RuleError::ConfigError(e.to_string())
    }
}
