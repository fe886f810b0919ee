use super::*;
use serde_json::{Map, Value};

/// 单个动作执行时可见的上下文
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub rule: &'a str,
    pub index: usize,
    pub msg: &'a Message,
    /// SELECT 投影后的记录
    pub record: &'a Map<String, Value>,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        rule: &'a str,
        index: usize,
        msg: &'a Message,
        record: &'a Map<String, Value>,
    ) -> Self {
        Self {
            rule,
            index,
            msg,
            record,
        }
    }

    pub fn topic(&self) -> &'a str {
        &self.msg.topic
    }
}
