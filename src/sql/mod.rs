//! 规则语句解析
//!
//! ```text
//! SELECT *, topic(3) as device FROM 'catsensor/weight_data/#' WHERE weight > 1000
//! ```

use crate::topic::{topic_segment, TopicFilter};
use crate::types::{Message, RuleError};
use crate::utils::{as_number, lookup_path};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*`
    All,
    Field { path: String, alias: String },
    Topic { index: i64, alias: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Topic(i64),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Operand,
    pub op: CompareOp,
    pub right: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleStatement {
    pub projections: Vec<Projection>,
    pub filter: TopicFilter,
    /// WHERE 子句, 各条件之间为 AND
    pub conditions: Vec<Comparison>,
}

impl RuleStatement {
    pub fn parse(sql: &str) -> Result<Self, RuleError> {
        let tokens = tokenize(sql)?;
        Parser { tokens, pos: 0 }.statement()
    }

    /// 等价于 `SELECT * FROM '<filter>'`
    pub fn select_all(filter: TopicFilter) -> Self {
        Self {
            projections: vec![Projection::All],
            filter,
            conditions: Vec::new(),
        }
    }

    /// 对消息执行 SELECT 投影, 无法取值的字段被省略
    pub fn project(&self, msg: &Message) -> Map<String, Value> {
        let mut record = Map::new();

        for projection in &self.projections {
            match projection {
                Projection::All => {
                    for (k, v) in &msg.payload {
                        record.insert(k.clone(), v.clone());
                    }
                }
                Projection::Field { path, alias } => {
                    if let Some(value) = lookup_path(&msg.payload, path) {
                        record.insert(alias.clone(), value.clone());
                    }
                }
                Projection::Topic { index, alias } => {
                    if let Some(segment) = topic_segment(&msg.topic, *index) {
                        record.insert(alias.clone(), Value::String(segment.to_string()));
                    }
                }
            }
        }

        record
    }

    /// 评估 WHERE 条件, 无法解析的操作数视为不满足
    pub fn evaluate(&self, msg: &Message) -> bool {
        self.conditions.iter().all(|cond| {
            let (Some(left), Some(right)) = (cond.left.resolve(msg), cond.right.resolve(msg)) else {
                debug!("条件操作数无法解析, 视为不满足: {:?}", cond);
                return false;
            };
            compare(&left, cond.op, &right)
        })
    }
}

impl Operand {
    fn resolve(&self, msg: &Message) -> Option<Value> {
        match self {
            Operand::Field(path) => lookup_path(&msg.payload, path).cloned(),
            Operand::Topic(index) => {
                topic_segment(&msg.topic, *index).map(|s| Value::String(s.to_string()))
            }
            Operand::Literal(value) => Some(value.clone()),
        }
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    match (op, ordering) {
        (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
        (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
        (CompareOp::Ne, None) => true,
        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
        (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Star,
    Comma,
    LParen,
    RParen,
    Op(CompareOp),
}

fn tokenize(sql: &str) -> Result<Vec<Token>, RuleError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '\'')
                    .map(|p| start + p)
                    .ok_or_else(|| RuleError::InvalidStatement(format!("字符串未闭合: {}", sql)))?;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '=' => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '<' => {
                let op = match chars.get(i + 1) {
                    Some('=') => CompareOp::Le,
                    Some('>') => CompareOp::Ne,
                    _ => CompareOp::Lt,
                };
                i += if op == CompareOp::Lt { 1 } else { 2 };
                tokens.push(Token::Op(op));
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CompareOp::Gt));
                    i += 1;
                }
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| RuleError::InvalidStatement(format!("无效的数字: {}", text)))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(RuleError::InvalidStatement(format!(
                    "无法识别的字符 '{}': {}",
                    other, sql
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, what: &str) -> RuleError {
        RuleError::InvalidStatement(format!("{} (位置 {}: {:?})", what, self.pos, self.peek()))
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), RuleError> {
        if self.is_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("缺少关键字 {}", keyword)))
        }
    }

    fn statement(mut self) -> Result<RuleStatement, RuleError> {
        self.expect_keyword("SELECT")?;

        let mut projections = vec![self.projection()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            projections.push(self.projection()?);
        }

        self.expect_keyword("FROM")?;
        let filter = match self.next() {
            Some(Token::Str(filter)) => TopicFilter::parse(&filter)?,
            _ => return Err(self.error("FROM 后需要带引号的主题过滤器")),
        };

        let mut conditions = Vec::new();
        if self.is_keyword("WHERE") {
            self.pos += 1;
            conditions.push(self.comparison()?);
            while self.is_keyword("AND") {
                self.pos += 1;
                conditions.push(self.comparison()?);
            }
        }

        if self.peek().is_some() {
            return Err(self.error("语句末尾存在多余内容"));
        }

        Ok(RuleStatement {
            projections,
            filter,
            conditions,
        })
    }

    fn projection(&mut self) -> Result<Projection, RuleError> {
        match self.next() {
            Some(Token::Star) => Ok(Projection::All),
            Some(Token::Ident(name)) if name.eq_ignore_ascii_case("topic") => {
                let index = self.topic_args()?;
                let alias = self.alias()?.unwrap_or_else(|| "topic".to_string());
                Ok(Projection::Topic { index, alias })
            }
            Some(Token::Ident(path)) => {
                let alias = match self.alias()? {
                    Some(alias) => alias,
                    None => path.rsplit('.').next().unwrap_or(&path).to_string(),
                };
                Ok(Projection::Field { path, alias })
            }
            _ => Err(self.error("无效的 SELECT 投影")),
        }
    }

    fn topic_args(&mut self) -> Result<i64, RuleError> {
        if self.next() != Some(Token::LParen) {
            return Err(self.error("topic 后需要 '('"));
        }
        let index = match self.peek() {
            Some(Token::RParen) => 0,
            Some(Token::Number(n)) if n.fract() == 0.0 => {
                let n = *n as i64;
                self.pos += 1;
                n
            }
            _ => return Err(self.error("topic() 参数必须是整数")),
        };
        if self.next() != Some(Token::RParen) {
            return Err(self.error("topic() 缺少 ')'"));
        }
        Ok(index)
    }

    fn alias(&mut self) -> Result<Option<String>, RuleError> {
        if self.is_keyword("AS") {
            self.pos += 1;
            return match self.next() {
                Some(Token::Ident(alias)) => Ok(Some(alias)),
                _ => Err(self.error("AS 后需要别名")),
            };
        }
        // 省略 AS 的别名, 例如 `topic(3) device`
        match self.peek() {
            Some(Token::Ident(word))
                if !word.eq_ignore_ascii_case("FROM") && !word.eq_ignore_ascii_case("AS") =>
            {
                let alias = word.clone();
                self.pos += 1;
                Ok(Some(alias))
            }
            _ => Ok(None),
        }
    }

    fn comparison(&mut self) -> Result<Comparison, RuleError> {
        let left = self.operand()?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error("缺少比较运算符")),
        };
        let right = self.operand()?;
        Ok(Comparison { left, op, right })
    }

    fn operand(&mut self) -> Result<Operand, RuleError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::String(s))),
            Some(Token::Number(n)) => Ok(Operand::Literal(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("true") => {
                Ok(Operand::Literal(Value::Bool(true)))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("false") => {
                Ok(Operand::Literal(Value::Bool(false)))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("topic") => {
                Ok(Operand::Topic(self.topic_args()?))
            }
            Some(Token::Ident(path)) => Ok(Operand::Field(path)),
            _ => Err(self.error("无效的条件操作数")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_weight_rule() {
        let stmt = RuleStatement::parse("SELECT *, topic(3) as device FROM 'catsensor/weight_data/#'").unwrap();
        assert_eq!(
            stmt.projections,
            vec![
                Projection::All,
                Projection::Topic {
                    index: 3,
                    alias: "device".to_string()
                }
            ]
        );
        assert_eq!(stmt.filter.as_str(), "catsensor/weight_data/#");
        assert!(stmt.conditions.is_empty());
    }

    #[test]
    fn projects_device_segment() {
        let stmt = RuleStatement::parse("SELECT *, topic(3) as device FROM 'catsensor/weight_data/#'").unwrap();
        let msg = Message::new("catsensor/weight_data/WeightMonitor", json!({"weight": 4200})).unwrap();
        let record = stmt.project(&msg);

        assert_eq!(record["weight"], json!(4200));
        assert_eq!(record["device"], json!("WeightMonitor"));
    }

    #[test]
    fn field_projection_without_star() {
        let stmt = RuleStatement::parse("select state.weight as w, device from 'a/+'").unwrap();
        let msg = Message::new("a/b", json!({"state": {"weight": 1}, "extra": true})).unwrap();
        let record = stmt.project(&msg);

        assert_eq!(record.get("w"), Some(&json!(1)));
        assert_eq!(record.get("extra"), None);
        // 缺失字段直接省略
        assert_eq!(record.get("device"), None);
    }

    #[test]
    fn where_clause() {
        let stmt = RuleStatement::parse(
            "SELECT * FROM 'catsensor/weight_data/#' WHERE weight >= 1000 AND topic(3) <> 'test'",
        )
        .unwrap();
        assert_eq!(stmt.conditions.len(), 2);

        let heavy = Message::new("catsensor/weight_data/dev", json!({"weight": 4200})).unwrap();
        let light = Message::new("catsensor/weight_data/dev", json!({"weight": 12})).unwrap();
        let test_dev = Message::new("catsensor/weight_data/test", json!({"weight": 4200})).unwrap();
        let missing = Message::new("catsensor/weight_data/dev", json!({})).unwrap();

        assert!(stmt.evaluate(&heavy));
        assert!(!stmt.evaluate(&light));
        assert!(!stmt.evaluate(&test_dev));
        assert!(!stmt.evaluate(&missing));
    }

    #[test]
    fn string_and_bool_literals() {
        let stmt = RuleStatement::parse("SELECT * FROM '#' WHERE eventType = 'connected' AND ok != false").unwrap();
        let msg = Message::new("x/y", json!({"eventType": "connected", "ok": true})).unwrap();
        assert!(stmt.evaluate(&msg));
    }

    #[test]
    fn rejects_invalid_statements() {
        assert!(RuleStatement::parse("SELECT * 'a/b'").is_err());
        assert!(RuleStatement::parse("SELECT * FROM a/b").is_err());
        assert!(RuleStatement::parse("SELECT * FROM 'a/#/b'").is_err());
        assert!(RuleStatement::parse("SELECT * FROM 'a/b' WHERE x").is_err());
        assert!(RuleStatement::parse("SELECT * FROM 'a/b").is_err());
        assert!(RuleStatement::parse("SELECT topic(x) FROM 'a/b'").is_err());
    }
}
