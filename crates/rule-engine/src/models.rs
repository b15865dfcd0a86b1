//! 规则引擎领域模型
//!
//! 条件树使用与 JSON 文档一一对应的结构：
//! `{"all": [...]}`、`{"any": [...]}` 或叶子 `{"fact", "operator", "value", "params"?, "path"?}`。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 条件节点（叶子比较或 ALL/ANY 组合）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition", into = "RawCondition")]
pub enum Condition {
    Leaf(LeafCondition),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn all(children: Vec<Condition>) -> Self {
        Self::All(children)
    }

    pub fn any(children: Vec<Condition>) -> Self {
        Self::Any(children)
    }

    pub fn leaf(fact: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Leaf(LeafCondition::new(fact, operator, value))
    }

    pub fn is_combinator(&self) -> bool {
        !matches!(self, Self::Leaf(_))
    }

    /// 递归校验结构：组合节点不能为空
    pub fn validate(&self, path: &str) -> Result<(), String> {
        match self {
            Self::Leaf(leaf) => {
                if leaf.fact.is_empty() {
                    return Err(format!("条件 '{}' 的 fact 不能为空", path));
                }
                if leaf.operator.is_empty() {
                    return Err(format!("条件 '{}' 的 operator 不能为空", path));
                }
                Ok(())
            }
            Self::All(children) | Self::Any(children) => {
                if children.is_empty() {
                    return Err(format!("逻辑组 '{}' 不能为空", path));
                }
                for (i, child) in children.iter().enumerate() {
                    child.validate(&format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
        }
    }

    /// 条件树中引用的所有事实 ID（按出现顺序，去重）
    pub fn referenced_facts(&self) -> Vec<&str> {
        let mut facts = Vec::new();
        self.collect_facts(&mut facts);
        facts
    }

    fn collect_facts<'a>(&'a self, facts: &mut Vec<&'a str>) {
        match self {
            Self::Leaf(leaf) => {
                if !facts.contains(&leaf.fact.as_str()) {
                    facts.push(&leaf.fact);
                }
            }
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect_facts(facts);
                }
            }
        }
    }
}

/// 叶子条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafCondition {
    pub fact: String,
    pub operator: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl LeafCondition {
    pub fn new(fact: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            fact: fact.into(),
            operator: operator.into(),
            value: value.into(),
            params: None,
            path: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<LeafCondition> for Condition {
    fn from(leaf: LeafCondition) -> Self {
        Self::Leaf(leaf)
    }
}

/// 条件的 JSON 文档形态，反序列化后再校验只能出现一种节点
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    all: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    any: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operator: Option<String>,
    /// 显式的 `null` 为 `Some(Value::Null)`，缺少该键才是 `None`
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<RawCondition> for Condition {
    type Error = String;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        let is_leaf = raw.fact.is_some() || raw.operator.is_some();
        match (raw.all, raw.any, is_leaf) {
            (Some(all), None, false) => Ok(Self::All(all)),
            (None, Some(any), false) => Ok(Self::Any(any)),
            (None, None, true) => {
                let fact = raw.fact.ok_or("叶子条件缺少 fact")?;
                let operator = raw.operator.ok_or("叶子条件缺少 operator")?;
                let value = raw
                    .value
                    .ok_or_else(|| format!("叶子条件 '{}' 缺少 value", fact))?;
                Ok(Self::Leaf(LeafCondition {
                    fact,
                    operator,
                    value,
                    params: raw.params,
                    path: raw.path,
                }))
            }
            (None, None, false) => Err("条件必须包含 all、any 或 fact".to_string()),
            _ => Err("条件只能是 all、any、叶子中的一种".to_string()),
        }
    }
}

impl From<Condition> for RawCondition {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::All(children) => Self {
                all: Some(children),
                ..Default::default()
            },
            Condition::Any(children) => Self {
                any: Some(children),
                ..Default::default()
            },
            Condition::Leaf(leaf) => Self {
                fact: Some(leaf.fact),
                operator: Some(leaf.operator),
                value: Some(leaf.value),
                params: leaf.params,
                path: leaf.path,
                ..Default::default()
            },
        }
    }
}

/// 规则命中时触发的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RuleEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// 按路径读取值（支持 `$.user.name`、`.user.name`、`items.0.name` 等形式）
pub fn select_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let trimmed = path.trim_start_matches('$').trim_start_matches('.');
    if trimmed.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for part in trimmed.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part)?;
            }
            Value::Array(arr) => {
                // 支持数组索引访问，如 "items.0.name"
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}
