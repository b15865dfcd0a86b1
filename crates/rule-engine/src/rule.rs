//! 规则定义
//!
//! 规则由优先级、顶层组合条件和事件组成。规则必须绑定到引擎
//! （使用引擎的操作符注册表）后才能评估。

use crate::almanac::Almanac;
use crate::engine::Engine;
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::models::{Condition, RuleEvent};
use crate::operators::OperatorRegistry;
use crate::rule_result::RuleResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_PRIORITY: u32 = 1;

/// 规则
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    priority: u32,
    conditions: Condition,
    event: RuleEvent,
    #[serde(skip)]
    operators: Option<OperatorRegistry>,
}

/// 规则的 JSON 文档形态
#[derive(Debug, Deserialize)]
struct RuleDefinition {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    priority: Option<PriorityValue>,
    conditions: Condition,
    event: RuleEvent,
}

/// 优先级允许写成数字或数字字符串
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriorityValue {
    Number(i64),
    Text(String),
}

impl PriorityValue {
    fn parse(self) -> Result<u32> {
        let raw = match self {
            Self::Number(n) => n,
            Self::Text(s) => s.trim().parse().map_err(|_| {
                RuleError::InvalidRuleDefinition(format!("priority '{}' 不是整数", s))
            })?,
        };
        u32::try_from(raw)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| RuleError::InvalidRuleDefinition("priority 必须大于 0".to_string()))
    }
}

impl Rule {
    pub fn new(conditions: Condition, event: RuleEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: None,
            priority: DEFAULT_PRIORITY,
            conditions,
            event,
            operators: None,
        }
    }

    /// 从 JSON 字符串解析规则
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| RuleError::InvalidRuleDefinition(e.to_string()))?;
        Self::try_from(value)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn conditions(&self) -> &Condition {
        &self.conditions
    }

    pub fn event(&self) -> &RuleEvent {
        &self.event
    }

    pub fn set_conditions(&mut self, conditions: Condition) {
        self.conditions = conditions;
    }

    pub fn set_event(&mut self, event: RuleEvent) {
        self.event = event;
    }

    /// 绑定到引擎，评估时使用该引擎的操作符注册表
    pub fn set_engine(&mut self, engine: &Engine) {
        self.operators = Some(engine.operators().clone());
    }

    pub fn is_attached(&self) -> bool {
        self.operators.is_some()
    }

    /// 校验规则结构：顶层必须是 ALL/ANY，组合节点不能为空，优先级大于 0
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RuleError::InvalidRuleDefinition("规则 ID 不能为空".to_string()));
        }
        if self.priority == 0 {
            return Err(RuleError::InvalidRuleDefinition("priority 必须大于 0".to_string()));
        }
        if !self.conditions.is_combinator() {
            return Err(RuleError::InvalidRuleDefinition(
                "conditions 顶层必须是 all 或 any".to_string(),
            ));
        }
        if self.event.event_type.is_empty() {
            return Err(RuleError::InvalidRuleDefinition("event.type 不能为空".to_string()));
        }
        self.conditions
            .validate("conditions")
            .map_err(RuleError::InvalidRuleDefinition)
    }

    /// 评估规则
    pub async fn evaluate(&self, almanac: &Almanac) -> Result<RuleResult> {
        let operators = self.operators.as_ref().ok_or(RuleError::NoEngine)?;

        let mut result = RuleResult::new(self);
        let matched = ConditionEvaluator::evaluate(&self.conditions, almanac, operators).await?;
        result.set_result(matched);

        debug!(rule_id = %self.id, priority = self.priority, matched, "rule::evaluate");
        Ok(result)
    }
}

impl TryFrom<Value> for Rule {
    type Error = RuleError;

    fn try_from(value: Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            RuleError::InvalidRuleDefinition("规则定义必须是 JSON 对象".to_string())
        })?;
        for key in ["conditions", "event"] {
            if !object.contains_key(key) {
                return Err(RuleError::InvalidRuleDefinition(format!(
                    "规则定义缺少 \"{}\" 属性",
                    key
                )));
            }
        }

        let definition: RuleDefinition = serde_json::from_value(value)
            .map_err(|e| RuleError::InvalidRuleDefinition(e.to_string()))?;

        let mut rule = Self::new(definition.conditions, definition.event);
        if let Some(id) = definition.id {
            rule.id = id;
        }
        rule.name = definition.name;
        if let Some(priority) = definition.priority {
            rule.priority = priority.parse()?;
        }

        rule.validate()?;
        Ok(rule)
    }
}
