//! 规则评估结果
//!
//! 创建时深拷贝规则的条件树、事件和优先级，之后修改规则不会影响
//! 已经返回的结果。

use crate::error::Result;
use crate::models::{Condition, RuleEvent};
use crate::rule::Rule;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    conditions: Condition,
    event: RuleEvent,
    priority: u32,
    result: Option<bool>,
}

impl RuleResult {
    pub fn new(rule: &Rule) -> Self {
        Self {
            name: rule.name().map(str::to_string),
            conditions: rule.conditions().clone(),
            event: rule.event().clone(),
            priority: rule.priority(),
            result: None,
        }
    }

    pub(crate) fn set_result(&mut self, result: bool) {
        self.result = Some(result);
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn conditions(&self) -> &Condition {
        &self.conditions
    }

    pub fn event(&self) -> &RuleEvent {
        &self.event
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// 评估结论；评估完成前为 `None`
    pub fn result(&self) -> Option<bool> {
        self.result
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
