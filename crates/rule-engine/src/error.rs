//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("无效的规则定义: {0}")]
    InvalidRuleDefinition(String),

    #[error("无效的操作符注册: {0}")]
    InvalidOperatorRegistration(String),

    #[error("事实未定义: {0}")]
    UndefinedFact(String),

    #[error("操作符未注册: {0}")]
    MissingOperator(String),

    #[error("规则未绑定引擎")]
    NoEngine,

    #[error("引擎状态无效: 当前 {current}, 期望 {expected}")]
    InvalidState { current: String, expected: String },

    #[error("事实计算失败: {fact} - {message}")]
    FactComputation { fact: String, message: String },

    #[error("操作符执行失败: {operator} - {message}")]
    OperatorFailed { operator: String, message: String },

    #[error("规则执行失败: {0}")]
    ExecutionError(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    /// 事实计算过程中的业务错误
    pub fn fact_computation(fact: impl Into<String>, message: impl ToString) -> Self {
        Self::FactComputation {
            fact: fact.into(),
            message: message.to_string(),
        }
    }

    /// 操作符实现返回的错误
    pub fn operator_failed(operator: impl Into<String>, message: impl ToString) -> Self {
        Self::OperatorFailed {
            operator: operator.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
