//! 规则操作符定义
//!
//! 操作符是条件叶子节点中使用的具名二元谓词，通过 `OperatorRegistry`
//! 注入到评估器中，支持运行时按名称增删。

use crate::error::{Result, RuleError};
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type EvaluateFn = dyn Fn(Option<&Value>, &Value) -> Result<bool> + Send + Sync;
type ValidateFn = dyn Fn(&Value) -> bool + Send + Sync;

/// 条件操作符
///
/// `evaluate` 的第一个参数为事实值，`None` 表示事实未定义（仅在引擎
/// 允许未定义事实时出现）；第二个参数为条件中声明的比较值。
#[derive(Clone)]
pub struct Operator {
    name: String,
    evaluate: Arc<EvaluateFn>,
    validate: Option<Arc<ValidateFn>>,
}

impl Operator {
    /// 创建操作符，事实未定义时结果为 false
    pub fn new<F>(name: impl Into<String>, evaluate: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        Self::with_absent(name, move |fact, expected| {
            Ok(fact.is_some_and(|f| evaluate(f, expected)))
        })
    }

    /// 创建可能失败的操作符，错误会中止整条规则的评估
    pub fn fallible<F>(name: impl Into<String>, evaluate: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<bool> + Send + Sync + 'static,
    {
        Self::with_absent(name, move |fact, expected| match fact {
            Some(f) => evaluate(f, expected),
            None => Ok(false),
        })
    }

    /// 创建能自行处理未定义事实的操作符
    pub fn with_absent<F>(name: impl Into<String>, evaluate: F) -> Self
    where
        F: Fn(Option<&Value>, &Value) -> Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            evaluate: Arc::new(evaluate),
            validate: None,
        }
    }

    /// 附加事实值校验器，校验失败时叶子节点直接判定为 false
    pub fn with_validator<V>(mut self, validate: V) -> Self
    where
        V: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_validator(&self) -> bool {
        self.validate.is_some()
    }

    /// 校验事实值；没有校验器时总是通过，未定义的事实无法通过任何校验器
    pub fn validate(&self, fact: Option<&Value>) -> bool {
        match (&self.validate, fact) {
            (None, _) => true,
            (Some(validate), Some(value)) => validate(value),
            (Some(_), None) => false,
        }
    }

    pub fn evaluate(&self, fact: Option<&Value>, expected: &Value) -> Result<bool> {
        (self.evaluate)(fact, expected)
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("has_validator", &self.has_validator())
            .finish()
    }
}

impl AsRef<str> for Operator {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// 操作符注册表
///
/// 使用 DashMap 保存，引擎与所有规则共享同一份注册表。
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    operators: Arc<DashMap<String, Operator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建包含默认操作符的注册表
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for operator in default_operators() {
            registry.register(operator);
        }
        registry
    }

    /// 注册操作符，同名操作符会被覆盖并返回旧值
    pub fn register(&self, operator: Operator) -> Option<Operator> {
        self.operators.insert(operator.name.clone(), operator)
    }

    /// 按名称（或操作符本身）移除，不存在时返回 false
    pub fn unregister(&self, name: impl AsRef<str>) -> bool {
        self.operators.remove(name.as_ref()).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<Operator> {
        self.operators.get(name).map(|op| op.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.operators.iter().map(|op| op.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// 引擎默认注册的操作符集合
pub fn default_operators() -> Vec<Operator> {
    vec![
        Operator::new("equal", strict_eq),
        Operator::with_absent("notEqual", |fact, expected| {
            Ok(!fact.is_some_and(|f| strict_eq(f, expected)))
        }),
        Operator::fallible("in", |fact, expected| in_list("in", fact, expected)),
        Operator::with_absent("notIn", |fact, expected| match fact {
            Some(f) => in_list("notIn", f, expected).map(|found| !found),
            None => Ok(true),
        }),
        Operator::new("contains", |fact, expected| array_contains(fact, expected))
            .with_validator(Value::is_array),
        Operator::new("doesNotContain", |fact, expected| {
            !array_contains(fact, expected)
        })
        .with_validator(Value::is_array),
        numeric("lessThan", |a, b| a < b),
        numeric("lessThanInclusive", |a, b| a <= b),
        numeric("greaterThan", |a, b| a > b),
        numeric("greaterThanInclusive", |a, b| a >= b),
    ]
}

fn numeric(name: &str, cmp: fn(f64, f64) -> bool) -> Operator {
    Operator::new(name, move |fact, expected| {
        match (as_f64(fact), as_f64(expected)) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    })
    .with_validator(|value| as_f64(value).is_some())
}

/// 严格相等：数值统一按浮点比较（100 与 100.0 相等），其余类型直接比较
fn strict_eq(fact: &Value, expected: &Value) -> bool {
    match (fact, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => fact == expected,
    }
}

/// 列表包含检查；比较值为字符串时按子串匹配
fn in_list(operator: &str, fact: &Value, expected: &Value) -> Result<bool> {
    match (fact, expected) {
        (_, Value::Array(items)) => Ok(items.iter().any(|item| strict_eq(fact, item))),
        (Value::String(needle), Value::String(haystack)) => Ok(haystack.contains(needle.as_str())),
        _ => Err(RuleError::operator_failed(
            operator,
            format!("比较值需要数组, 实际为 {}", type_name(expected)),
        )),
    }
}

fn array_contains(fact: &Value, expected: &Value) -> bool {
    fact.as_array()
        .is_some_and(|items| items.iter().any(|item| strict_eq(item, expected)))
}

/// 数值或可解析为数值的字符串
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
