//! 条件评估器
//!
//! 递归评估条件树：叶子节点通过 Almanac 解析事实值并调用操作符，
//! ALL/ANY 组合节点按顺序短路求值。

use crate::almanac::Almanac;
use crate::error::{Result, RuleError};
use crate::models::{Condition, LeafCondition};
use crate::operators::OperatorRegistry;
use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件树
    ///
    /// 被短路跳过的子节点不会触发任何事实计算，因此不会在缓存中留下
    /// 未完成的计算。事实未定义、操作符缺失等错误原样向上传播。
    pub fn evaluate<'a>(
        condition: &'a Condition,
        almanac: &'a Almanac,
        operators: &'a OperatorRegistry,
    ) -> BoxFuture<'a, Result<bool>> {
        async move {
            match condition {
                Condition::Leaf(leaf) => Self::evaluate_leaf(leaf, almanac, operators).await,
                Condition::All(children) => {
                    // ALL: 遇到 false 立即返回
                    for child in children {
                        if !Self::evaluate(child, almanac, operators).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Condition::Any(children) => {
                    // ANY: 遇到 true 立即返回
                    for child in children {
                        if Self::evaluate(child, almanac, operators).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        }
        .boxed()
    }

    async fn evaluate_leaf(
        leaf: &LeafCondition,
        almanac: &Almanac,
        operators: &OperatorRegistry,
    ) -> Result<bool> {
        let operator = operators
            .lookup(&leaf.operator)
            .ok_or_else(|| RuleError::MissingOperator(leaf.operator.clone()))?;

        let fact_value = almanac
            .fact_value_at(&leaf.fact, leaf.params.as_ref(), leaf.path.as_deref())
            .await?;

        if !operator.validate(fact_value.as_ref()) {
            debug!(
                fact = %leaf.fact,
                operator = %leaf.operator,
                "condition::evaluate validator rejected fact value"
            );
            return Ok(false);
        }

        let matched = operator.evaluate(fact_value.as_ref(), &leaf.value)?;
        debug!(
            fact = %leaf.fact,
            fact_value = ?fact_value,
            operator = %leaf.operator,
            value = %leaf.value,
            matched,
            "condition::evaluate"
        );
        Ok(matched)
    }
}
