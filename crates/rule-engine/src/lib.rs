//! 事实规则引擎
//!
//! 针对一组具名事实评估可组合的布尔规则，并为命中的规则触发事件：
//! - 事实可以是常量，也可以是按需（异步）计算、在单次运行内缓存的值
//! - 条件树由叶子比较与嵌套的 ALL/ANY 组合构成
//! - 规则按优先级分组，组内并发评估，组间串行
//! - 通过订阅 `success` / `failure` / 事件类型通道接收通知

pub mod almanac;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod fact;
pub mod listeners;
pub mod models;
pub mod operators;
pub mod rule;
pub mod rule_result;

pub use almanac::{Almanac, AlmanacOptions, SUCCESS_EVENTS_FACT};
pub use config::EngineOptions;
pub use engine::{Engine, EngineStatus, StopHandle, Tier};
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use fact::{Fact, FactCompute, FactOptions};
pub use listeners::{Channel, Notification, SubscriptionId};
pub use models::{Condition, LeafCondition, RuleEvent};
pub use operators::{Operator, OperatorRegistry};
pub use rule::Rule;
pub use rule_result::RuleResult;
