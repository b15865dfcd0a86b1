//! 规则引擎调度器
//!
//! 引擎持有规则集、操作符注册表与事实定义。每次运行：
//! 1. 创建新的 Almanac（事实定义 + 运行时值 + `success-events` 内置事实）
//! 2. 按优先级分组（高优先级在前）
//! 3. 逐组执行：组内规则并发评估，组间严格串行
//! 4. 任一规则出错立即让本次运行失败，已派发的同组规则继续执行完毕

use crate::almanac::{Almanac, success_events_fact};
use crate::config::EngineOptions;
use crate::error::{Result, RuleError};
use crate::fact::Fact;
use crate::listeners::{Channel, Listeners, Notification, SubscriptionId};
use crate::models::RuleEvent;
use crate::operators::{Operator, OperatorRegistry};
use crate::rule::Rule;
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use parking_lot::{Mutex, RwLock};
use rule_shared::observability::metrics::{
    ENGINE_RUN_DURATION_SECONDS, ENGINE_RUNS_TOTAL, RULE_EVALUATIONS_TOTAL,
};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// 引擎状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStatus {
    Ready,
    Running,
    Finished,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "READY"),
            Self::Running => write!(f, "RUNNING"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

/// 同一优先级的规则组
#[derive(Debug, Clone)]
pub struct Tier {
    priority: u32,
    rules: Vec<Arc<Rule>>,
}

impl Tier {
    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }
}

/// 停止句柄
///
/// 只持有引擎状态，可以放进通知回调中而不会形成引用环。
#[derive(Debug, Clone)]
pub struct StopHandle {
    status: Arc<Mutex<EngineStatus>>,
}

impl StopHandle {
    /// 阻止派发后续规则；已经开始评估的规则不受影响
    pub fn stop(&self) {
        *self.status.lock() = EngineStatus::Finished;
    }
}

struct EngineInner {
    rules: RwLock<Vec<Arc<Rule>>>,
    prioritized: RwLock<Option<Arc<Vec<Tier>>>>,
    operators: OperatorRegistry,
    facts: DashMap<String, Fact>,
    status: Arc<Mutex<EngineStatus>>,
    running: AtomicBool,
    listeners: Listeners,
    options: EngineOptions,
}

/// 运行期间占用引擎，结束（包括 future 被丢弃）时释放
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 规则引擎
///
/// 克隆开销很小，所有克隆共享同一份规则集与注册表。
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// 创建引擎并注册默认操作符
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                rules: RwLock::new(Vec::new()),
                prioritized: RwLock::new(None),
                operators: OperatorRegistry::with_defaults(),
                facts: DashMap::new(),
                status: Arc::new(Mutex::new(EngineStatus::Ready)),
                running: AtomicBool::new(false),
                listeners: Listeners::new(),
                options,
            }),
        }
    }

    /// 使用初始规则集创建
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>, options: EngineOptions) -> Result<Self> {
        let engine = Self::with_options(options);
        for rule in rules {
            engine.add_rule(rule)?;
        }
        Ok(engine)
    }

    pub fn options(&self) -> EngineOptions {
        self.inner.options
    }

    pub fn status(&self) -> EngineStatus {
        *self.inner.status.lock()
    }

    // ==================== 规则 ====================

    /// 添加规则，返回规则 ID
    ///
    /// 规则结构在此处同步校验，失败返回 `InvalidRuleDefinition`。
    #[instrument(skip(self, rule), fields(rule_id = %rule.id(), priority = rule.priority()))]
    pub fn add_rule(&self, mut rule: Rule) -> Result<String> {
        rule.validate()?;
        rule.set_engine(self);
        let rule_id = rule.id().to_string();

        let mut rules = self.inner.rules.write();
        rules.push(Arc::new(rule));
        *self.inner.prioritized.write() = None;

        debug!("engine::add_rule");
        Ok(rule_id)
    }

    /// 从 JSON 文档添加规则
    pub fn add_rule_json(&self, definition: Value) -> Result<String> {
        self.add_rule(Rule::try_from(definition)?)
    }

    /// 按 ID 移除规则，不存在时返回 false
    #[instrument(skip(self))]
    pub fn remove_rule(&self, rule_id: &str) -> bool {
        let mut rules = self.inner.rules.write();
        let before = rules.len();
        rules.retain(|rule| rule.id() != rule_id);
        let removed = rules.len() != before;

        if removed {
            *self.inner.prioritized.write() = None;
            debug!("engine::remove_rule");
        }
        removed
    }

    pub fn rules(&self) -> Vec<Arc<Rule>> {
        self.inner.rules.read().clone()
    }

    // ==================== 操作符 ====================

    pub fn operators(&self) -> &OperatorRegistry {
        &self.inner.operators
    }

    /// 注册操作符，同名覆盖
    pub fn add_operator(&self, operator: Operator) -> Result<()> {
        if operator.name().is_empty() {
            return Err(RuleError::InvalidOperatorRegistration(
                "操作符名称不能为空".to_string(),
            ));
        }
        debug!(operator = %operator.name(), "engine::add_operator");
        self.inner.operators.register(operator);
        Ok(())
    }

    /// 按名称注册操作符，必须同时提供回调
    pub fn add_operator_fn<F>(&self, name: &str, evaluate: Option<F>) -> Result<()>
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        let evaluate = evaluate.ok_or_else(|| {
            RuleError::InvalidOperatorRegistration(format!(
                "按名称注册操作符 '{}' 时必须提供回调",
                name
            ))
        })?;
        self.add_operator(Operator::new(name, evaluate))
    }

    pub fn remove_operator(&self, name: impl AsRef<str>) -> bool {
        self.inner.operators.unregister(name)
    }

    // ==================== 事实 ====================

    /// 注册事实定义，同 ID 覆盖
    pub fn add_fact(&self, fact: Fact) -> &Self {
        debug!(fact = %fact.id(), "engine::add_fact");
        self.inner.facts.insert(fact.id().to_string(), fact);
        self
    }

    pub fn remove_fact(&self, fact_id: &str) -> bool {
        self.inner.facts.remove(fact_id).is_some()
    }

    pub fn get_fact(&self, fact_id: &str) -> Option<Fact> {
        self.inner.facts.get(fact_id).map(|f| f.value().clone())
    }

    // ==================== 通知 ====================

    /// 订阅通知：`"success"`、`"failure"` 或规则事件类型
    pub fn on<F>(&self, channel: impl Into<Channel>, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification<'_>) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(channel.into(), handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    // ==================== 调度 ====================

    /// 按优先级分组，高优先级在前；组内保持注册顺序。结果缓存到规则集变化为止。
    pub fn prioritize_rules(&self) -> Arc<Vec<Tier>> {
        let rules = self.inner.rules.read();
        if let Some(tiers) = self.inner.prioritized.read().as_ref() {
            return tiers.clone();
        }

        let mut by_priority: BTreeMap<Reverse<u32>, Vec<Arc<Rule>>> = BTreeMap::new();
        for rule in rules.iter() {
            by_priority
                .entry(Reverse(rule.priority()))
                .or_default()
                .push(rule.clone());
        }

        let tiers: Arc<Vec<Tier>> = Arc::new(
            by_priority
                .into_iter()
                .map(|(Reverse(priority), rules)| Tier { priority, rules })
                .collect(),
        );
        *self.inner.prioritized.write() = Some(tiers.clone());
        tiers
    }

    /// 停止派发剩余规则
    ///
    /// 同组中已开始评估的规则仍会完成并触发事件。
    pub fn stop(&self) -> &Self {
        self.stop_handle().stop();
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            status: self.inner.status.clone(),
        }
    }

    /// 运行引擎，返回本次运行触发的事件
    ///
    /// 运行中再次调用返回 `InvalidState`。任一规则评估出错时立即返回该错误，
    /// 不再派发后续优先级；同组已派发的规则继续在后台执行，其通知照常发布。
    #[instrument(skip(self, runtime_facts))]
    pub async fn run<I, K>(&self, runtime_facts: I) -> Result<Vec<RuleEvent>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RuleError::InvalidState {
                current: EngineStatus::Running.to_string(),
                expected: EngineStatus::Ready.to_string(),
            });
        }
        let _guard = RunGuard(&self.inner.running);

        *self.inner.status.lock() = EngineStatus::Running;
        let started = Instant::now();

        let mut facts: Vec<Fact> = self.inner.facts.iter().map(|f| f.value().clone()).collect();
        facts.push(success_events_fact());
        let almanac = Almanac::with_facts(
            facts,
            runtime_facts.into_iter().map(|(id, value)| (id.into(), value)),
            self.inner.options.into(),
        );

        let tiers = self.prioritize_rules();
        info!(tiers = tiers.len(), "engine::run started");

        for tier in tiers.iter() {
            if let Err(e) = self.evaluate_tier(tier, &almanac).await {
                *self.inner.status.lock() = EngineStatus::Finished;
                warn!(priority = tier.priority, error = %e, "engine::run failed");
                metrics::counter!(ENGINE_RUNS_TOTAL, "outcome" => "error").increment(1);
                return Err(e);
            }
        }

        *self.inner.status.lock() = EngineStatus::Finished;
        let events = almanac.success_events();

        metrics::counter!(ENGINE_RUNS_TOTAL, "outcome" => "completed").increment(1);
        metrics::histogram!(ENGINE_RUN_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        info!(events = events.len(), "engine::run completed");
        Ok(events)
    }

    /// 并发评估一组规则，首个错误立即返回
    async fn evaluate_tier(&self, tier: &Tier, almanac: &Almanac) -> Result<()> {
        debug!(priority = tier.priority, rules = tier.rules.len(), "engine::evaluate_tier");

        let mut pending = FuturesUnordered::new();
        for rule in &tier.rules {
            if self.status() != EngineStatus::Running {
                debug!(status = %self.status(), "engine::run stopped, skipping remaining rules");
                break;
            }

            let engine = self.clone();
            let rule = rule.clone();
            let almanac = almanac.clone();
            pending.push(tokio::spawn(async move {
                engine.evaluate_rule(&rule, &almanac).await
            }));
        }

        // 提前返回时剩余的 JoinHandle 被丢弃，对应任务在后台继续运行
        while let Some(joined) = pending.next().await {
            match joined {
                Ok(outcome) => outcome?,
                Err(e) => {
                    return Err(RuleError::ExecutionError(format!("规则任务异常终止: {}", e)));
                }
            }
        }
        Ok(())
    }

    async fn evaluate_rule(&self, rule: &Rule, almanac: &Almanac) -> Result<()> {
        let result = match rule.evaluate(almanac).await {
            Ok(result) => result,
            Err(e) => {
                metrics::counter!(RULE_EVALUATIONS_TOTAL, "outcome" => "error").increment(1);
                warn!(rule_id = %rule.id(), error = %e, "engine::evaluate_rule failed");
                return Err(e);
            }
        };

        let event = result.event();
        let notification = Notification {
            event,
            almanac,
            result: &result,
        };

        if result.result() == Some(true) {
            metrics::counter!(RULE_EVALUATIONS_TOTAL, "outcome" => "success").increment(1);
            almanac.push_success_event(event.clone());
            self.inner.listeners.publish(&Channel::Success, &notification);
            self.inner
                .listeners
                .publish(&Channel::event(event.event_type.as_str()), &notification);
        } else {
            metrics::counter!(RULE_EVALUATIONS_TOTAL, "outcome" => "failure").increment(1);
            self.inner.listeners.publish(&Channel::Failure, &notification);
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("rules", &self.inner.rules.read().len())
            .field("operators", &self.inner.operators.len())
            .field("facts", &self.inner.facts.len())
            .field("status", &self.status())
            .field("options", &self.inner.options)
            .finish()
    }
}
