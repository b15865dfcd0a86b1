//! 单次运行的事实存储（Almanac）
//!
//! 每次 `Engine::run` 都会创建新的 Almanac，绑定事实定义、运行时覆盖值
//! 以及按 (事实 ID, 参数签名) 缓存的计算结果。同一运行中并发评估的规则
//! 共享这一份状态。

use crate::error::{Result, RuleError};
use crate::fact::Fact;
use crate::models::{RuleEvent, select_path};
use dashmap::DashMap;
use parking_lot::Mutex;
use rule_shared::observability::metrics::FACT_COMPUTATIONS_TOTAL;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// 记录已触发事件的内置事实 ID
pub const SUCCESS_EVENTS_FACT: &str = "success-events";

/// Almanac 选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlmanacOptions {
    /// 未定义的事实解析为未定义值（`None`）而不是报错
    pub allow_undefined_facts: bool,
}

/// 缓存键：事实 ID + 参数的规范化 JSON
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fact_id: String,
    params: String,
}

impl CacheKey {
    fn new(fact_id: &str, params: &Value) -> Self {
        Self {
            fact_id: fact_id.to_string(),
            // serde_json 的 Map 按键排序，序列化结果可直接作为签名
            params: params.to_string(),
        }
    }
}

struct AlmanacInner {
    facts: DashMap<String, Fact>,
    runtime_facts: DashMap<String, Value>,
    cache: DashMap<CacheKey, Arc<OnceCell<Value>>>,
    success_events: Mutex<Vec<RuleEvent>>,
    options: AlmanacOptions,
}

/// 事实存储
///
/// 克隆开销很小（内部为 `Arc`），所有克隆共享同一份缓存。
#[derive(Clone)]
pub struct Almanac {
    inner: Arc<AlmanacInner>,
}

impl Almanac {
    pub fn new(options: AlmanacOptions) -> Self {
        Self {
            inner: Arc::new(AlmanacInner {
                facts: DashMap::new(),
                runtime_facts: DashMap::new(),
                cache: DashMap::new(),
                success_events: Mutex::new(Vec::new()),
                options,
            }),
        }
    }

    /// 使用事实定义和运行时值创建
    pub fn with_facts<F, R>(facts: F, runtime_facts: R, options: AlmanacOptions) -> Self
    where
        F: IntoIterator<Item = Fact>,
        R: IntoIterator<Item = (String, Value)>,
    {
        let almanac = Self::new(options);
        for fact in facts {
            almanac.add_fact(fact);
        }
        for (id, value) in runtime_facts {
            almanac.add_runtime_fact(id, value);
        }
        almanac
    }

    pub fn options(&self) -> AlmanacOptions {
        self.inner.options
    }

    /// 注册事实定义；同 ID 的旧定义及其缓存结果被替换
    pub fn add_fact(&self, fact: Fact) {
        let id = fact.id().to_string();
        debug!(fact = %id, cacheable = fact.is_cacheable(), "almanac::add_fact");
        self.inner.cache.retain(|key, _| key.fact_id != id);
        self.inner.facts.insert(id, fact);
    }

    /// 注入运行时事实值，在本次运行剩余时间内优先于事实定义
    pub fn add_runtime_fact(&self, id: impl Into<String>, value: Value) {
        let id = id.into();
        debug!(fact = %id, "almanac::add_runtime_fact");
        self.inner.runtime_facts.insert(id, value);
    }

    pub fn has_fact(&self, id: &str) -> bool {
        self.inner.runtime_facts.contains_key(id) || self.inner.facts.contains_key(id)
    }

    /// 解析事实值
    ///
    /// 解析顺序：运行时值 → 事实定义（不可缓存时每次重新计算，可缓存时
    /// 每组参数只计算一次）。事实不存在时返回 `UndefinedFact`，除非允许
    /// 未定义事实，此时返回 `None`。
    pub async fn fact_value(&self, id: &str, params: Option<&Value>) -> Result<Option<Value>> {
        if let Some(value) = self.inner.runtime_facts.get(id) {
            return Ok(Some(value.value().clone()));
        }

        let Some(fact) = self.inner.facts.get(id).map(|f| f.value().clone()) else {
            if self.inner.options.allow_undefined_facts {
                debug!(fact = %id, "almanac::fact_value undefined fact tolerated");
                return Ok(None);
            }
            return Err(RuleError::UndefinedFact(id.to_string()));
        };

        // 未声明参数与空参数等价，共享同一个缓存项
        let params = match params {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params) => params.clone(),
        };

        if !fact.is_cacheable() {
            return self.compute(&fact, &params).await.map(Some);
        }

        let cell = self
            .inner
            .cache
            .entry(CacheKey::new(id, &params))
            .or_default()
            .clone();

        // 并发的首次读取只有一个会执行计算，其余等待同一结果
        let value = cell
            .get_or_try_init(|| self.compute(&fact, &params))
            .await?;
        Ok(Some(value.clone()))
    }

    /// 解析事实值并按路径取出子值，路径不存在时视为未定义
    pub async fn fact_value_at(
        &self,
        id: &str,
        params: Option<&Value>,
        path: Option<&str>,
    ) -> Result<Option<Value>> {
        let value = self.fact_value(id, params).await?;
        match (value, path) {
            (Some(value), Some(path)) => Ok(select_path(&value, path).cloned()),
            (value, _) => Ok(value),
        }
    }

    async fn compute(&self, fact: &Fact, params: &Value) -> Result<Value> {
        debug!(fact = %fact.id(), params = %params, "almanac::compute");
        metrics::counter!(FACT_COMPUTATIONS_TOTAL, "fact" => fact.id().to_string()).increment(1);
        fact.calculate(params, self).await
    }

    /// 记录一条已触发的事件
    pub fn push_success_event(&self, event: RuleEvent) {
        self.inner.success_events.lock().push(event);
    }

    /// 截至目前已触发的事件
    pub fn success_events(&self) -> Vec<RuleEvent> {
        self.inner.success_events.lock().clone()
    }

    /// 已缓存结果的数量
    pub fn cached_len(&self) -> usize {
        self.inner
            .cache
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }
}

impl Default for Almanac {
    fn default() -> Self {
        Self::new(AlmanacOptions::default())
    }
}

impl std::fmt::Debug for Almanac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Almanac")
            .field("facts", &self.inner.facts.len())
            .field("runtime_facts", &self.inner.runtime_facts.len())
            .field("cached", &self.cached_len())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// 读取已触发事件的内置事实（不可缓存）
pub fn success_events_fact() -> Fact {
    Fact::computed(SUCCESS_EVENTS_FACT, |_, almanac| async move {
        serde_json::to_value(almanac.success_events()).map_err(RuleError::from)
    })
    .uncached()
}
