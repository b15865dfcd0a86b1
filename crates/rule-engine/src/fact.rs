//! 事实定义
//!
//! 事实是具名的取值来源：常量，或基于参数与 Almanac 的（异步）计算。
//! 可缓存的事实在一次运行中对同一组参数至多计算一次。

use crate::almanac::Almanac;
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// 事实计算抽象
///
/// `params` 为条件中声明的参数（未声明时为空对象），
/// 计算过程中可以通过 `almanac` 读取其他事实。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FactCompute: Send + Sync {
    async fn compute(&self, params: &Value, almanac: &Almanac) -> Result<Value>;
}

/// 事实选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FactOptions {
    /// 是否在单次运行内缓存计算结果
    #[serde(default = "default_cache")]
    pub cache: bool,
}

fn default_cache() -> bool {
    true
}

impl Default for FactOptions {
    fn default() -> Self {
        Self {
            cache: default_cache(),
        }
    }
}

impl FactOptions {
    pub fn uncached() -> Self {
        Self { cache: false }
    }
}

#[derive(Clone)]
pub(crate) enum FactSource {
    Constant(Value),
    Dynamic(Arc<dyn FactCompute>),
}

/// 事实定义
#[derive(Clone)]
pub struct Fact {
    id: String,
    source: FactSource,
    options: FactOptions,
}

impl Fact {
    /// 常量事实
    pub fn constant(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            source: FactSource::Constant(value.into()),
            options: FactOptions::default(),
        }
    }

    /// 由异步闭包计算的事实
    ///
    /// ```ignore
    /// let fact = Fact::computed("account", |params, almanac| async move {
    ///     let id = almanac.fact_value("account-id", None).await?;
    ///     Ok(json!({ "id": id, "params": params }))
    /// });
    /// ```
    pub fn computed<F, Fut>(id: impl Into<String>, compute: F) -> Self
    where
        F: Fn(Value, Almanac) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::from_compute(
            id,
            FnCompute {
                compute,
                _marker: PhantomData,
            },
        )
    }

    /// 由 `FactCompute` 实现计算的事实
    pub fn from_compute(id: impl Into<String>, compute: impl FactCompute + 'static) -> Self {
        Self {
            id: id.into(),
            source: FactSource::Dynamic(Arc::new(compute)),
            options: FactOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FactOptions) -> Self {
        self.options = options;
        self
    }

    pub fn uncached(self) -> Self {
        self.with_options(FactOptions::uncached())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> FactOptions {
        self.options
    }

    pub fn is_cacheable(&self) -> bool {
        self.options.cache
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.source, FactSource::Constant(_))
    }

    /// 常量事实的值
    pub fn constant_value(&self) -> Option<&Value> {
        match &self.source {
            FactSource::Constant(value) => Some(value),
            FactSource::Dynamic(_) => None,
        }
    }

    /// 计算事实值
    pub async fn calculate(&self, params: &Value, almanac: &Almanac) -> Result<Value> {
        match &self.source {
            FactSource::Constant(value) => Ok(value.clone()),
            FactSource::Dynamic(compute) => compute.compute(params, almanac).await,
        }
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Fact");
        debug.field("id", &self.id).field("options", &self.options);
        match &self.source {
            FactSource::Constant(value) => debug.field("value", value),
            FactSource::Dynamic(_) => debug.field("value", &"<computed>"),
        };
        debug.finish()
    }
}

struct FnCompute<F, Fut> {
    compute: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> FactCompute for FnCompute<F, Fut>
where
    F: Fn(Value, Almanac) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn compute(&self, params: &Value, almanac: &Almanac) -> Result<Value> {
        (self.compute)(params.clone(), almanac.clone()).await
    }
}
