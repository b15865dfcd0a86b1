//! 引擎通知订阅
//!
//! 固定通道 `success` / `failure`，以及按规则事件类型动态命名的通道。
//! 回调在规则评估完成后立即同步调用。

use crate::almanac::Almanac;
use crate::models::RuleEvent;
use crate::rule_result::RuleResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 通知通道
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// 任意规则命中
    Success,
    /// 任意规则未命中
    Failure,
    /// 命中规则的事件类型
    Event(String),
}

impl Channel {
    pub fn event(event_type: impl Into<String>) -> Self {
        Self::Event(event_type.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Event(name) => name,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        match name {
            "success" => Self::Success,
            "failure" => Self::Failure,
            other => Self::Event(other.to_string()),
        }
    }
}

/// 通知内容
pub struct Notification<'a> {
    pub event: &'a RuleEvent,
    pub almanac: &'a Almanac,
    pub result: &'a RuleResult,
}

type Handler = Arc<dyn Fn(&Notification<'_>) + Send + Sync>;

/// 订阅标识，用于取消订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// 回调注册表
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<Channel, Vec<(SubscriptionId, Handler)>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, channel: Channel, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification<'_>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(channel)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let mut removed = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
        }
        handlers.retain(|_, list| !list.is_empty());
        removed
    }

    pub fn listener_count(&self, channel: &Channel) -> usize {
        self.handlers.read().get(channel).map_or(0, Vec::len)
    }

    /// 发布通知；回调在锁外执行，回调内部可以再订阅或停止引擎
    pub fn publish(&self, channel: &Channel, notification: &Notification<'_>) {
        let handlers: Vec<Handler> = match self.handlers.read().get(channel) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        for handler in handlers {
            handler(notification);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let counts: HashMap<&str, usize> = handlers
            .iter()
            .map(|(channel, list)| (channel.name(), list.len()))
            .collect();
        f.debug_struct("Listeners").field("handlers", &counts).finish()
    }
}
