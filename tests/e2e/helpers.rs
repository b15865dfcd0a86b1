//! 测试辅助工具

use parking_lot::Mutex;
use rule_engine::{Channel, Engine};
use serde_json::{Value, json};
use std::sync::Arc;

/// 场景中使用的两个叶子条件
pub fn age_and_segment_leaves() -> Vec<Value> {
    vec![
        json!({ "fact": "age", "operator": "lessThan", "value": 50 }),
        json!({ "fact": "segment", "operator": "equal", "value": "european" }),
    ]
}

/// 构造规则 JSON；`combinator` 为 "all" 或 "any"
pub fn rule_json(combinator: &str, leaves: Vec<Value>, event_type: &str, priority: u32) -> Value {
    json!({
        "conditions": { combinator: leaves },
        "event": { "type": event_type },
        "priority": priority
    })
}

pub fn facts(age: i64) -> Vec<(&'static str, Value)> {
    vec![("age", json!(age)), ("segment", json!("european"))]
}

/// 记录通知顺序：每条记录为 "<通道>:<事件类型>:<优先级>"
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn attach(engine: &Engine) -> Self {
        let recorder = Self::default();
        for channel in [Channel::Success, Channel::Failure] {
            let entries = recorder.entries.clone();
            let name = channel.name().to_string();
            engine.on(channel, move |n| {
                entries.lock().push(format!(
                    "{}:{}:{}",
                    name,
                    n.event.event_type,
                    n.result.priority()
                ));
            });
        }
        recorder
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    /// 通知中的优先级序列
    pub fn priorities(&self) -> Vec<u32> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| e.rsplit(':').next())
            .filter_map(|p| p.parse().ok())
            .collect()
    }
}
