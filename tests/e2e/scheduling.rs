//! 优先级调度、停止与出错处理

use super::helpers::{Recorder, age_and_segment_leaves, facts, rule_json};
use rule_engine::{Channel, Engine, Fact, RuleError, RuleEvent};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Barrier;

fn slow_fact(id: &str, delay: Duration, value: Value) -> Fact {
    Fact::computed(id, move |_, _| {
        let value = value.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok::<_, RuleError>(value)
        }
    })
}

fn leaf_rule(fact: &str, value: Value, event_type: &str, priority: u32) -> Value {
    rule_json(
        "all",
        vec![json!({ "fact": fact, "operator": "equal", "value": value })],
        event_type,
        priority,
    )
}

// ==================== 优先级 ====================

#[tokio::test]
async fn test_higher_priority_tiers_complete_first() {
    let engine = Engine::new();
    // 低优先级先注册，并且低优先级的事实更快；slow 不缓存，每条规则都重新等待
    engine.add_fact(slow_fact("fast", Duration::from_millis(1), json!(true)));
    engine.add_fact(slow_fact("slow", Duration::from_millis(40), json!(true)).uncached());
    engine.add_rule_json(leaf_rule("fast", json!(true), "low", 1)).unwrap();
    engine.add_rule_json(leaf_rule("slow", json!(true), "mid", 5)).unwrap();
    engine.add_rule_json(leaf_rule("slow", json!(false), "high", 9)).unwrap();
    engine.add_rule_json(leaf_rule("fast", json!(true), "mid-fast", 5)).unwrap();
    let recorder = Recorder::attach(&engine);

    let events = engine.run(Vec::<(String, Value)>::new()).await.unwrap();

    let priorities = recorder.priorities();
    assert_eq!(priorities.len(), 4);
    assert_eq!(priorities[0], 9);
    assert!(priorities[1..3].iter().all(|p| *p == 5));
    assert_eq!(priorities[3], 1);
    assert!(priorities.windows(2).all(|w| w[0] >= w[1]));

    // 组间有序，组内顺序不固定
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types.len(), 3);
    let mut mid_tier = types[..2].to_vec();
    mid_tier.sort_unstable();
    assert_eq!(mid_tier, vec!["mid", "mid-fast"]);
    assert_eq!(types[2], "low");
}

#[tokio::test]
async fn test_rules_in_same_tier_run_concurrently() {
    let engine = Engine::new();
    let barrier = Arc::new(Barrier::new(2));
    for id in ["left", "right"] {
        let barrier = barrier.clone();
        engine.add_fact(Fact::computed(id, move |_, _| {
            let barrier = barrier.clone();
            async move {
                // 两条规则必须同时在评估中才能越过屏障
                barrier.wait().await;
                Ok::<_, RuleError>(json!(1))
            }
        }));
        engine.add_rule_json(leaf_rule(id, json!(1), id, 3)).unwrap();
    }

    let events = tokio::time::timeout(
        Duration::from_secs(5),
        engine.run(Vec::<(String, Value)>::new()),
    )
    .await
    .expect("tier rules should be evaluated concurrently")
    .unwrap();
    assert_eq!(events.len(), 2);
}

// ==================== 停止 ====================

#[tokio::test]
async fn test_stop_from_listener_skips_lower_tiers() {
    let engine = Engine::new();
    engine
        .add_rule_json(rule_json("any", age_and_segment_leaves(), "first", 10))
        .unwrap();
    engine
        .add_rule_json(rule_json("any", age_and_segment_leaves(), "second", 1))
        .unwrap();
    let recorder = Recorder::attach(&engine);

    let stop = engine.stop_handle();
    engine.on("first", move |_| stop.stop());

    let events = engine.run(facts(15)).await.unwrap();

    assert_eq!(events, vec![RuleEvent::new("first")]);
    assert_eq!(recorder.entries(), vec!["success:first:10"]);
}

#[tokio::test]
async fn test_stopped_engine_can_run_again() {
    let engine = Engine::new();
    engine
        .add_rule_json(rule_json("any", age_and_segment_leaves(), "first", 10))
        .unwrap();
    engine
        .add_rule_json(rule_json("any", age_and_segment_leaves(), "second", 1))
        .unwrap();

    let stop = engine.stop_handle();
    let id = engine.on("first", move |_| stop.stop());
    assert_eq!(engine.run(facts(15)).await.unwrap().len(), 1);

    assert!(engine.unsubscribe(id));
    assert_eq!(engine.run(facts(15)).await.unwrap().len(), 2);
}

// ==================== 出错即失败 ====================

#[tokio::test]
async fn test_error_fails_run_while_siblings_finish() {
    let engine = Engine::new();
    engine.add_fact(Fact::computed("broken", |_, _| async {
        Err::<Value, _>(RuleError::fact_computation("broken", "upstream unavailable"))
    }));
    engine.add_fact(slow_fact("slow", Duration::from_millis(100), json!(true)));

    engine.add_rule_json(leaf_rule("broken", json!(1), "broken", 5)).unwrap();
    engine.add_rule_json(leaf_rule("slow", json!(true), "sibling", 5)).unwrap();
    engine.add_rule_json(leaf_rule("slow", json!(true), "lower", 1)).unwrap();

    let sibling_hits = Arc::new(AtomicUsize::new(0));
    let lower_hits = Arc::new(AtomicUsize::new(0));
    let counter = sibling_hits.clone();
    engine.on("sibling", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = lower_hits.clone();
    engine.on(Channel::event("lower"), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let err = engine
        .run(Vec::<(String, Value)>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RuleError::FactComputation { ref fact, .. } if fact == "broken"));
    // 运行已失败返回，同组规则仍在后台评估
    assert_eq!(sibling_hits.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sibling_hits.load(Ordering::SeqCst), 1);
    assert_eq!(lower_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_run_rejected() {
    let engine = Engine::new();
    engine.add_fact(slow_fact("slow", Duration::from_millis(100), json!(true)));
    engine.add_rule_json(leaf_rule("slow", json!(true), "done", 1)).unwrap();

    let background = engine.clone();
    let first = tokio::spawn(async move { background.run(Vec::<(String, Value)>::new()).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = engine.run(Vec::<(String, Value)>::new()).await.unwrap_err();
    assert!(matches!(err, RuleError::InvalidState { .. }));
    assert_eq!(first.await.unwrap().unwrap().len(), 1);
}

// ==================== 事实缓存 ====================

#[tokio::test]
async fn test_fact_shared_across_rules_computed_once() {
    let engine = Engine::new();
    let computations = Arc::new(AtomicUsize::new(0));

    let counter = computations.clone();
    engine.add_fact(Fact::computed("profile", move |_, _| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, RuleError>(json!({ "level": "gold", "age": 30 }))
        }
    }));

    for (index, priority) in [3, 3, 3, 1].into_iter().enumerate() {
        engine
            .add_rule_json(json!({
                "priority": priority,
                "conditions": {
                    "all": [{ "fact": "profile", "path": "$.level", "operator": "equal", "value": "gold" }]
                },
                "event": { "type": format!("rule-{}", index) }
            }))
            .unwrap();
    }

    let events = engine.run(Vec::<(String, Value)>::new()).await.unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(computations.load(Ordering::SeqCst), 1);
}
