//! 基础场景
//!
//! facts = {age, segment: "european"}，条件为 age < 50 与 segment == "european" 的组合。

use super::helpers::{Recorder, age_and_segment_leaves, facts, rule_json};
use rule_engine::{Almanac, Engine, EngineStatus, Rule, RuleEvent};
use serde_json::json;

#[tokio::test]
async fn test_any_condition_matches() {
    let engine = Engine::new();
    engine
        .add_rule_json(rule_json("any", age_and_segment_leaves(), "young-or-european", 1))
        .unwrap();
    let recorder = Recorder::attach(&engine);

    let events = engine.run(facts(15)).await.unwrap();

    assert_eq!(events, vec![RuleEvent::new("young-or-european")]);
    assert_eq!(recorder.entries(), vec!["success:young-or-european:1"]);
    assert_eq!(engine.status(), EngineStatus::Finished);
}

#[tokio::test]
async fn test_all_condition_matches() {
    let engine = Engine::new();
    engine
        .add_rule_json(rule_json("all", age_and_segment_leaves(), "young-european", 1))
        .unwrap();
    let recorder = Recorder::attach(&engine);

    let events = engine.run(facts(15)).await.unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(recorder.count("success"), 1);
    assert_eq!(recorder.count("failure"), 0);
}

#[tokio::test]
async fn test_all_condition_fails() {
    let engine = Engine::new();
    engine
        .add_rule_json(rule_json("all", age_and_segment_leaves(), "young-european", 1))
        .unwrap();
    let recorder = Recorder::attach(&engine);

    let events = engine.run(facts(60)).await.unwrap();

    assert!(events.is_empty());
    assert_eq!(recorder.entries(), vec!["failure:young-european:1"]);
}

#[tokio::test]
async fn test_rule_evaluated_directly() {
    let engine = Engine::new();
    let mut rule = Rule::try_from(rule_json("any", age_and_segment_leaves(), "direct", 1)).unwrap();
    rule.set_engine(&engine);

    let almanac = Almanac::default();
    almanac.add_runtime_fact("age", json!(70));
    almanac.add_runtime_fact("segment", json!("asian"));

    let result = rule.evaluate(&almanac).await.unwrap();
    assert_eq!(result.result(), Some(false));
    assert_eq!(
        result.to_json().unwrap()["conditions"]["any"][0],
        json!({ "fact": "age", "operator": "lessThan", "value": 50 })
    );
}
