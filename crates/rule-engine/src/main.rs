//! 规则引擎运行器
//!
//! 从配置的路径读取规则数组和运行时事实，执行一次评估并输出 JSON 摘要。

use anyhow::{Context, Result};
use rule_engine::{Channel, Engine, EngineOptions, Rule};
use rule_shared::config::AppConfig;
use rule_shared::observability;
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::{info, warn};

const SERVICE_NAME: &str = "rule-engine";

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    observability::init(SERVICE_NAME, &config.observability)?;

    let rules = load_rules(&config.runner.rules_path)?;
    let facts = load_facts(&config.runner.facts_path)?;
    info!(
        rules = rules.len(),
        facts = facts.len(),
        environment = %config.environment,
        "Starting rule-engine run"
    );

    let engine = Engine::with_options(EngineOptions::from(&config.engine));
    for rule in rules {
        engine.add_rule(rule)?;
    }

    engine.on(Channel::Success, |n| {
        info!(event = %n.event.event_type, priority = n.result.priority(), "rule matched");
    });
    engine.on(Channel::Failure, |n| {
        info!(event = %n.event.event_type, priority = n.result.priority(), "rule not matched");
    });

    let events = match engine.run(facts).await {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "run failed");
            return Err(e.into());
        }
    };

    let summary = json!({
        "status": engine.status().to_string(),
        "events": events,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file {}", path.display()))?;
    let definitions: Vec<Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} must contain a JSON array of rules", path.display()))?;

    definitions
        .into_iter()
        .enumerate()
        .map(|(index, definition)| {
            Rule::try_from(definition).with_context(|| format!("invalid rule at index {}", index))
        })
        .collect()
}

fn load_facts(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        warn!(path = %path.display(), "facts file not found, running without runtime facts");
        return Ok(Map::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read facts file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} must contain a JSON object of facts", path.display()))
}
