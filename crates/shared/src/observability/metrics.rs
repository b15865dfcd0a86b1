//! 引擎指标描述
//!
//! 指标名称集中定义在这里，引擎记录时引用同一组常量。

pub const FACT_COMPUTATIONS_TOTAL: &str = "fact_computations_total";
pub const RULE_EVALUATIONS_TOTAL: &str = "rule_evaluations_total";
pub const ENGINE_RUNS_TOTAL: &str = "engine_runs_total";
pub const ENGINE_RUN_DURATION_SECONDS: &str = "engine_run_duration_seconds";

/// 注册指标描述
pub fn describe(service_name: &str) {
    metrics::describe_counter!(
        FACT_COMPUTATIONS_TOTAL,
        "Total number of dynamic fact computations"
    );
    metrics::describe_counter!(
        RULE_EVALUATIONS_TOTAL,
        "Total number of rule evaluations by outcome"
    );
    metrics::describe_counter!(ENGINE_RUNS_TOTAL, "Total number of engine runs by outcome");
    metrics::describe_histogram!(
        ENGINE_RUN_DURATION_SECONDS,
        "Engine run duration in seconds"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}
