//! 可观测性模块
//!
//! 初始化结构化日志并注册引擎指标描述。指标通过 `metrics` 门面记录，
//! 未安装 recorder 时记录操作为空操作。

pub mod metrics;
pub mod tracing;

use crate::config::ObservabilityConfig;
use anyhow::Result;

/// 统一初始化可观测性
///
/// # Example
///
/// ```ignore
/// use rule_shared::config::AppConfig;
/// use rule_shared::observability;
///
/// let config = AppConfig::load("rule-engine")?;
/// observability::init(&config.service_name, &config.observability)?;
/// ```
pub fn init(service_name: &str, config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;
    metrics::describe(service_name);

    ::tracing::info!(
        service = service_name,
        log_format = %config.log_format,
        "Observability initialized"
    );
    Ok(())
}
