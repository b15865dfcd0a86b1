//! 引擎配置

use crate::almanac::AlmanacOptions;
use rule_shared::config::EngineConfig;
use serde::Deserialize;

/// 引擎选项，可直接从应用配置的 `[engine]` 段反序列化
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct EngineOptions {
    /// 允许引用未注册的事实（解析为未定义值，而不是让运行失败）
    #[serde(default)]
    pub allow_undefined_facts: bool,
}

impl EngineOptions {
    pub fn allow_undefined_facts() -> Self {
        Self {
            allow_undefined_facts: true,
        }
    }
}

impl From<EngineOptions> for AlmanacOptions {
    fn from(options: EngineOptions) -> Self {
        Self {
            allow_undefined_facts: options.allow_undefined_facts,
        }
    }
}

impl From<&EngineConfig> for EngineOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            allow_undefined_facts: config.allow_undefined_facts,
        }
    }
}
