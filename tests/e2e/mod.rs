//! 规则引擎端到端测试
//!
//! 测试覆盖完整的运行流程，包括：
//! - 基础场景（ANY/ALL 组合、命中与未命中通知）
//! - 优先级调度与停止
//! - 出错即失败与同组规则的后台完成
//! - 跨规则共享的事实缓存

pub mod helpers;
pub mod scenarios;
pub mod scheduling;
