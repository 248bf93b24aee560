//! 设备数据流接入主链路。
//!
//! - [`membership`]：规则组成员关系读穿缓存（TTL，单飞加载）
//! - [`dispatch`]：分发决策（规则引擎 / 兜底存储）
//! - [`writer`]：属性写入与逐字段失败汇总
//! - [`activity`]：设备活跃状态记录
//! - [`handler`]：属性 / 遥测两个入口

pub mod activity;
pub mod dispatch;
pub mod handler;
pub mod membership;
pub mod writer;

pub use activity::DeviceActivity;
pub use dispatch::{DispatchTarget, decide};
pub use handler::{AttributeOutcome, DataStreamHandler, MembershipFailurePolicy, TelemetryOutcome};
pub use membership::{DEFAULT_MEMBERSHIP_TTL, MembershipCache, cache_key};
pub use writer::{AttributeWriter, FieldFailure, WriteResult};

/// 接入链路错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(String),
    #[error("membership load failed: {0}")]
    Membership(String),
    #[error("cache error: {0}")]
    Cache(String),
}
