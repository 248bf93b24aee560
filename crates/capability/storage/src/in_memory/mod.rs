//! 内存存储实现模块
//!
//! 用于测试，以及未配置数据库时的本地运行。
//!
//! 包含以下实现：
//! - DeviceRegistry: InMemoryDeviceRegistry
//! - DeviceActivityStore: InMemoryActivityStore
//! - RuleGroupStore: InMemoryRuleGroupStore
//! - AttributeStore: InMemoryAttributeStore
//! - TelemetryStore: InMemoryTelemetryStore

pub mod activity;
pub mod attribute;
pub mod device;
pub mod rule_group;
pub mod telemetry;

pub use activity::*;
pub use attribute::*;
pub use device::*;
pub use rule_group::*;
pub use telemetry::*;
