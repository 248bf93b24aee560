pub mod data;

pub use data::{AttributeSet, DynamicValue, RawMessage, SourceValue};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 设备 ID。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for DeviceId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// 规则组 ID（一组一起执行的 条件→动作 规则）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleGroupId(pub Uuid);

impl RuleGroupId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RuleGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for RuleGroupId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// 数据归属侧：值最后由谁设置（设备上报 / 服务端计算 / 共享）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSide {
    Client,
    Server,
    Shared,
}

impl DataSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSide::Client => "client",
            DataSide::Server => "server",
            DataSide::Shared => "shared",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "client" => Some(DataSide::Client),
            "server" => Some(DataSide::Server),
            "shared" => Some(DataSide::Shared),
            _ => None,
        }
    }
}

impl fmt::Display for DataSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 规则执行的事件分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// 正常接入数据。
    Normal,
    /// 模拟 / 测试运行。
    TestPurpose,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Normal => "normal",
            EventKind::TestPurpose => "test_purpose",
        }
    }
}
