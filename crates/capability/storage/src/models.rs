//! 数据模型
//!
//! - 设备模型：DeviceRecord
//! - 属性写入结果：AttributeUpsertOutcome
//! - 遥测样本：TelemetryRecord

use domain::{DataSide, DeviceId, DynamicValue};
use std::collections::BTreeMap;

/// 设备注册记录。
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub name: String,
}

/// 一次属性 upsert 调用的逐字段结果。
///
/// `rejected`：字段名 → 存储给出的错误详情。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeUpsertOutcome {
    pub succeeded: usize,
    pub rejected: BTreeMap<String, String>,
}

/// 最新属性记录。
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRecord {
    pub device_id: DeviceId,
    pub key: String,
    pub data_side: DataSide,
    pub value: DynamicValue,
}

/// 兜底存储中的遥测样本（按字段展开）。
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub device_id: DeviceId,
    pub key: String,
    pub ts_ms: i64,
    pub data_side: DataSide,
    pub value: DynamicValue,
}
