//! PostgreSQL 存储实现模块
//!
//! 使用 sqlx 实现接入链路消费的持久化接口。
//!
//! ## 表结构
//!
//! | 表 | 主键 | 说明 |
//! |---|---|---|
//! | `device` | `id` | 设备注册表（`id uuid`, `name text`） |
//! | `device_rule` | `(device_id, flow_rule_id)` | 设备与规则组绑定 |
//! | `attribute_latest` | `(device_id, key_name)` | 最新属性值 |
//! | `telemetry_data` | - | 遥测样本（追加写） |
//! | `telemetry_latest` | `(device_id, key_name)` | 最新遥测值 |
//!
//! 属性与遥测值按类型落到不同列：
//! `value_type` + `value_bool` / `value_double` / `value_string` / `value_json`。
//!
//! ## 设计要点
//!
//! - 所有 SQL 使用参数绑定
//! - 属性 upsert：外层事务 + 每字段 savepoint，单字段失败只回滚该字段
//! - 遥测写入：单事务，失败整体回滚并向调用方返回错误

pub mod attribute;
pub mod device;
pub mod rule_group;
pub mod telemetry;

pub use attribute::*;
pub use device::*;
pub use rule_group::*;
pub use telemetry::*;

use domain::DynamicValue;

/// 规范值对应的列值。
pub(crate) struct ValueColumns {
    pub value_type: &'static str,
    pub value_bool: Option<bool>,
    pub value_double: Option<f64>,
    pub value_string: Option<String>,
    pub value_json: Option<serde_json::Value>,
}

impl ValueColumns {
    pub(crate) fn from_value(value: &DynamicValue) -> Self {
        let mut columns = Self {
            value_type: value.kind(),
            value_bool: None,
            value_double: None,
            value_string: None,
            value_json: None,
        };
        match value {
            DynamicValue::Null => {}
            DynamicValue::Bool(v) => columns.value_bool = Some(*v),
            DynamicValue::Number(v) => columns.value_double = Some(*v),
            DynamicValue::String(v) => columns.value_string = Some(v.clone()),
            // 合法 JSON 存入 jsonb，否则保留原文
            DynamicValue::RawStructured(text) => match serde_json::from_str(text) {
                Ok(json) => columns.value_json = Some(json),
                Err(_) => columns.value_string = Some(text.clone()),
            },
        }
        columns
    }
}
