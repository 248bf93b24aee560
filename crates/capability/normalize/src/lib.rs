//! 载荷规整：总线消息体 → 规范值集合。
//!
//! 动态 JSON 值按类型转换：
//!
//! | 来源类型 | 规范结果 |
//! |---|---|
//! | object / array | `RawStructured`（紧凑 JSON 文本） |
//! | string | `String` |
//! | number | `Number`（f64） |
//! | bool | `Bool` |
//! | null | 丢弃字段 |
//!
//! 原生值原样透传（null 同样丢弃）。纯函数，无副作用。

use domain::{AttributeSet, DynamicValue, RawMessage, SourceValue};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// 规整单个字段；返回 `None` 表示该字段不进入结果。
pub fn normalize_value(value: &SourceValue) -> Option<DynamicValue> {
    match value {
        SourceValue::Json(json) => match json {
            Value::Null => None,
            Value::Bool(v) => Some(DynamicValue::Bool(*v)),
            Value::Number(v) => v.as_f64().map(DynamicValue::Number),
            Value::String(v) => Some(DynamicValue::String(v.clone())),
            Value::Array(_) | Value::Object(_) => {
                Some(DynamicValue::RawStructured(json.to_string()))
            }
        },
        SourceValue::Native(DynamicValue::Null) => None,
        SourceValue::Native(native) => Some(native.clone()),
    }
}

/// 规整整个消息体。
pub fn normalize(body: &BTreeMap<String, SourceValue>) -> AttributeSet {
    let mut attrs = AttributeSet::new();
    for (key, value) in body {
        match normalize_value(value) {
            Some(normalized) => attrs.insert(key.clone(), normalized),
            None if is_null(value) => {}
            None => {
                debug!(target: "ds.normalize", key = %key, "field_kind_unrecognized");
            }
        }
    }
    attrs
}

/// 消息体中被丢弃的字段数（null 与无法识别的类型）。
pub fn dropped_count(body: &BTreeMap<String, SourceValue>, attrs: &AttributeSet) -> usize {
    body.len().saturating_sub(attrs.len())
}

/// 构造交给规则引擎的通用文档：保留完整载荷，不展平为标量。
pub fn to_document(message: &RawMessage) -> Value {
    let object = message
        .body
        .iter()
        .map(|(key, value)| (key.clone(), source_to_json(value)))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(object)
}

/// 字段规整前的序列化文本（失败诊断用）。
pub fn raw_text(value: &SourceValue) -> String {
    source_to_json(value).to_string()
}

fn source_to_json(value: &SourceValue) -> Value {
    match value {
        SourceValue::Json(json) => json.clone(),
        SourceValue::Native(native) => dynamic_to_json(native),
    }
}

/// 规范值渲染为 JSON；`RawStructured` 为合法 JSON 时还原结构。
pub fn dynamic_to_json(value: &DynamicValue) -> Value {
    match value {
        DynamicValue::Null => Value::Null,
        DynamicValue::Bool(v) => Value::Bool(*v),
        DynamicValue::Number(v) => serde_json::Number::from_f64(*v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        DynamicValue::String(v) => Value::String(v.clone()),
        DynamicValue::RawStructured(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
    }
}

fn is_null(value: &SourceValue) -> bool {
    matches!(
        value,
        SourceValue::Json(Value::Null) | SourceValue::Native(DynamicValue::Null)
    )
}
