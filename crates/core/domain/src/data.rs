use crate::{DataSide, DeviceId};
use std::collections::BTreeMap;

/// 规整后的规范值。
///
/// `RawStructured` 保留无法展平为标量的对象 / 数组的序列化文本。
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    RawStructured(String),
}

impl DynamicValue {
    /// 值类型名（日志与存储列选择用）。
    pub fn kind(&self) -> &'static str {
        match self {
            DynamicValue::Null => "null",
            DynamicValue::Bool(_) => "bool",
            DynamicValue::Number(_) => "number",
            DynamicValue::String(_) => "string",
            DynamicValue::RawStructured(_) => "structured",
        }
    }
}

/// 消息体字段的来源值。
///
/// - `Json`：来自通用反序列化 JSON 表示的动态值
/// - `Native`：适配层已按原生类型给出的值
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Json(serde_json::Value),
    Native(DynamicValue),
}

impl From<serde_json::Value> for SourceValue {
    fn from(value: serde_json::Value) -> Self {
        SourceValue::Json(value)
    }
}

impl From<DynamicValue> for SourceValue {
    fn from(value: DynamicValue) -> Self {
        SourceValue::Native(value)
    }
}

/// 规整后的属性集合：字段名唯一，顺序无关。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet(BTreeMap<String, DynamicValue>);

impl AttributeSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: DynamicValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DynamicValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl FromIterator<(String, DynamicValue)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, DynamicValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for AttributeSet {
    type Item = (String, DynamicValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, DynamicValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// 总线投递的原始消息（接收后不可变，生命周期为单次接入调用）。
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub device_id: DeviceId,
    pub data_side: DataSide,
    pub body: BTreeMap<String, SourceValue>,
    pub received_at_ms: i64,
}

impl RawMessage {
    pub fn new(
        device_id: DeviceId,
        data_side: DataSide,
        body: BTreeMap<String, SourceValue>,
        received_at_ms: i64,
    ) -> Self {
        Self {
            device_id,
            data_side,
            body,
            received_at_ms,
        }
    }

    /// 由 JSON 对象构造（所有字段视为动态 JSON 值）。
    pub fn from_json_object(
        device_id: DeviceId,
        data_side: DataSide,
        object: serde_json::Map<String, serde_json::Value>,
        received_at_ms: i64,
    ) -> Self {
        let body = object
            .into_iter()
            .map(|(key, value)| (key, SourceValue::Json(value)))
            .collect();
        Self::new(device_id, data_side, body, received_at_ms)
    }
}
