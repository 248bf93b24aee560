//! 最新属性内存实现
//!
//! 字段校验与 Postgres 实现一致：空字段名、超长字段名、超长文本值被逐字段拒绝。

use crate::error::StorageError;
use crate::models::{AttributeRecord, AttributeUpsertOutcome};
use crate::traits::AttributeStore;
use crate::validation::{ensure_key, ensure_value_size};
use domain::{AttributeSet, DataSide, DeviceId};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 最新属性内存存储
#[derive(Default)]
pub struct InMemoryAttributeStore {
    attributes: RwLock<HashMap<(DeviceId, String), AttributeRecord>>,
    max_text_len: Option<usize>,
    calls: AtomicUsize,
}

impl InMemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 限制文本类值长度，超出的字段被拒绝
    pub fn with_max_text_len(max_text_len: usize) -> Self {
        Self {
            max_text_len: Some(max_text_len),
            ..Self::default()
        }
    }

    pub fn get(&self, device_id: DeviceId, key: &str) -> Option<AttributeRecord> {
        self.attributes
            .read()
            .ok()
            .and_then(|map| map.get(&(device_id, key.to_string())).cloned())
    }

    pub fn len(&self) -> usize {
        self.attributes.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// upsert 调用次数（用于测试）
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AttributeStore for InMemoryAttributeStore {
    async fn upsert_attributes(
        &self,
        device_id: DeviceId,
        data_side: DataSide,
        attrs: &AttributeSet,
    ) -> Result<AttributeUpsertOutcome, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut map = self
            .attributes
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut outcome = AttributeUpsertOutcome::default();
        for (key, value) in attrs.iter() {
            let checked =
                ensure_key(key).and_then(|_| ensure_value_size(value, self.max_text_len));
            if let Err(err) = checked {
                outcome.rejected.insert(key.clone(), err.to_string());
                continue;
            }
            map.insert(
                (device_id, key.clone()),
                AttributeRecord {
                    device_id,
                    key: key.clone(),
                    data_side,
                    value: value.clone(),
                },
            );
            outcome.succeeded += 1;
        }
        Ok(outcome)
    }
}
