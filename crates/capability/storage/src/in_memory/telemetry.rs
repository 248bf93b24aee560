//! 遥测兜底存储内存实现

use crate::error::StorageError;
use crate::models::TelemetryRecord;
use crate::traits::TelemetryStore;
use domain::RawMessage;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// 遥测内存存储
///
/// 按字段展开追加；`failing()` 构造始终失败的实例，用于测试错误传播。
#[derive(Default)]
pub struct InMemoryTelemetryStore {
    records: RwLock<Vec<TelemetryRecord>>,
    messages: RwLock<Vec<RawMessage>>,
    fail: AtomicBool,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// 已存储的消息数
    pub fn message_count(&self) -> usize {
        self.messages.read().map(|items| items.len()).unwrap_or(0)
    }

    /// 已存储的字段样本
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .read()
            .map(|items| items.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl TelemetryStore for InMemoryTelemetryStore {
    async fn store_telemetry(&self, message: &RawMessage) -> Result<(), StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::new("telemetry store unavailable"));
        }
        let attrs = ds_normalize::normalize(&message.body);
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for (key, value) in attrs {
            records.push(TelemetryRecord {
                device_id: message.device_id,
                key,
                ts_ms: message.received_at_ms,
                data_side: message.data_side,
                value,
            });
        }
        drop(records);
        let mut messages = self
            .messages
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        messages.push(message.clone());
        Ok(())
    }
}
