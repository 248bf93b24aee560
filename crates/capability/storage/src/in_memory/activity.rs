//! 设备活跃状态内存实现（用于测试与本地运行）。

use crate::activity::DeviceActivityStore;
use crate::error::StorageError;
use domain::DeviceId;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryActivityStore {
    devices: RwLock<HashMap<DeviceId, i64>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeviceActivityStore for InMemoryActivityStore {
    async fn touch_device(&self, device_id: DeviceId, ts_ms: i64) -> Result<(), StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        // 乱序到达时不回退活跃时间
        let entry = map.entry(device_id).or_insert(ts_ms);
        if ts_ms > *entry {
            *entry = ts_ms;
        }
        Ok(())
    }

    async fn get_device_last_seen_at_ms(
        &self,
        device_id: DeviceId,
    ) -> Result<Option<i64>, StorageError> {
        let map = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(&device_id).copied())
    }
}
