//! 设备注册表内存实现

use crate::error::StorageError;
use crate::models::DeviceRecord;
use crate::traits::DeviceRegistry;
use domain::DeviceId;
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备注册表内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
#[derive(Default)]
pub struct InMemoryDeviceRegistry {
    devices: RwLock<HashMap<DeviceId, DeviceRecord>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册设备（已存在时覆盖）
    pub fn register(&self, record: DeviceRecord) -> Result<(), StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(record.device_id, record);
        Ok(())
    }

    /// 注销设备
    pub fn remove(&self, device_id: DeviceId) -> Result<bool, StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(&device_id).is_some())
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn find_device(&self, device_id: DeviceId) -> Result<Option<DeviceRecord>, StorageError> {
        let map = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(&device_id).cloned())
    }
}
