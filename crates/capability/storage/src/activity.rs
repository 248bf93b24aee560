//! 设备活跃状态存储接口。

use crate::error::StorageError;
use domain::DeviceId;

#[async_trait::async_trait]
pub trait DeviceActivityStore: Send + Sync {
    /// 刷新设备最近活跃时间
    async fn touch_device(&self, device_id: DeviceId, ts_ms: i64) -> Result<(), StorageError>;

    async fn get_device_last_seen_at_ms(
        &self,
        device_id: DeviceId,
    ) -> Result<Option<i64>, StorageError>;
}
