//! 设备活跃状态记录（在写入属性之前由入口调用）。

use crate::PipelineError;
use domain::DeviceId;
use ds_storage::DeviceActivityStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct DeviceActivity {
    store: Arc<dyn DeviceActivityStore>,
}

impl DeviceActivity {
    pub fn new(store: Arc<dyn DeviceActivityStore>) -> Self {
        Self { store }
    }

    /// 刷新设备最近活跃时间。
    pub async fn record(&self, device_id: DeviceId, ts_ms: i64) -> Result<(), PipelineError> {
        self.store
            .touch_device(device_id, ts_ms)
            .await
            .map_err(|err| PipelineError::Store(err.to_string()))
    }

    pub async fn last_seen_at_ms(&self, device_id: DeviceId) -> Result<Option<i64>, PipelineError> {
        self.store
            .get_device_last_seen_at_ms(device_id)
            .await
            .map_err(|err| PipelineError::Store(err.to_string()))
    }
}
