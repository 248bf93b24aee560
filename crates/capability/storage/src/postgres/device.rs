//! Postgres 设备注册表实现

use crate::error::StorageError;
use crate::models::DeviceRecord;
use crate::traits::DeviceRegistry;
use domain::DeviceId;
use sqlx::{PgPool, Row};

pub struct PgDeviceRegistry {
    pub pool: PgPool,
}

impl PgDeviceRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn find_device(&self, device_id: DeviceId) -> Result<Option<DeviceRecord>, StorageError> {
        let row = sqlx::query("select id, name from device where id = $1")
            .bind(device_id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(DeviceRecord {
            device_id: DeviceId::new(row.try_get("id")?),
            name: row.try_get("name")?,
        }))
    }
}
