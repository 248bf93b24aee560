//! Redis 设备活跃状态实现

use crate::activity::DeviceActivityStore;
use crate::error::StorageError;
use domain::DeviceId;
use redis::AsyncCommands;

#[derive(serde::Serialize, serde::Deserialize)]
struct ActivityPayload {
    ts_ms: i64,
}

fn device_activity_key(device_id: DeviceId) -> String {
    format!("device:{}:last_seen", device_id)
}

/// Redis 设备活跃状态存储（带 TTL，过期视为离线）。
pub struct RedisActivityStore {
    client: redis::Client,
    ttl_seconds: u64,
}

impl RedisActivityStore {
    pub fn new(client: redis::Client, ttl_seconds: u64) -> Self {
        Self {
            client,
            ttl_seconds: ttl_seconds.max(1),
        }
    }

    pub fn connect(redis_url: &str, ttl_seconds: u64) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client, ttl_seconds))
    }
}

#[async_trait::async_trait]
impl DeviceActivityStore for RedisActivityStore {
    async fn touch_device(&self, device_id: DeviceId, ts_ms: i64) -> Result<(), StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let data = serde_json::to_string(&ActivityPayload { ts_ms })
            .map_err(|err| StorageError::new(err.to_string()))?;
        connection
            .set_ex::<_, _, ()>(device_activity_key(device_id), data, self.ttl_seconds)
            .await?;
        Ok(())
    }

    async fn get_device_last_seen_at_ms(
        &self,
        device_id: DeviceId,
    ) -> Result<Option<i64>, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let data: Option<String> = connection.get(device_activity_key(device_id)).await?;
        let Some(data) = data else {
            return Ok(None);
        };
        let payload: ActivityPayload =
            serde_json::from_str(&data).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Some(payload.ts_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn activity_key_uses_device_id() {
        let key = device_activity_key(DeviceId::new(Uuid::from_u128(7)));
        assert_eq!(key, "device:00000000-0000-0000-0000-000000000007:last_seen");
    }
}
