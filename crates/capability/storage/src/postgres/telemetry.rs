//! Postgres 遥测兜底存储实现
//!
//! 每个字段追加一行 `telemetry_data`，同时刷新 `telemetry_latest`。

use super::ValueColumns;
use crate::error::StorageError;
use crate::traits::TelemetryStore;
use domain::RawMessage;
use sqlx::PgPool;

const INSERT_TELEMETRY: &str = "insert into telemetry_data \
     (device_id, key_name, ts, data_side, value_type, value_bool, value_double, value_string, value_json) \
     values ($1, $2, to_timestamp($3 / 1000.0), $4, $5, $6, $7, $8, $9)";

const UPSERT_TELEMETRY_LATEST: &str = "insert into telemetry_latest \
     (device_id, key_name, ts, data_side, value_type, value_bool, value_double, value_string, value_json) \
     values ($1, $2, to_timestamp($3 / 1000.0), $4, $5, $6, $7, $8, $9) \
     on conflict (device_id, key_name) do update set \
     ts = excluded.ts, data_side = excluded.data_side, value_type = excluded.value_type, \
     value_bool = excluded.value_bool, value_double = excluded.value_double, \
     value_string = excluded.value_string, value_json = excluded.value_json \
     where telemetry_latest.ts <= excluded.ts";

pub struct PgTelemetryStore {
    pub pool: PgPool,
}

impl PgTelemetryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TelemetryStore for PgTelemetryStore {
    async fn store_telemetry(&self, message: &RawMessage) -> Result<(), StorageError> {
        let attrs = ds_normalize::normalize(&message.body);
        if attrs.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for (key, value) in attrs.iter() {
            for statement in [INSERT_TELEMETRY, UPSERT_TELEMETRY_LATEST] {
                let columns = ValueColumns::from_value(value);
                sqlx::query(statement)
                    .bind(message.device_id.0)
                    .bind(key)
                    .bind(message.received_at_ms as f64)
                    .bind(message.data_side.as_str())
                    .bind(columns.value_type)
                    .bind(columns.value_bool)
                    .bind(columns.value_double)
                    .bind(columns.value_string)
                    .bind(columns.value_json)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
