//! Postgres 最新属性实现
//!
//! 外层事务保证一次调用为一个逻辑单元；每个字段在独立 savepoint 中执行，
//! 被拒绝的字段只回滚自身，不影响同批其他字段。

use super::ValueColumns;
use crate::error::StorageError;
use crate::models::AttributeUpsertOutcome;
use crate::traits::AttributeStore;
use crate::validation::ensure_key;
use domain::{AttributeSet, DataSide, DeviceId};
use sqlx::{Connection, PgPool};

const UPSERT_ATTRIBUTE: &str = "insert into attribute_latest \
     (device_id, key_name, data_side, value_type, value_bool, value_double, value_string, value_json, updated_at) \
     values ($1, $2, $3, $4, $5, $6, $7, $8, now()) \
     on conflict (device_id, key_name) do update set \
     data_side = excluded.data_side, value_type = excluded.value_type, \
     value_bool = excluded.value_bool, value_double = excluded.value_double, \
     value_string = excluded.value_string, value_json = excluded.value_json, \
     updated_at = excluded.updated_at";

pub struct PgAttributeStore {
    pub pool: PgPool,
}

impl PgAttributeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AttributeStore for PgAttributeStore {
    async fn upsert_attributes(
        &self,
        device_id: DeviceId,
        data_side: DataSide,
        attrs: &AttributeSet,
    ) -> Result<AttributeUpsertOutcome, StorageError> {
        let mut outcome = AttributeUpsertOutcome::default();
        if attrs.is_empty() {
            return Ok(outcome);
        }
        let mut tx = self.pool.begin().await?;
        for (key, value) in attrs.iter() {
            if let Err(err) = ensure_key(key) {
                outcome.rejected.insert(key.clone(), err.to_string());
                continue;
            }
            let columns = ValueColumns::from_value(value);
            let mut savepoint = (&mut *tx).begin().await?;
            let result = sqlx::query(UPSERT_ATTRIBUTE)
                .bind(device_id.0)
                .bind(key)
                .bind(data_side.as_str())
                .bind(columns.value_type)
                .bind(columns.value_bool)
                .bind(columns.value_double)
                .bind(columns.value_string)
                .bind(columns.value_json)
                .execute(&mut *savepoint)
                .await;
            match result {
                Ok(_) => {
                    savepoint.commit().await?;
                    outcome.succeeded += 1;
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    outcome.rejected.insert(key.clone(), err.to_string());
                }
            }
        }
        tx.commit().await?;
        Ok(outcome)
    }
}
