//! Postgres 规则组绑定实现

use crate::error::StorageError;
use crate::traits::RuleGroupStore;
use domain::{DeviceId, RuleGroupId};
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;
use uuid::Uuid;

pub struct PgRuleGroupStore {
    pub pool: PgPool,
}

impl PgRuleGroupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RuleGroupStore for PgRuleGroupStore {
    async fn device_rule_group_ids(
        &self,
        device_id: DeviceId,
    ) -> Result<BTreeSet<RuleGroupId>, StorageError> {
        let rows = sqlx::query("select distinct flow_rule_id from device_rule where device_id = $1")
            .bind(device_id.0)
            .fetch_all(&self.pool)
            .await?;
        let mut groups = BTreeSet::new();
        for row in rows {
            let id: Uuid = row.try_get("flow_rule_id")?;
            groups.insert(RuleGroupId::new(id));
        }
        Ok(groups)
    }
}
