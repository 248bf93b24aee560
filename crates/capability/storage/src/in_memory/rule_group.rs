//! 规则组绑定内存实现

use crate::error::StorageError;
use crate::traits::RuleGroupStore;
use domain::{DeviceId, RuleGroupId};
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 规则组绑定内存存储
///
/// 记录查询次数，便于验证缓存命中行为。
#[derive(Default)]
pub struct InMemoryRuleGroupStore {
    bindings: RwLock<HashMap<DeviceId, BTreeSet<RuleGroupId>>>,
    queries: AtomicUsize,
}

impl InMemoryRuleGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为设备绑定规则组
    pub fn bind(&self, device_id: DeviceId, group_id: RuleGroupId) -> Result<(), StorageError> {
        let mut map = self
            .bindings
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.entry(device_id).or_default().insert(group_id);
        Ok(())
    }

    /// 解除设备与规则组的绑定
    pub fn unbind(&self, device_id: DeviceId, group_id: RuleGroupId) -> Result<bool, StorageError> {
        let mut map = self
            .bindings
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map
            .get_mut(&device_id)
            .map(|groups| groups.remove(&group_id))
            .unwrap_or(false))
    }

    /// 累计查询次数（用于测试）
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RuleGroupStore for InMemoryRuleGroupStore {
    async fn device_rule_group_ids(
        &self,
        device_id: DeviceId,
    ) -> Result<BTreeSet<RuleGroupId>, StorageError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let map = self
            .bindings
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(&device_id).cloned().unwrap_or_default())
    }
}
