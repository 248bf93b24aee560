//! 规则组成员关系缓存。
//!
//! 按设备缓存其绑定的规则组集合，键为 `ruleid_{device_id}`。
//! 每个键持有一把异步锁：并发未命中时只有一个加载在途，其余等待后直接读取结果。
//! 空集合同样缓存，TTL 内不会重复查询。加载失败不写入任何条目。

use crate::PipelineError;
use domain::{DeviceId, RuleGroupId};
use ds_storage::RuleGroupStore;
use ds_telemetry::{record_cache_hit, record_cache_load_failure, record_cache_miss};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 默认 TTL：5 分钟。
pub const DEFAULT_MEMBERSHIP_TTL: Duration = Duration::from_secs(300);

const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// 缓存键。
pub fn cache_key(device_id: DeviceId) -> String {
    format!("ruleid_{}", device_id)
}

struct Entry {
    groups: Arc<BTreeSet<RuleGroupId>>,
    fetched_at: Instant,
}

type Slot = Arc<tokio::sync::Mutex<Option<Entry>>>;

/// 规则组成员关系读穿缓存。
pub struct MembershipCache {
    loader: Arc<dyn RuleGroupStore>,
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl MembershipCache {
    pub fn new(loader: Arc<dyn RuleGroupStore>) -> Self {
        Self::with_ttl(loader, DEFAULT_MEMBERSHIP_TTL)
    }

    pub fn with_ttl(loader: Arc<dyn RuleGroupStore>, ttl: Duration) -> Self {
        Self {
            loader,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// 查询设备的规则组集合：命中且未过期时无 I/O，否则加载并回填。
    pub async fn get_group_ids(
        &self,
        device_id: DeviceId,
    ) -> Result<Arc<BTreeSet<RuleGroupId>>, PipelineError> {
        let key = cache_key(device_id);
        let slot = self.slot(&key)?;
        let mut entry = slot.lock().await;
        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                record_cache_hit();
                return Ok(cached.groups.clone());
            }
        }

        record_cache_miss();
        let groups = self
            .loader
            .device_rule_group_ids(device_id)
            .await
            .map_err(|err| {
                record_cache_load_failure();
                warn!(target: "ds.pipeline", key = %key, error = %err, "membership_load_failed");
                PipelineError::Membership(err.to_string())
            })?;
        let groups = Arc::new(groups);
        debug!(target: "ds.pipeline", key = %key, groups = groups.len(), "membership_loaded");
        *entry = Some(Entry {
            groups: groups.clone(),
            fetched_at: Instant::now(),
        });
        Ok(groups)
    }

    /// 失效单个设备的条目（规则组绑定变更时调用）。
    pub fn invalidate(&self, device_id: DeviceId) -> Result<bool, PipelineError> {
        let mut slots = self.lock_slots()?;
        Ok(slots.remove(&cache_key(device_id)).is_some())
    }

    pub fn clear(&self) -> Result<(), PipelineError> {
        self.lock_slots()?.clear();
        Ok(())
    }

    /// 清理已过期或从未填充的空闲条目，返回清理数量。
    pub fn purge_expired(&self) -> Result<usize, PipelineError> {
        let ttl = self.ttl;
        let mut slots = self.lock_slots()?;
        let before = slots.len();
        slots.retain(|_, slot| match slot.try_lock() {
            Ok(entry) => entry
                .as_ref()
                .is_some_and(|cached| cached.fetched_at.elapsed() < ttl),
            // 加载在途，保留
            Err(_) => true,
        });
        Ok(before - slots.len())
    }

    /// 按 TTL 周期清理过期条目，与指标输出无关。
    ///
    /// 遥测链路不校验设备是否注册，任意设备 ID 都会占用一个条目，需要持续回收。
    pub fn spawn_purger(self: Arc<Self>) -> JoinHandle<()> {
        let every = self.ttl.max(MIN_PURGE_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.purge_expired() {
                    Ok(0) => {}
                    Ok(purged) => {
                        debug!(target: "ds.pipeline", purged, "membership_purged");
                    }
                    Err(err) => {
                        warn!(target: "ds.pipeline", error = %err, "membership_purge_failed");
                    }
                }
            }
        })
    }

    /// 当前条目数。
    pub fn len(&self) -> Result<usize, PipelineError> {
        Ok(self.lock_slots()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, PipelineError> {
        Ok(self.len()? == 0)
    }

    fn slot(&self, key: &str) -> Result<Slot, PipelineError> {
        let mut slots = self.lock_slots()?;
        let slot = slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)));
        Ok(slot.clone())
    }

    fn lock_slots(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Slot>>, PipelineError> {
        self.slots
            .lock()
            .map_err(|_| PipelineError::Cache("lock failed".to_string()))
    }
}
