//! 存储接口 Trait 定义
//!
//! 接入链路消费的外部持久化接口：
//! - DeviceRegistry：设备注册表查询
//! - RuleGroupStore：设备绑定的规则组
//! - AttributeStore：最新属性 upsert
//! - TelemetryStore：遥测兜底存储（追加写）
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发
//! - 后端自身线程安全，调用方无需加锁

use crate::error::StorageError;
use crate::models::{AttributeUpsertOutcome, DeviceRecord};
use async_trait::async_trait;
use domain::{AttributeSet, DataSide, DeviceId, RawMessage, RuleGroupId};
use std::collections::BTreeSet;

/// 设备注册表接口
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// 根据 ID 查找设备，不存在时返回 None
    async fn find_device(&self, device_id: DeviceId) -> Result<Option<DeviceRecord>, StorageError>;
}

/// 规则组绑定接口
#[async_trait]
pub trait RuleGroupStore: Send + Sync {
    /// 查询设备绑定的全部规则组 ID（可能为空集合）
    async fn device_rule_group_ids(
        &self,
        device_id: DeviceId,
    ) -> Result<BTreeSet<RuleGroupId>, StorageError>;
}

/// 属性存储接口
///
/// 整个集合作为一次逻辑写入，但各字段可被独立拒绝。
/// 字段级拒绝放入 `AttributeUpsertOutcome.rejected`；
/// 只有整体失败（连接中断等）才返回 `Err`。
#[async_trait]
pub trait AttributeStore: Send + Sync {
    async fn upsert_attributes(
        &self,
        device_id: DeviceId,
        data_side: DataSide,
        attrs: &AttributeSet,
    ) -> Result<AttributeUpsertOutcome, StorageError>;
}

/// 遥测兜底存储接口
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// 持久化追加一条遥测消息
    async fn store_telemetry(&self, message: &RawMessage) -> Result<(), StorageError>;
}
