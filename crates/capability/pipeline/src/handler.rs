//! 属性 / 遥测数据入口。
//!
//! 两个入口跨调用无状态，状态只存在于成员关系缓存与存储中。
//!
//! - 属性：未知设备 → 静默忽略；否则记录活跃 → 规整 → 写入 → 报告字段失败
//! - 遥测：查询规则组（缓存）→ 有规则组则扇出到规则引擎（不等待），否则写兜底存储（等待）

use crate::activity::DeviceActivity;
use crate::dispatch::{DispatchTarget, decide};
use crate::membership::MembershipCache;
use crate::PipelineError;
use crate::writer::{AttributeWriter, WriteResult};
use domain::{EventKind, RawMessage, RuleGroupId};
use ds_normalize::{dropped_count, normalize, to_document};
use ds_rules::{DispatchHandle, RuleDispatcher};
use ds_storage::{DeviceRegistry, TelemetryStore};
use ds_telemetry::{
    record_attribute_fields, record_attribute_message, record_fallback_failure,
    record_fallback_stored, record_fields_dropped, record_telemetry_message,
    record_unknown_device,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 规则组成员关系加载失败时的遥测处理策略。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MembershipFailurePolicy {
    /// 回退到兜底存储，样本不丢失。
    #[default]
    StoreTelemetry,
    /// 向调用方返回错误。
    Fail,
}

/// 属性入口的处理结果。
#[derive(Debug)]
pub enum AttributeOutcome {
    UnknownDevice,
    Written(WriteResult),
}

/// 遥测入口的处理结果。
#[derive(Debug)]
pub enum TelemetryOutcome {
    /// 已向各规则组发起调用；句柄可丢弃。
    Dispatched {
        groups: Arc<BTreeSet<RuleGroupId>>,
        handle: DispatchHandle,
    },
    Stored,
}

/// 数据流入口。
pub struct DataStreamHandler {
    devices: Arc<dyn DeviceRegistry>,
    activity: DeviceActivity,
    writer: AttributeWriter,
    membership: Arc<MembershipCache>,
    dispatcher: RuleDispatcher,
    fallback: Arc<dyn TelemetryStore>,
    failure_policy: MembershipFailurePolicy,
}

impl DataStreamHandler {
    pub fn new(
        devices: Arc<dyn DeviceRegistry>,
        activity: DeviceActivity,
        writer: AttributeWriter,
        membership: Arc<MembershipCache>,
        dispatcher: RuleDispatcher,
        fallback: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            devices,
            activity,
            writer,
            membership,
            dispatcher,
            fallback,
            failure_policy: MembershipFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: MembershipFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn membership(&self) -> &Arc<MembershipCache> {
        &self.membership
    }

    pub fn dispatcher(&self) -> &RuleDispatcher {
        &self.dispatcher
    }

    /// 属性数据入口。
    pub async fn store_attribute_data(
        &self,
        message: RawMessage,
    ) -> Result<AttributeOutcome, PipelineError> {
        record_attribute_message();
        let device_id = message.device_id;
        let device = self
            .devices
            .find_device(device_id)
            .await
            .map_err(|err| PipelineError::Store(err.to_string()))?;
        let Some(device) = device else {
            record_unknown_device();
            debug!(target: "ds.pipeline", device_id = %device_id, "attribute_device_unknown");
            return Ok(AttributeOutcome::UnknownDevice);
        };

        if let Err(err) = self.activity.record(device_id, message.received_at_ms).await {
            warn!(
                target: "ds.pipeline",
                device_id = %device_id,
                error = %err,
                "device_activity_failed"
            );
        }

        let attrs = normalize(&message.body);
        let dropped = dropped_count(&message.body, &attrs);
        if dropped > 0 {
            record_fields_dropped(dropped as u64);
        }

        let result = self.writer.write(&message, &attrs).await?;
        record_attribute_fields(result.succeeded_count as u64, result.failures.len() as u64);
        for (key, failure) in &result.failures {
            error!(
                target: "ds.pipeline",
                device_id = %device_id,
                key = %key,
                error = %failure.error,
                raw_value = %failure.raw_value,
                "attribute_field_rejected"
            );
        }
        info!(
            target: "ds.pipeline",
            device_id = %device_id,
            device_name = %device.name,
            data_side = message.data_side.as_str(),
            succeeded = result.succeeded_count,
            failed = result.failures.len(),
            dropped = dropped,
            "attribute_data_stored"
        );
        Ok(AttributeOutcome::Written(result))
    }

    /// 遥测数据入口。
    ///
    /// 规则分支在发起调用后即返回，不等待规则引擎完成。
    pub async fn store_telemetry_data(
        &self,
        message: RawMessage,
    ) -> Result<TelemetryOutcome, PipelineError> {
        record_telemetry_message();
        let device_id = message.device_id;
        let target = match self.membership.get_group_ids(device_id).await {
            Ok(groups) => decide(groups),
            Err(err) => match self.failure_policy {
                MembershipFailurePolicy::StoreTelemetry => {
                    warn!(
                        target: "ds.pipeline",
                        device_id = %device_id,
                        error = %err,
                        "membership_unavailable_fallback_store"
                    );
                    DispatchTarget::FallbackStore
                }
                MembershipFailurePolicy::Fail => return Err(err),
            },
        };

        match target {
            DispatchTarget::RuleEngine(groups) => {
                let document = Arc::new(to_document(&message));
                let handle =
                    self.dispatcher
                        .dispatch(&groups, document, device_id, EventKind::Normal);
                info!(
                    target: "ds.pipeline",
                    device_id = %device_id,
                    groups = groups.len(),
                    "telemetry_dispatched"
                );
                Ok(TelemetryOutcome::Dispatched { groups, handle })
            }
            DispatchTarget::FallbackStore => {
                self.fallback
                    .store_telemetry(&message)
                    .await
                    .map_err(|err| {
                        record_fallback_failure();
                        PipelineError::Store(err.to_string())
                    })?;
                record_fallback_stored();
                debug!(
                    target: "ds.pipeline",
                    device_id = %device_id,
                    fields = message.body.len(),
                    "telemetry_stored"
                );
                Ok(TelemetryOutcome::Stored)
            }
        }
    }
}
