//! 规则引擎调用契约与规则组分发器。
//!
//! 规则引擎本身（条件求值、动作执行）是外部协作方，这里只定义调用契约
//! [`RuleEngine`]，以及按规则组并发扇出的 [`RuleDispatcher`]。
//!
//! 分发策略：调用方不等待（detached），但每次扇出都有一个监督任务收集
//! 所有规则组调用的结果，失败 / 超时 / panic 都会以 `warn` 记录并计数，
//! 同时通过 [`DispatchHandle`] 暴露汇总，供需要的调用方（测试）等待。
//! 监督任务由分发器内的 `TaskTracker` 跟踪，关停时 [`RuleDispatcher::drain`]
//! 限时等待在途调用，超时未结束的调用记录日志并计数。

use async_trait::async_trait;
use domain::{DeviceId, EventKind, RuleGroupId};
use ds_telemetry::{
    record_rule_abandoned, record_rule_failure, record_rule_invocation, record_rule_success,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// 规则引擎调用错误。
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuleEngineError {
    #[error("engine error: {0}")]
    Engine(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("invocation panicked")]
    Panicked,
    #[error("supervisor error: {0}")]
    Supervisor(String),
}

/// 单个规则组的一次调用。
#[derive(Debug, Clone)]
pub struct RuleInvocation {
    pub group_id: RuleGroupId,
    pub device_id: DeviceId,
    pub event_kind: EventKind,
    /// 完整遥测文档（各规则组共享同一份）。
    pub document: Arc<serde_json::Value>,
}

/// 外部规则引擎：针对某个设备、某种事件分类，执行规则组 G。
#[async_trait]
pub trait RuleEngine: Send + Sync {
    async fn run_rules(&self, invocation: &RuleInvocation) -> Result<(), RuleEngineError>;
}

/// 空规则引擎（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopRuleEngine;

#[async_trait]
impl RuleEngine for NoopRuleEngine {
    async fn run_rules(&self, _invocation: &RuleInvocation) -> Result<(), RuleEngineError> {
        Ok(())
    }
}

/// 仅记录调用的规则引擎（未接入外部引擎时使用）。
#[derive(Debug, Default)]
pub struct LoggingRuleEngine;

#[async_trait]
impl RuleEngine for LoggingRuleEngine {
    async fn run_rules(&self, invocation: &RuleInvocation) -> Result<(), RuleEngineError> {
        info!(
            target: "ds.rules",
            group_id = %invocation.group_id,
            device_id = %invocation.device_id,
            event_kind = invocation.event_kind.as_str(),
            document = %invocation.document,
            "rule_invocation_logged"
        );
        Ok(())
    }
}

/// 一次扇出的汇总结果。
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub invoked: usize,
    pub succeeded: usize,
    pub failed: Vec<(RuleGroupId, RuleEngineError)>,
}

impl DispatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 扇出监督任务的句柄；丢弃即为 detached，监督任务照常运行。
#[derive(Debug)]
pub struct DispatchHandle {
    join: JoinHandle<DispatchSummary>,
}

impl DispatchHandle {
    /// 等待所有规则组调用结束。
    pub async fn wait(self) -> Result<DispatchSummary, RuleEngineError> {
        self.join
            .await
            .map_err(|err| RuleEngineError::Supervisor(err.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// 规则组分发器。
#[derive(Clone)]
pub struct RuleDispatcher {
    engine: Arc<dyn RuleEngine>,
    timeout: Option<Duration>,
    tracker: TaskTracker,
    /// 尚未返回结果的规则组调用数（跨所有扇出）。
    in_flight: Arc<AtomicUsize>,
}

impl RuleDispatcher {
    pub fn new(engine: Arc<dyn RuleEngine>) -> Self {
        Self {
            engine,
            timeout: None,
            tracker: TaskTracker::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 为每次规则组调用设置超时，超时计为失败。
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// 对每个规则组独立发起一次调用，立即返回。
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn dispatch(
        &self,
        groups: &BTreeSet<RuleGroupId>,
        document: Arc<serde_json::Value>,
        device_id: DeviceId,
        event_kind: EventKind,
    ) -> DispatchHandle {
        let mut set = JoinSet::new();
        for &group_id in groups {
            let engine = self.engine.clone();
            let timeout = self.timeout;
            let invocation = RuleInvocation {
                group_id,
                device_id,
                event_kind,
                document: document.clone(),
            };
            record_rule_invocation();
            set.spawn(async move {
                let result = run_with_timeout(engine.as_ref(), &invocation, timeout).await;
                (group_id, result)
            });
        }
        self.in_flight.fetch_add(groups.len(), Ordering::SeqCst);
        let pending = groups.clone();
        let join = self
            .tracker
            .spawn(supervise(set, pending, device_id, self.in_flight.clone()));
        DispatchHandle { join }
    }

    /// 在途（未返回结果）的规则组调用数。
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 关停时等待所有监督任务结束，最多等待 `grace`。
    ///
    /// 返回宽限期结束时仍未完成的调用数；这些调用以 `warn` 记录并计入放弃计数。
    pub async fn drain(&self, grace: Duration) -> usize {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            debug!(target: "ds.rules", "rule_dispatch_drained");
            return 0;
        }
        let abandoned = self.in_flight();
        record_rule_abandoned(abandoned as u64);
        warn!(
            target: "ds.rules",
            abandoned,
            grace_ms = grace.as_millis() as u64,
            "rule_invocations_abandoned"
        );
        abandoned
    }
}

async fn run_with_timeout(
    engine: &dyn RuleEngine,
    invocation: &RuleInvocation,
    timeout: Option<Duration>,
) -> Result<(), RuleEngineError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, engine.run_rules(invocation))
            .await
            .unwrap_or_else(|_| Err(RuleEngineError::Timeout(limit.as_millis() as u64))),
        None => engine.run_rules(invocation).await,
    }
}

/// 收集所有规则组调用结果；panic 的任务无法携带结果，按剩余未返回的规则组归档。
async fn supervise(
    mut set: JoinSet<(RuleGroupId, Result<(), RuleEngineError>)>,
    mut pending: BTreeSet<RuleGroupId>,
    device_id: DeviceId,
    in_flight: Arc<AtomicUsize>,
) -> DispatchSummary {
    let mut summary = DispatchSummary {
        invoked: pending.len(),
        ..DispatchSummary::default()
    };
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((group_id, Ok(()))) => {
                pending.remove(&group_id);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                summary.succeeded += 1;
                record_rule_success();
                debug!(
                    target: "ds.rules",
                    group_id = %group_id,
                    device_id = %device_id,
                    "rule_invocation_succeeded"
                );
            }
            Ok((group_id, Err(err))) => {
                pending.remove(&group_id);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                record_rule_failure();
                warn!(
                    target: "ds.rules",
                    group_id = %group_id,
                    device_id = %device_id,
                    error = %err,
                    "rule_invocation_failed"
                );
                summary.failed.push((group_id, err));
            }
            Err(err) => {
                warn!(
                    target: "ds.rules",
                    device_id = %device_id,
                    error = %err,
                    "rule_invocation_panicked"
                );
            }
        }
    }
    in_flight.fetch_sub(pending.len(), Ordering::SeqCst);
    for group_id in pending {
        record_rule_failure();
        summary.failed.push((group_id, RuleEngineError::Panicked));
    }
    summary
}
