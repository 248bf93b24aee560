use async_trait::async_trait;
use domain::{DeviceId, EventKind, RuleGroupId};
use ds_rules::{RuleDispatcher, RuleEngine, RuleEngineError, RuleInvocation};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

fn group(n: u128) -> RuleGroupId {
    RuleGroupId::new(Uuid::from_u128(n))
}

fn device() -> DeviceId {
    DeviceId::new(Uuid::from_u128(7))
}

#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<RuleInvocation>>,
    failing_group: Option<RuleGroupId>,
}

#[async_trait]
impl RuleEngine for RecordingEngine {
    async fn run_rules(&self, invocation: &RuleInvocation) -> Result<(), RuleEngineError> {
        self.calls
            .lock()
            .expect("lock")
            .push(invocation.clone());
        if Some(invocation.group_id) == self.failing_group {
            return Err(RuleEngineError::Engine("condition error".to_string()));
        }
        Ok(())
    }
}

/// 在信号量放行前阻塞的引擎。
struct GatedEngine {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl RuleEngine for GatedEngine {
    async fn run_rules(&self, _invocation: &RuleInvocation) -> Result<(), RuleEngineError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| RuleEngineError::Engine(err.to_string()))?;
        Ok(())
    }
}

struct SlowEngine;

#[async_trait]
impl RuleEngine for SlowEngine {
    async fn run_rules(&self, _invocation: &RuleInvocation) -> Result<(), RuleEngineError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

struct PanickingEngine;

#[async_trait]
impl RuleEngine for PanickingEngine {
    async fn run_rules(&self, invocation: &RuleInvocation) -> Result<(), RuleEngineError> {
        if invocation.group_id == group(9) {
            panic!("engine bug");
        }
        Ok(())
    }
}

#[tokio::test]
async fn dispatch_invokes_each_group_once() {
    let engine = Arc::new(RecordingEngine::default());
    let dispatcher = RuleDispatcher::new(engine.clone());
    let groups = BTreeSet::from([group(3), group(9)]);
    let document = Arc::new(json!({ "temp": 21.5 }));

    let summary = dispatcher
        .dispatch(&groups, document, device(), EventKind::Normal)
        .wait()
        .await
        .expect("summary");

    assert_eq!(summary.invoked, 2);
    assert_eq!(summary.succeeded, 2);
    assert!(summary.is_success());
    let calls = engine.calls.lock().expect("lock");
    let invoked: BTreeSet<_> = calls.iter().map(|call| call.group_id).collect();
    assert_eq!(invoked, groups);
    assert!(calls.iter().all(|call| call.event_kind == EventKind::Normal));
    assert!(calls.iter().all(|call| call.document["temp"] == json!(21.5)));
}

#[tokio::test]
async fn dispatch_returns_before_invocations_complete() {
    let gate = Arc::new(Semaphore::new(0));
    let dispatcher = RuleDispatcher::new(Arc::new(GatedEngine { gate: gate.clone() }));
    let groups = BTreeSet::from([group(3), group(9)]);

    let handle = dispatcher.dispatch(&groups, Arc::new(json!({})), device(), EventKind::Normal);
    tokio::task::yield_now().await;
    assert!(!handle.is_finished());

    gate.add_permits(2);
    let summary = handle.wait().await.expect("summary");
    assert_eq!(summary.succeeded, 2);
}

#[tokio::test]
async fn failures_are_collected_per_group() {
    let engine = Arc::new(RecordingEngine {
        failing_group: Some(group(9)),
        ..RecordingEngine::default()
    });
    let dispatcher = RuleDispatcher::new(engine);
    let groups = BTreeSet::from([group(3), group(9)]);

    let summary = dispatcher
        .dispatch(&groups, Arc::new(json!({})), device(), EventKind::Normal)
        .wait()
        .await
        .expect("summary");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, group(9));
    assert!(matches!(summary.failed[0].1, RuleEngineError::Engine(_)));
}

#[tokio::test]
async fn timeout_counts_as_failure() {
    let dispatcher = RuleDispatcher::new(Arc::new(SlowEngine))
        .with_timeout(Some(Duration::from_millis(20)));
    let groups = BTreeSet::from([group(3)]);

    let summary = dispatcher
        .dispatch(&groups, Arc::new(json!({})), device(), EventKind::Normal)
        .wait()
        .await
        .expect("summary");

    assert_eq!(summary.failed.len(), 1);
    assert!(matches!(summary.failed[0].1, RuleEngineError::Timeout(20)));
}

#[tokio::test]
async fn panicking_invocation_is_reported() {
    let dispatcher = RuleDispatcher::new(Arc::new(PanickingEngine));
    let groups = BTreeSet::from([group(3), group(9)]);

    let summary = dispatcher
        .dispatch(&groups, Arc::new(json!({})), device(), EventKind::Normal)
        .wait()
        .await
        .expect("summary");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, group(9));
    assert!(matches!(summary.failed[0].1, RuleEngineError::Panicked));
}

#[tokio::test]
async fn empty_group_set_dispatches_nothing() {
    let engine = Arc::new(RecordingEngine::default());
    let dispatcher = RuleDispatcher::new(engine.clone());

    let summary = dispatcher
        .dispatch(&BTreeSet::new(), Arc::new(json!({})), device(), EventKind::Normal)
        .wait()
        .await
        .expect("summary");

    assert_eq!(summary.invoked, 0);
    assert!(engine.calls.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn drain_waits_for_finished_dispatches() {
    let engine = Arc::new(RecordingEngine::default());
    let dispatcher = RuleDispatcher::new(engine.clone());
    let groups = BTreeSet::from([group(3), group(9)]);

    // 句柄直接丢弃，仍由分发器跟踪
    drop(dispatcher.dispatch(&groups, Arc::new(json!({})), device(), EventKind::Normal));

    let abandoned = dispatcher.drain(Duration::from_secs(5)).await;
    assert_eq!(abandoned, 0);
    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(engine.calls.lock().expect("lock").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn drain_reports_invocations_past_grace() {
    let dispatcher = RuleDispatcher::new(Arc::new(SlowEngine));
    let groups = BTreeSet::from([group(3), group(9)]);
    let before = ds_telemetry::metrics().snapshot();

    drop(dispatcher.dispatch(&groups, Arc::new(json!({})), device(), EventKind::Normal));

    let abandoned = dispatcher.drain(Duration::from_millis(100)).await;
    assert_eq!(abandoned, 2);
    assert_eq!(dispatcher.in_flight(), 2);
    let after = ds_telemetry::metrics().snapshot();
    assert!(after.rule_abandoned >= before.rule_abandoned + 2);
}
