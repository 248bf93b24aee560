use async_trait::async_trait;
use domain::{DataSide, DeviceId, DynamicValue, EventKind, RawMessage, RuleGroupId};
use ds_pipeline::{
    AttributeOutcome, AttributeWriter, DataStreamHandler, DeviceActivity, MembershipCache,
    MembershipFailurePolicy, PipelineError, TelemetryOutcome,
};
use ds_rules::{RuleDispatcher, RuleEngine, RuleEngineError, RuleInvocation};
use ds_storage::{
    DeviceRecord, InMemoryActivityStore, InMemoryAttributeStore, InMemoryDeviceRegistry,
    InMemoryRuleGroupStore, InMemoryTelemetryStore, RuleGroupStore, StorageError,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn device(n: u128) -> DeviceId {
    DeviceId::new(Uuid::from_u128(n))
}

fn group(n: u128) -> RuleGroupId {
    RuleGroupId::new(Uuid::from_u128(n))
}

fn message(device_id: DeviceId, body: serde_json::Value) -> RawMessage {
    let object = body.as_object().cloned().unwrap_or_default();
    RawMessage::from_json_object(device_id, DataSide::Client, object, 1_700_000_000_000)
}

#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<RuleInvocation>>,
}

#[async_trait]
impl RuleEngine for RecordingEngine {
    async fn run_rules(&self, invocation: &RuleInvocation) -> Result<(), RuleEngineError> {
        self.calls
            .lock()
            .expect("lock")
            .push(invocation.clone());
        Ok(())
    }
}

struct BrokenLoader;

#[async_trait]
impl RuleGroupStore for BrokenLoader {
    async fn device_rule_group_ids(
        &self,
        _device_id: DeviceId,
    ) -> Result<BTreeSet<RuleGroupId>, StorageError> {
        Err(StorageError::new("database unavailable"))
    }
}

struct Fixture {
    devices: Arc<InMemoryDeviceRegistry>,
    activity: Arc<InMemoryActivityStore>,
    attributes: Arc<InMemoryAttributeStore>,
    groups: Arc<InMemoryRuleGroupStore>,
    telemetry: Arc<InMemoryTelemetryStore>,
    engine: Arc<RecordingEngine>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            devices: Arc::new(InMemoryDeviceRegistry::new()),
            activity: Arc::new(InMemoryActivityStore::new()),
            attributes: Arc::new(InMemoryAttributeStore::new()),
            groups: Arc::new(InMemoryRuleGroupStore::new()),
            telemetry: Arc::new(InMemoryTelemetryStore::new()),
            engine: Arc::new(RecordingEngine::default()),
        }
    }

    fn handler(&self) -> DataStreamHandler {
        self.handler_with_loader(self.groups.clone())
    }

    fn handler_with_loader(&self, loader: Arc<dyn RuleGroupStore>) -> DataStreamHandler {
        DataStreamHandler::new(
            self.devices.clone(),
            DeviceActivity::new(self.activity.clone()),
            AttributeWriter::new(self.attributes.clone()),
            Arc::new(MembershipCache::new(loader)),
            RuleDispatcher::new(self.engine.clone()),
            self.telemetry.clone(),
        )
    }

    fn register(&self, device_id: DeviceId, name: &str) {
        self.devices
            .register(DeviceRecord {
                device_id,
                name: name.to_string(),
            })
            .expect("register");
    }
}

#[tokio::test]
async fn attribute_data_is_normalized_and_written() {
    let fixture = Fixture::new();
    fixture.register(device(1), "boiler-1");
    let handler = fixture.handler();

    let outcome = handler
        .store_attribute_data(message(
            device(1),
            json!({ "temp": 21.5, "on": true, "pos": { "lat": 1 }, "gone": null }),
        ))
        .await
        .expect("store");

    let AttributeOutcome::Written(result) = outcome else {
        panic!("expected written outcome");
    };
    assert_eq!(result.succeeded_count, 3);
    assert!(result.is_complete());
    assert_eq!(fixture.attributes.len(), 3);
    assert!(fixture.attributes.get(device(1), "gone").is_none());
    assert_eq!(
        fixture.attributes.get(device(1), "pos").map(|record| record.value),
        Some(DynamicValue::RawStructured(r#"{"lat":1}"#.to_string()))
    );
    let last_seen = DeviceActivity::new(fixture.activity.clone())
        .last_seen_at_ms(device(1))
        .await
        .expect("activity");
    assert_eq!(last_seen, Some(1_700_000_000_000));
}

#[tokio::test]
async fn activity_uses_message_timestamp_and_ignores_older_messages() {
    let fixture = Fixture::new();
    fixture.register(device(1), "boiler-1");
    let handler = fixture.handler();
    let at = |ts_ms: i64| {
        let mut msg = message(device(1), json!({ "temp": 1 }));
        msg.received_at_ms = ts_ms;
        msg
    };

    handler.store_attribute_data(at(2_000)).await.expect("store");
    handler.store_attribute_data(at(1_000)).await.expect("store");

    let last_seen = DeviceActivity::new(fixture.activity.clone())
        .last_seen_at_ms(device(1))
        .await
        .expect("activity");
    assert_eq!(last_seen, Some(2_000));
}

#[tokio::test]
async fn unknown_device_touches_nothing() {
    let fixture = Fixture::new();
    let handler = fixture.handler();

    let outcome = handler
        .store_attribute_data(message(device(404), json!({ "temp": 1 })))
        .await
        .expect("store");

    assert!(matches!(outcome, AttributeOutcome::UnknownDevice));
    assert_eq!(fixture.attributes.call_count(), 0);
    let last_seen = DeviceActivity::new(fixture.activity.clone())
        .last_seen_at_ms(device(404))
        .await
        .expect("activity");
    assert_eq!(last_seen, None);
}

#[tokio::test]
async fn telemetry_without_groups_goes_to_fallback() {
    let fixture = Fixture::new();
    let handler = fixture.handler();

    let outcome = handler
        .store_telemetry_data(message(device(1), json!({ "temp": 21.5 })))
        .await
        .expect("store");

    assert!(matches!(outcome, TelemetryOutcome::Stored));
    assert_eq!(fixture.telemetry.message_count(), 1);
    assert!(fixture.engine.calls.lock().expect("lock").is_empty());

    // 空集合已缓存，第二条消息不再查询
    handler
        .store_telemetry_data(message(device(1), json!({ "temp": 22.0 })))
        .await
        .expect("store");
    assert_eq!(fixture.groups.query_count(), 1);
    assert_eq!(fixture.telemetry.message_count(), 2);
}

#[tokio::test]
async fn telemetry_with_groups_invokes_each_group() {
    let fixture = Fixture::new();
    fixture.groups.bind(device(1), group(3)).expect("bind");
    fixture.groups.bind(device(1), group(9)).expect("bind");
    let handler = fixture.handler();

    let outcome = handler
        .store_telemetry_data(message(device(1), json!({ "temp": 21.5, "pos": [1, 2] })))
        .await
        .expect("store");

    let TelemetryOutcome::Dispatched { groups, handle } = outcome else {
        panic!("expected dispatch");
    };
    assert_eq!(*groups, BTreeSet::from([group(3), group(9)]));
    let summary = handle.wait().await.expect("summary");
    assert_eq!(summary.succeeded, 2);
    assert_eq!(fixture.telemetry.message_count(), 0);

    let calls = fixture.engine.calls.lock().expect("lock");
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| call.event_kind == EventKind::Normal));
    assert!(calls.iter().all(|call| call.device_id == device(1)));
    assert_eq!(calls[0].document["pos"], json!([1, 2]));
}

#[tokio::test]
async fn membership_failure_falls_back_by_default() {
    let fixture = Fixture::new();
    let handler = fixture.handler_with_loader(Arc::new(BrokenLoader));

    let outcome = handler
        .store_telemetry_data(message(device(1), json!({ "temp": 21.5 })))
        .await
        .expect("store");

    assert!(matches!(outcome, TelemetryOutcome::Stored));
    assert_eq!(fixture.telemetry.message_count(), 1);
}

#[tokio::test]
async fn membership_failure_can_be_surfaced() {
    let fixture = Fixture::new();
    let handler = fixture
        .handler_with_loader(Arc::new(BrokenLoader))
        .with_failure_policy(MembershipFailurePolicy::Fail);

    let err = handler
        .store_telemetry_data(message(device(1), json!({ "temp": 21.5 })))
        .await
        .expect_err("fails");

    assert!(matches!(err, PipelineError::Membership(_)));
    assert_eq!(fixture.telemetry.message_count(), 0);
}

#[tokio::test]
async fn fallback_store_failure_is_returned() {
    let fixture = Fixture::new();
    fixture.telemetry.set_failing(true);
    let handler = fixture.handler();

    let err = handler
        .store_telemetry_data(message(device(1), json!({ "temp": 21.5 })))
        .await
        .expect_err("fails");

    assert!(matches!(err, PipelineError::Store(_)));
}
