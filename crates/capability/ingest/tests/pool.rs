use async_trait::async_trait;
use domain::{DataSide, DeviceId, RawMessage};
use ds_ingest::{BusChannel, BusMessage, IngestError, MessageHandler, NoopSource, Source, WorkerPool};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use uuid::Uuid;

fn bus(device: u128, seq: i64) -> BusMessage {
    BusMessage {
        channel: BusChannel::TelemetryData,
        message: RawMessage::new(
            DeviceId::new(Uuid::from_u128(device)),
            DataSide::Client,
            BTreeMap::new(),
            seq,
        ),
    }
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(DeviceId, i64)>>,
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, message: BusMessage) -> Result<(), IngestError> {
        tokio::task::yield_now().await;
        self.seen
            .lock()
            .expect("lock")
            .push((message.message.device_id, message.message.received_at_ms));
        Ok(())
    }
}

/// 拿到许可前阻塞的处理器。
struct Gated {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl MessageHandler for Gated {
    async fn handle(&self, _message: BusMessage) -> Result<(), IngestError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| IngestError::Handler(err.to_string()))?;
        permit.forget();
        Ok(())
    }
}

#[tokio::test]
async fn per_device_order_is_preserved() {
    let recorder = Arc::new(Recorder::default());
    let pool = WorkerPool::start(recorder.clone(), 4, 8);

    for seq in 0..20 {
        for device in 1..=3 {
            pool.submit(bus(device, seq)).await.expect("submit");
        }
    }
    pool.shutdown().await;

    let seen = recorder.seen.lock().expect("lock");
    assert_eq!(seen.len(), 60);
    for device in 1..=3 {
        let id = DeviceId::new(Uuid::from_u128(device));
        let order: Vec<i64> = seen
            .iter()
            .filter(|(seen_id, _)| *seen_id == id)
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(order, (0..20).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn full_queue_reports_backpressure() {
    let gate = Arc::new(Semaphore::new(0));
    let pool = WorkerPool::start(Arc::new(Gated { gate: gate.clone() }), 1, 1);

    // 第一条被分片取走并阻塞，第二条占满队列
    pool.try_submit(bus(1, 0)).expect("first");
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    pool.try_submit(bus(1, 1)).expect("second");

    let err = pool.try_submit(bus(1, 2)).expect_err("full");
    assert!(matches!(err, IngestError::Backpressure(0)));

    gate.add_permits(2);
    pool.shutdown().await;
}

#[tokio::test]
async fn submit_after_shutdown_is_closed() {
    let pool = WorkerPool::start(Arc::new(Recorder::default()), 2, 4);
    pool.shutdown().await;

    let err = pool.submit(bus(1, 0)).await.expect_err("closed");
    assert!(matches!(err, IngestError::Closed));
}

#[tokio::test]
async fn same_device_always_maps_to_same_shard() {
    let pool = WorkerPool::start(Arc::new(Recorder::default()), 8, 4);
    let id = DeviceId::new(Uuid::from_u128(99));
    let shard = pool.shard_of(id);
    assert!(shard < pool.shards());
    assert!((0..10).all(|_| pool.shard_of(id) == shard));
    pool.shutdown().await;
}

#[tokio::test]
async fn noop_source_returns_immediately() {
    let pool = Arc::new(WorkerPool::start(Arc::new(Recorder::default()), 1, 1));
    NoopSource.run(pool.clone()).await.expect("run");
    pool.shutdown().await;
}
