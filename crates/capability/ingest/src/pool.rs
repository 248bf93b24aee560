//! 按设备分片的有界工作池。
//!
//! 消息路由到 `hash(device_id) % workers` 号分片，每个分片一个任务、一条有界队列。
//! 同一设备的消息按到达顺序串行处理，总并发受 `workers` 限制。

use crate::{BusMessage, IngestError, MessageHandler};
use async_trait::async_trait;
use domain::DeviceId;
use ds_telemetry::{new_trace_id, record_backpressure};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

pub struct WorkerPool {
    senders: RwLock<Vec<mpsc::Sender<BusMessage>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    shards: usize,
}

impl WorkerPool {
    /// 启动 `workers` 个分片，每个分片队列容量为 `capacity`（均至少为 1）。
    pub fn start(handler: Arc<dyn MessageHandler>, workers: usize, capacity: usize) -> Self {
        let shards = workers.max(1);
        let capacity = capacity.max(1);
        let mut senders = Vec::with_capacity(shards);
        let mut handles = Vec::with_capacity(shards);
        for shard in 0..shards {
            let (tx, rx) = mpsc::channel(capacity);
            senders.push(tx);
            handles.push(tokio::spawn(run_shard(shard, rx, handler.clone())));
        }
        info!(target: "ds.ingest", shards, capacity, "worker_pool_started");
        Self {
            senders: RwLock::new(senders),
            workers: tokio::sync::Mutex::new(handles),
            shards,
        }
    }

    pub fn shards(&self) -> usize {
        self.shards
    }

    /// 设备所在分片。
    pub fn shard_of(&self, device_id: DeviceId) -> usize {
        let mut hasher = DefaultHasher::new();
        device_id.hash(&mut hasher);
        (hasher.finish() % self.shards as u64) as usize
    }

    /// 提交消息，分片队列满时等待。
    pub async fn submit(&self, message: BusMessage) -> Result<(), IngestError> {
        let (shard, sender) = self.sender_for(message.message.device_id)?;
        sender
            .send(message)
            .await
            .map_err(|_| IngestError::Closed)?;
        debug!(target: "ds.ingest", shard, "message_queued");
        Ok(())
    }

    /// 非阻塞提交，分片队列满时返回 `Backpressure`。
    pub fn try_submit(&self, message: BusMessage) -> Result<(), IngestError> {
        let (shard, sender) = self.sender_for(message.message.device_id)?;
        match sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                record_backpressure();
                warn!(target: "ds.ingest", shard, "worker_queue_full");
                Err(IngestError::Backpressure(shard))
            }
            Err(TrySendError::Closed(_)) => Err(IngestError::Closed),
        }
    }

    /// 关闭所有队列并等待分片处理完已排队的消息。
    pub async fn shutdown(&self) {
        match self.senders.write() {
            Ok(mut senders) => senders.clear(),
            Err(_) => warn!(target: "ds.ingest", "worker_pool_lock_failed"),
        }
        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(target: "ds.ingest", error = %err, "worker_join_failed");
            }
        }
        info!(target: "ds.ingest", "worker_pool_stopped");
    }

    fn sender_for(
        &self,
        device_id: DeviceId,
    ) -> Result<(usize, mpsc::Sender<BusMessage>), IngestError> {
        let shard = self.shard_of(device_id);
        let senders = self
            .senders
            .read()
            .map_err(|_| IngestError::Closed)?;
        let sender = senders.get(shard).cloned().ok_or(IngestError::Closed)?;
        Ok((shard, sender))
    }
}

#[async_trait]
impl MessageHandler for WorkerPool {
    async fn handle(&self, message: BusMessage) -> Result<(), IngestError> {
        self.submit(message).await
    }
}

async fn run_shard(
    shard: usize,
    mut rx: mpsc::Receiver<BusMessage>,
    handler: Arc<dyn MessageHandler>,
) {
    while let Some(message) = rx.recv().await {
        let span = info_span!(
            target: "ds.ingest",
            "message",
            trace_id = %new_trace_id(),
            channel = message.channel.as_str(),
            device_id = %message.message.device_id,
            shard
        );
        if let Err(err) = handler.handle(message).instrument(span).await {
            warn!(target: "ds.ingest", shard, error = %err, "message_handle_failed");
        }
    }
    debug!(target: "ds.ingest", shard, "worker_stopped");
}
