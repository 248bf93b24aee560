//! 总线接入：消息源、消息处理器契约与分片工作池。
//!
//! - [`Source`]：从总线读取消息并交给 [`MessageHandler`]
//! - [`mqtt`]：MQTT 源，按主题区分属性 / 遥测通道
//! - [`pool`]：按设备分片的有界工作池（同一设备按到达顺序处理）

use async_trait::async_trait;
use domain::RawMessage;
use std::sync::Arc;

pub mod mqtt;
pub mod pool;

pub use mqtt::{MqttSource, MqttSourceConfig, decode_publish};
pub use pool::WorkerPool;

/// 接入错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("handler error: {0}")]
    Handler(String),
    #[error("source error: {0}")]
    Source(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("queue full for shard {0}")]
    Backpressure(usize),
    #[error("worker pool closed")]
    Closed,
}

/// 总线通道。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusChannel {
    AttributeData,
    TelemetryData,
}

impl BusChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusChannel::AttributeData => "attributedata",
            BusChannel::TelemetryData => "telemetrydata",
        }
    }
}

/// 一条带通道的总线消息。
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub channel: BusChannel,
    pub message: RawMessage,
}

/// 总线消息处理器。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: BusMessage) -> Result<(), IngestError>;
}

/// 消息源抽象。
#[async_trait]
pub trait Source: Send + Sync {
    async fn run(&self, handler: Arc<dyn MessageHandler>) -> Result<(), IngestError>;
}

/// 占位源（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopSource;

#[async_trait]
impl Source for NoopSource {
    async fn run(&self, _handler: Arc<dyn MessageHandler>) -> Result<(), IngestError> {
        Ok(())
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
