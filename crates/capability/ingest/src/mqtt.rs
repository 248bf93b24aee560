//! MQTT 消息源。
//!
//! 订阅 `{prefix}/attributedata` 与 `{prefix}/telemetrydata`，载荷为 JSON 信封：
//!
//! ```json
//! { "device_id": "…", "data_side": "client", "body": { "temp": 21.5 } }
//! ```
//!
//! `data_side` 缺省为 `client`。无法解析的信封记录后跳过。

use crate::{BusChannel, BusMessage, IngestError, MessageHandler, Source, now_epoch_ms};
use async_trait::async_trait;
use domain::{DataSide, DeviceId, RawMessage};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// MQTT 源配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    device_id: DeviceId,
    #[serde(default = "default_side")]
    data_side: DataSide,
    body: serde_json::Map<String, serde_json::Value>,
}

fn default_side() -> DataSide {
    DataSide::Client
}

#[derive(Debug, Clone)]
pub struct MqttSource {
    config: MqttSourceConfig,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig) -> Self {
        Self { config }
    }

    fn topic(&self, channel: BusChannel) -> String {
        format!(
            "{}/{}",
            self.config.topic_prefix.trim_end_matches('/'),
            channel.as_str()
        )
    }
}

#[async_trait]
impl Source for MqttSource {
    async fn run(&self, handler: Arc<dyn MessageHandler>) -> Result<(), IngestError> {
        let client_id = format!("ds-ingest-{}", now_epoch_ms());
        let mut options =
            rumqttc::MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = rumqttc::AsyncClient::new(options, 10);
        for channel in [BusChannel::AttributeData, BusChannel::TelemetryData] {
            client
                .subscribe(self.topic(channel), rumqttc::QoS::AtMostOnce)
                .await
                .map_err(|err| IngestError::Source(err.to_string()))?;
        }
        info!(
            target: "ds.ingest",
            host = %self.config.host,
            port = self.config.port,
            prefix = %self.config.topic_prefix,
            "mqtt_subscribed"
        );

        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                    let decoded = decode_publish(
                        &self.config.topic_prefix,
                        &publish.topic,
                        &publish.payload,
                        now_epoch_ms(),
                    );
                    let message = match decoded {
                        Ok(Some(message)) => message,
                        Ok(None) => {
                            warn!(target: "ds.ingest", topic = %publish.topic, "mqtt_topic_skipped");
                            continue;
                        }
                        Err(err) => {
                            warn!(
                                target: "ds.ingest",
                                topic = %publish.topic,
                                error = %err,
                                "mqtt_payload_invalid"
                            );
                            continue;
                        }
                    };
                    if let Err(err) = handler.handle(message).await {
                        warn!(target: "ds.ingest", error = %err, "bus_message_rejected");
                    }
                }
                Ok(_) => {}
                Err(err) => return Err(IngestError::Source(err.to_string())),
            }
        }
    }
}

/// 将一条 MQTT 发布解码为总线消息；主题不属于任何通道时返回 `None`。
pub fn decode_publish(
    prefix: &str,
    topic: &str,
    payload: &[u8],
    received_at_ms: i64,
) -> Result<Option<BusMessage>, IngestError> {
    let Some(channel) = channel_of(prefix, topic) else {
        return Ok(None);
    };
    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|err| IngestError::Decode(err.to_string()))?;
    let message = RawMessage::from_json_object(
        envelope.device_id,
        envelope.data_side,
        envelope.body,
        received_at_ms,
    );
    Ok(Some(BusMessage { channel, message }))
}

fn channel_of(prefix: &str, topic: &str) -> Option<BusChannel> {
    let prefix = prefix.trim_matches('/');
    let topic = topic.trim_matches('/');
    let rest = if prefix.is_empty() {
        topic
    } else {
        topic.strip_prefix(prefix)?.strip_prefix('/')?
    };
    match rest {
        "attributedata" => Some(BusChannel::AttributeData),
        "telemetrydata" => Some(BusChannel::TelemetryData),
        _ => None,
    }
}
