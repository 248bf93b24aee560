//! 接入链路装配
//!
//! 按配置选择存储后端（Postgres / Redis 或内存），组装 [`DataStreamHandler`]，
//! 并把消息源接到分片工作池上。

use ds_config::{AppConfig, MembershipFailureMode};
use ds_ingest::{
    BusChannel, BusMessage, IngestError, MessageHandler, MqttSource, MqttSourceConfig,
    NoopSource, Source, WorkerPool,
};
use ds_pipeline::{
    AttributeOutcome, AttributeWriter, DataStreamHandler, DeviceActivity, MembershipCache,
    MembershipFailurePolicy, TelemetryOutcome,
};
use ds_rules::{LoggingRuleEngine, RuleDispatcher};
use ds_storage::{
    AttributeStore, DEFAULT_MAX_CONNECTIONS, DeviceActivityStore, DeviceRegistry,
    InMemoryActivityStore, InMemoryAttributeStore, InMemoryDeviceRegistry,
    InMemoryRuleGroupStore, InMemoryTelemetryStore, PgAttributeStore, PgDeviceRegistry,
    PgRuleGroupStore, PgTelemetryStore, RedisActivityStore, RuleGroupStore, StorageError,
    TelemetryStore, connect_pool,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 接入链路消费的全部存储。
pub struct Stores {
    pub devices: Arc<dyn DeviceRegistry>,
    pub activity: Arc<dyn DeviceActivityStore>,
    pub rule_groups: Arc<dyn RuleGroupStore>,
    pub attributes: Arc<dyn AttributeStore>,
    pub telemetry: Arc<dyn TelemetryStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            devices: Arc::new(InMemoryDeviceRegistry::new()),
            activity: Arc::new(InMemoryActivityStore::new()),
            rule_groups: Arc::new(InMemoryRuleGroupStore::new()),
            attributes: Arc::new(InMemoryAttributeStore::new()),
            telemetry: Arc::new(InMemoryTelemetryStore::new()),
        }
    }
}

pub async fn build_stores(config: &AppConfig) -> Result<Stores, StorageError> {
    let mut stores = Stores::in_memory();
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = connect_pool(url, DEFAULT_MAX_CONNECTIONS).await?;
            stores.devices = Arc::new(PgDeviceRegistry::new(pool.clone()));
            stores.rule_groups = Arc::new(PgRuleGroupStore::new(pool.clone()));
            stores.attributes = Arc::new(PgAttributeStore::new(pool.clone()));
            stores.telemetry = Arc::new(PgTelemetryStore::new(pool));
            info!(target: "ds.ingest", "storage backend: postgres");
        }
        None => info!(target: "ds.ingest", "storage backend: in-memory (DS_DATABASE_URL unset)"),
    }
    if let Some(url) = config.redis_url.as_deref() {
        stores.activity = Arc::new(RedisActivityStore::connect(
            url,
            config.redis_activity_ttl_seconds,
        )?);
        info!(target: "ds.ingest", "activity backend: redis");
    }
    Ok(stores)
}

pub fn build_handler(config: &AppConfig, stores: Stores) -> DataStreamHandler {
    let membership = Arc::new(MembershipCache::with_ttl(
        stores.rule_groups,
        Duration::from_secs(config.rule_cache_ttl_seconds),
    ));
    let dispatcher = RuleDispatcher::new(Arc::new(LoggingRuleEngine))
        .with_timeout(config.rule_timeout_ms.map(Duration::from_millis));
    DataStreamHandler::new(
        stores.devices,
        DeviceActivity::new(stores.activity),
        AttributeWriter::new(stores.attributes),
        membership,
        dispatcher,
        stores.telemetry,
    )
    .with_failure_policy(failure_policy(config.membership_failure))
}

fn failure_policy(mode: MembershipFailureMode) -> MembershipFailurePolicy {
    match mode {
        MembershipFailureMode::Store => MembershipFailurePolicy::StoreTelemetry,
        MembershipFailureMode::Fail => MembershipFailurePolicy::Fail,
    }
}

/// 把总线消息按通道路由到两个入口。
pub struct PipelineMessageHandler {
    handler: DataStreamHandler,
}

impl PipelineMessageHandler {
    pub fn new(handler: DataStreamHandler) -> Self {
        Self { handler }
    }
}

#[async_trait::async_trait]
impl MessageHandler for PipelineMessageHandler {
    async fn handle(&self, bus: BusMessage) -> Result<(), IngestError> {
        let device_id = bus.message.device_id;
        match bus.channel {
            BusChannel::AttributeData => {
                let outcome = self
                    .handler
                    .store_attribute_data(bus.message)
                    .await
                    .map_err(|err| {
                        warn!(target: "ds.ingest", device_id = %device_id, error = %err, "attribute_data_failed");
                        IngestError::Handler(err.to_string())
                    })?;
                if let AttributeOutcome::Written(result) = outcome {
                    debug!(
                        target: "ds.ingest",
                        device_id = %device_id,
                        complete = result.is_complete(),
                        "attribute_data_handled"
                    );
                }
            }
            BusChannel::TelemetryData => {
                let outcome = self
                    .handler
                    .store_telemetry_data(bus.message)
                    .await
                    .map_err(|err| {
                        warn!(target: "ds.ingest", device_id = %device_id, error = %err, "telemetry_data_failed");
                        IngestError::Handler(err.to_string())
                    })?;
                // 句柄不保留：监督任务由分发器跟踪，关停时统一限时等待
                if let TelemetryOutcome::Dispatched { groups, .. } = outcome {
                    debug!(
                        target: "ds.ingest",
                        device_id = %device_id,
                        groups = groups.len(),
                        "telemetry_data_handled"
                    );
                }
            }
        }
        Ok(())
    }
}

pub struct IngestRuntime {
    pub pool: Arc<WorkerPool>,
    pub source: JoinHandle<()>,
}

/// 启动工作池与消息源任务。
pub fn spawn_ingest(config: &AppConfig, handler: DataStreamHandler) -> IngestRuntime {
    let handler = Arc::new(PipelineMessageHandler::new(handler));
    let pool = Arc::new(WorkerPool::start(
        handler,
        config.workers,
        config.queue_capacity,
    ));

    let source: Arc<dyn Source> = if config.ingest_enabled {
        let mqtt_config = MqttSourceConfig {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            username: config.mqtt_username.clone(),
            password: config.mqtt_password.clone(),
            topic_prefix: config.mqtt_topic_prefix.clone(),
        };
        info!(
            target: "ds.ingest",
            "ingest source: mqtt {}:{} prefix={}",
            mqtt_config.host, mqtt_config.port, mqtt_config.topic_prefix
        );
        Arc::new(MqttSource::new(mqtt_config))
    } else {
        info!(target: "ds.ingest", "ingest source: noop (DS_INGEST=off)");
        Arc::new(NoopSource)
    };

    let sink = pool.clone();
    let source = tokio::spawn(async move {
        if let Err(err) = source.run(sink).await {
            warn!(target: "ds.ingest", error = %err, "ingest_stopped");
        }
    });
    IngestRuntime { pool, source }
}
