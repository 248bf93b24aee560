//! 设备数据流接入服务：总线 → 分片工作池 → 属性写入 / 规则分发 / 兜底存储。

mod wiring;

use ds_config::AppConfig;
use ds_telemetry::{init_tracing, metrics};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let stores = wiring::build_stores(&config).await?;
    let handler = wiring::build_handler(&config, stores);
    let membership = handler.membership().clone();
    let dispatcher = handler.dispatcher().clone();
    let purger = membership.clone().spawn_purger();
    let runtime = wiring::spawn_ingest(&config, handler);

    // 周期性输出指标快照
    if config.metrics_log_interval_seconds > 0 {
        let interval = Duration::from_secs(config.metrics_log_interval_seconds);
        let membership = membership.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = metrics().snapshot();
                match membership.len() {
                    Ok(entries) => info!(
                        target: "ds.ingest",
                        metrics = ?snapshot,
                        cache_entries = entries,
                        "metrics_snapshot"
                    ),
                    Err(err) => warn!(
                        target: "ds.ingest",
                        metrics = ?snapshot,
                        error = %err,
                        "metrics_snapshot_cache_unavailable"
                    ),
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!(target: "ds.ingest", "shutdown_requested");
    runtime.source.abort();
    runtime.pool.shutdown().await;
    let abandoned = dispatcher
        .drain(Duration::from_millis(config.shutdown_grace_ms))
        .await;
    purger.abort();
    if let Err(err) = runtime.source.await {
        if !err.is_cancelled() {
            warn!(target: "ds.ingest", error = %err, "source_join_failed");
        }
    }
    info!(target: "ds.ingest", abandoned, "shutdown_complete");
    Ok(())
}
