//! 追踪初始化、消息级 trace_id 与基础计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attribute_messages: u64,
    pub telemetry_messages: u64,
    pub unknown_devices: u64,
    pub attribute_fields_written: u64,
    pub attribute_fields_failed: u64,
    pub fields_dropped: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_load_failures: u64,
    pub rule_invocations: u64,
    pub rule_success: u64,
    pub rule_failure: u64,
    pub rule_abandoned: u64,
    pub fallback_stored: u64,
    pub fallback_failure: u64,
    pub backpressure: u64,
}

/// 基础指标（进程级计数器）。
pub struct TelemetryMetrics {
    attribute_messages: AtomicU64,
    telemetry_messages: AtomicU64,
    unknown_devices: AtomicU64,
    attribute_fields_written: AtomicU64,
    attribute_fields_failed: AtomicU64,
    fields_dropped: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_load_failures: AtomicU64,
    rule_invocations: AtomicU64,
    rule_success: AtomicU64,
    rule_failure: AtomicU64,
    rule_abandoned: AtomicU64,
    fallback_stored: AtomicU64,
    fallback_failure: AtomicU64,
    backpressure: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            attribute_messages: AtomicU64::new(0),
            telemetry_messages: AtomicU64::new(0),
            unknown_devices: AtomicU64::new(0),
            attribute_fields_written: AtomicU64::new(0),
            attribute_fields_failed: AtomicU64::new(0),
            fields_dropped: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_load_failures: AtomicU64::new(0),
            rule_invocations: AtomicU64::new(0),
            rule_success: AtomicU64::new(0),
            rule_failure: AtomicU64::new(0),
            rule_abandoned: AtomicU64::new(0),
            fallback_stored: AtomicU64::new(0),
            fallback_failure: AtomicU64::new(0),
            backpressure: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attribute_messages: self.attribute_messages.load(Ordering::Relaxed),
            telemetry_messages: self.telemetry_messages.load(Ordering::Relaxed),
            unknown_devices: self.unknown_devices.load(Ordering::Relaxed),
            attribute_fields_written: self.attribute_fields_written.load(Ordering::Relaxed),
            attribute_fields_failed: self.attribute_fields_failed.load(Ordering::Relaxed),
            fields_dropped: self.fields_dropped.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_load_failures: self.cache_load_failures.load(Ordering::Relaxed),
            rule_invocations: self.rule_invocations.load(Ordering::Relaxed),
            rule_success: self.rule_success.load(Ordering::Relaxed),
            rule_failure: self.rule_failure.load(Ordering::Relaxed),
            rule_abandoned: self.rule_abandoned.load(Ordering::Relaxed),
            fallback_stored: self.fallback_stored.load(Ordering::Relaxed),
            fallback_failure: self.fallback_failure.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的消息级 trace_id。
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录属性消息接收次数。
pub fn record_attribute_message() {
    metrics().attribute_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录遥测消息接收次数。
pub fn record_telemetry_message() {
    metrics().telemetry_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录未知设备（属性消息被忽略）次数。
pub fn record_unknown_device() {
    metrics().unknown_devices.fetch_add(1, Ordering::Relaxed);
}

/// 记录属性字段写入结果。
pub fn record_attribute_fields(written: u64, failed: u64) {
    let metrics = metrics();
    metrics
        .attribute_fields_written
        .fetch_add(written, Ordering::Relaxed);
    metrics
        .attribute_fields_failed
        .fetch_add(failed, Ordering::Relaxed);
}

/// 记录规整时丢弃的字段数。
pub fn record_fields_dropped(count: u64) {
    metrics().fields_dropped.fetch_add(count, Ordering::Relaxed);
}

pub fn record_cache_hit() {
    metrics().cache_hits.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_miss() {
    metrics().cache_misses.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_load_failure() {
    metrics().cache_load_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录规则组调用发起次数。
pub fn record_rule_invocation() {
    metrics().rule_invocations.fetch_add(1, Ordering::Relaxed);
}

pub fn record_rule_success() {
    metrics().rule_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录规则组调用失败（错误、超时、panic）次数。
pub fn record_rule_failure() {
    metrics().rule_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录关停时未能在宽限期内结束的规则组调用数。
pub fn record_rule_abandoned(count: u64) {
    metrics().rule_abandoned.fetch_add(count, Ordering::Relaxed);
}

/// 记录兜底存储写入成功次数。
pub fn record_fallback_stored() {
    metrics().fallback_stored.fetch_add(1, Ordering::Relaxed);
}

pub fn record_fallback_failure() {
    metrics().fallback_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录背压（队列满）次数。
pub fn record_backpressure() {
    metrics().backpressure.fetch_add(1, Ordering::Relaxed);
}
