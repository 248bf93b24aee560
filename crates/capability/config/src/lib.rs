//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 规则组成员关系加载失败时的遥测处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipFailureMode {
    /// 回退到兜底存储（默认）。
    Store,
    /// 该条消息处理失败。
    Fail,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub redis_activity_ttl_seconds: u64,
    pub ingest_enabled: bool,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub rule_cache_ttl_seconds: u64,
    pub rule_timeout_ms: Option<u64>,
    pub membership_failure: MembershipFailureMode,
    pub metrics_log_interval_seconds: u64,
    /// 关停时等待在途规则调用的宽限期。
    pub shutdown_grace_ms: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = read_optional("DS_DATABASE_URL");
        let redis_url = read_optional("DS_REDIS_URL");
        let redis_activity_ttl_seconds =
            read_u64_with_default("DS_REDIS_ACTIVITY_TTL_SECONDS", 600)?;
        let ingest_enabled = read_bool_with_default("DS_INGEST", false);
        let mqtt_host = env::var("DS_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("DS_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("DS_MQTT_USERNAME");
        let mqtt_password = read_optional("DS_MQTT_PASSWORD");
        let mqtt_topic_prefix =
            env::var("DS_MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "iot/datastream".to_string());
        let workers = read_positive_usize_with_default("DS_WORKERS", 8)?;
        let queue_capacity = read_positive_usize_with_default("DS_QUEUE_CAPACITY", 256)?;
        let rule_cache_ttl_seconds = read_u64_with_default("DS_RULE_CACHE_TTL_SECONDS", 300)?;
        let rule_timeout_ms =
            Some(read_u64_with_default("DS_RULE_TIMEOUT_MS", 0)?).filter(|value| *value > 0);
        let membership_failure = read_membership_failure("DS_MEMBERSHIP_FAILURE")?;
        let metrics_log_interval_seconds =
            read_u64_with_default("DS_METRICS_LOG_INTERVAL_SECONDS", 60)?;
        let shutdown_grace_ms = read_u64_with_default("DS_SHUTDOWN_GRACE_MS", 5000)?;

        Ok(Self {
            database_url,
            redis_url,
            redis_activity_ttl_seconds,
            ingest_enabled,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic_prefix,
            workers,
            queue_capacity,
            rule_cache_ttl_seconds,
            rule_timeout_ms,
            membership_failure,
            metrics_log_interval_seconds,
            shutdown_grace_ms,
        })
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 读取必须大于 0 的 usize（池大小、队列容量）。
fn read_positive_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_membership_failure(key: &str) -> Result<MembershipFailureMode, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(MembershipFailureMode::Store),
    };
    match value.to_ascii_lowercase().as_str() {
        "store" => Ok(MembershipFailureMode::Store),
        "fail" => Ok(MembershipFailureMode::Fail),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
