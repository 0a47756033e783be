//! # Runtime Configuration
//!
//! Unified configuration for every coordination component, read from `CL_*`
//! environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `CL_NODE_ID` | `<HOSTNAME or node>-<uuid8>` |
//! | `CL_REDIS_ENDPOINT` | unset (in-memory backends) |
//! | `CL_REDIS_AUTH_ENV` | unset |
//! | `CL_REDIS_POOL_SIZE` | `4` |
//! | `CL_BACKOFF_INITIAL_MS` / `CL_BACKOFF_MULTIPLIER` / `CL_BACKOFF_MAX_MS` | `1000` / `2.0` / `60000` |
//! | `CL_DEDUP_TTL_SECS` | `3600` |
//! | `CL_LOCK_TTL_SECS` / `CL_LOCK_TIMEOUT_SECS` | `30` / `10` |
//! | `CL_MAX_RETRIES` / `CL_MAX_QUEUE_SIZE` | `3` / `10000` |
//! | `CL_PARTITION_SCOPE` | `process` (`shared`) |
//! | `CL_RETRY_SEQUENCING` | `resequence` (`preserve_original`) |
//! | `CL_DEDUP_SWEEP_SECS` / `CL_METRICS_INTERVAL_SECS` | `60` / `15` |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use cl_01_distributed_locks::LockConfig;
use cl_02_message_ordering::{OrderingConfig, PartitionScope, RetrySequencing};
use shared_bus::{BrokerConfig, DedupConfig};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but does not parse.
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },

    /// Values parse but are unusable together.
    #[error("invalid configuration: {0}")]
    Inconsistent(String),
}

/// Store and transport backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Process-local store and hub.
    InMemory,
    /// Shared Redis / KeyDB instance.
    Redis {
        endpoint: String,
        auth_token_env: Option<String>,
        pool_size: usize,
    },
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Identity stamped on published envelopes and lock owners.
    pub node_id: String,
    /// Store and transport backend.
    pub backend: Backend,
    /// Broker reconnect and timeout settings.
    pub broker: BrokerConfig,
    /// Duplicate detector settings.
    pub dedup: DedupConfig,
    /// Lock manager settings.
    pub locks: LockConfig,
    /// Ordering manager settings.
    pub ordering: OrderingConfig,
    /// Interval of the local dedup sweep.
    pub sweep_interval: Duration,
    /// Interval of the metrics snapshot copy.
    pub metrics_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_id: generate_node_id(None),
            backend: Backend::InMemory,
            broker: BrokerConfig::default(),
            dedup: DedupConfig::default(),
            locks: LockConfig::default(),
            ordering: OrderingConfig::default(),
            sweep_interval: Duration::from_secs(60),
            metrics_interval: Duration::from_secs(15),
        }
    }
}

/// `<prefix>-<first 8 hex chars of a v4 uuid>`
pub fn generate_node_id(prefix: Option<&str>) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix.unwrap_or("node"), &uuid[..8])
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(parse::<u64>(lookup, var)?.map(Duration::from_secs))
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(parse::<u64>(lookup, var)?.map(Duration::from_millis))
}

fn parse_scope(value: &str) -> Option<PartitionScope> {
    match value.to_lowercase().as_str() {
        "process" => Some(PartitionScope::Process),
        "shared" => Some(PartitionScope::Shared),
        _ => None,
    }
}

fn parse_retry_sequencing(value: &str) -> Option<RetrySequencing> {
    match value.to_lowercase().as_str() {
        "resequence" => Some(RetrySequencing::Resequence),
        "preserve_original" | "preserve" => Some(RetrySequencing::PreserveOriginal),
        _ => None,
    }
}

impl RuntimeConfig {
    /// Load from the process environment and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup and validate.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.node_id = match lookup("CL_NODE_ID") {
            Some(id) => id,
            None => generate_node_id(lookup("HOSTNAME").as_deref()),
        };

        if let Some(endpoint) = lookup("CL_REDIS_ENDPOINT") {
            config.backend = Backend::Redis {
                endpoint,
                auth_token_env: lookup("CL_REDIS_AUTH_ENV"),
                pool_size: parse(&lookup, "CL_REDIS_POOL_SIZE")?.unwrap_or(4),
            };
        }

        let broker = &mut config.broker;
        if let Some(v) = parse_millis(&lookup, "CL_BACKOFF_INITIAL_MS")? {
            broker.initial_backoff = v;
        }
        if let Some(v) = parse(&lookup, "CL_BACKOFF_MULTIPLIER")? {
            broker.backoff_multiplier = v;
        }
        if let Some(v) = parse_millis(&lookup, "CL_BACKOFF_MAX_MS")? {
            broker.max_backoff = v;
        }

        if let Some(v) = parse_secs(&lookup, "CL_DEDUP_TTL_SECS")? {
            config.dedup.ttl = v;
        }
        if let Some(v) = parse_secs(&lookup, "CL_LOCK_TTL_SECS")? {
            config.locks.default_ttl = v;
        }
        if let Some(v) = parse_secs(&lookup, "CL_LOCK_TIMEOUT_SECS")? {
            config.locks.default_timeout = v;
        }

        let ordering = &mut config.ordering;
        if let Some(v) = parse(&lookup, "CL_MAX_RETRIES")? {
            ordering.max_retries = v;
        }
        if let Some(v) = parse(&lookup, "CL_MAX_QUEUE_SIZE")? {
            ordering.max_queue_size = v;
        }
        if let Some(value) = lookup("CL_PARTITION_SCOPE") {
            ordering.partition_scope = parse_scope(&value).ok_or(ConfigError::Invalid {
                var: "CL_PARTITION_SCOPE",
                value,
            })?;
        }
        if let Some(value) = lookup("CL_RETRY_SEQUENCING") {
            ordering.retry_sequencing =
                parse_retry_sequencing(&value).ok_or(ConfigError::Invalid {
                    var: "CL_RETRY_SEQUENCING",
                    value,
                })?;
        }

        if let Some(v) = parse_secs(&lookup, "CL_DEDUP_SWEEP_SECS")? {
            config.sweep_interval = v;
        }
        if let Some(v) = parse_secs(&lookup, "CL_METRICS_INTERVAL_SECS")? {
            config.metrics_interval = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the components cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Inconsistent(msg.to_string()));

        if self.node_id.trim().is_empty() {
            return fail("node id must not be empty");
        }
        if self.broker.initial_backoff.is_zero() {
            return fail("initial backoff must be positive");
        }
        if !(self.broker.backoff_multiplier >= 1.0 && self.broker.backoff_multiplier.is_finite()) {
            return fail("backoff multiplier must be a finite value >= 1.0");
        }
        if self.broker.max_backoff < self.broker.initial_backoff {
            return fail("max backoff must not be below initial backoff");
        }
        if self.dedup.ttl.is_zero() {
            return fail("dedup ttl must be positive");
        }
        if self.locks.default_ttl.is_zero() || self.locks.poll_interval.is_zero() {
            return fail("lock ttl and poll interval must be positive");
        }
        if self.ordering.max_queue_size == 0 {
            return fail("max queue size must be positive");
        }
        if self.sweep_interval.is_zero() || self.metrics_interval.is_zero() {
            return fail("maintenance intervals must be positive");
        }
        if let Backend::Redis { pool_size: 0, .. } = self.backend {
            return fail("redis pool size must be positive");
        }
        Ok(())
    }

    /// Short timings for tests.
    pub fn for_testing(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            backend: Backend::InMemory,
            broker: BrokerConfig::for_testing(),
            dedup: DedupConfig::for_testing(),
            locks: LockConfig::for_testing(),
            ordering: OrderingConfig::for_testing(),
            sweep_interval: Duration::from_millis(50),
            metrics_interval: Duration::from_millis(50),
        }
    }
}
