//! # Redis / KeyDB Store
//!
//! [`CoordinationStore`] backed by a `fred` connection pool. The
//! compare-then-mutate primitives run as Lua scripts so the check and the
//! mutation happen in one server-side step.

use std::time::Duration;

use async_trait::async_trait;
use fred::clients::Pool;
use fred::interfaces::{ClientLike, KeysInterface, ListInterface, LuaInterface};
use fred::types::config::{Config, ReconnectPolicy, ServerConfig};
use fred::types::{Builder, Expiration, SetOptions};
use shared_types::StoreError;
use tracing::{debug, info};

use crate::CoordinationStore;

const DELETE_IF_EQUALS: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

const EXPIRE_IF_EQUALS: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('PEXPIRE', KEYS[1], ARGV[2])
    end
    return 0
"#;

/// Connection settings for the shared Redis / KeyDB instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// `host:port`, optionally prefixed with `redis://`.
    pub endpoint: String,
    /// Name of the environment variable holding the password, if any.
    pub auth_token_env: Option<String>,
    /// Connections in the pool.
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:6379".to_string(),
            auth_token_env: None,
            pool_size: 4,
        }
    }
}

impl RedisConfig {
    /// Build a `fred` client config from these settings.
    pub fn to_fred_config(&self) -> Result<Config, StoreError> {
        let endpoint = self
            .endpoint
            .trim_start_matches("rediss://")
            .trim_start_matches("redis://");
        let (host, port) = parse_host_port(endpoint)?;

        let mut config = Config {
            server: ServerConfig::new_centralized(host, port),
            ..Config::default()
        };
        if let Some(var) = &self.auth_token_env {
            config.password = std::env::var(var).ok();
        }
        Ok(config)
    }
}

/// Parse `host:port`, defaulting the port to `6379`.
pub fn parse_host_port(endpoint: &str) -> Result<(&str, u16), StoreError> {
    let endpoint = endpoint.split('/').next().unwrap_or(endpoint);

    match endpoint.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| {
                StoreError::Connection(format!("invalid port in endpoint: {endpoint}"))
            })?;
            Ok((host, port))
        }
        None => Ok((endpoint, 6379)),
    }
}

/// Exponential reconnect: initial 0ms, base 100ms, max 30s, factor 2.
#[must_use]
pub fn reconnect_policy() -> ReconnectPolicy {
    ReconnectPolicy::new_exponential(0, 100, 30_000, 2)
}

fn command_error(command: &'static str) -> impl FnOnce(fred::error::Error) -> StoreError {
    move |e| StoreError::command(command, e.to_string())
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

/// Store adapter over a `fred` pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Connect and verify with a PING.
    ///
    /// # Errors
    ///
    /// `StoreError::Connection` if the pool cannot be built or reached.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let mut builder = Builder::from_config(config.to_fred_config()?);
        builder.set_policy(reconnect_policy());

        let pool = builder
            .build_pool(config.pool_size.max(1))
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        pool.init()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let _: String = pool
            .ping(None)
            .await
            .map_err(|e| StoreError::Connection(format!("PING failed after connect: {e}")))?;

        info!(
            endpoint = %config.endpoint,
            pool_size = config.pool_size,
            "Coordination store pool connected"
        );
        Ok(Self { pool })
    }

    /// Wrap an already initialised pool.
    #[must_use]
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// The underlying pool (used to derive subscriber clients).
    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let value: i64 = self.pool.incr(key).await.map_err(command_error("INCR"))?;
        u64::try_from(value).map_err(|_| StoreError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let result: Option<String> = self
            .pool
            .set(
                key,
                value,
                Some(Expiration::PX(ttl_millis(ttl))),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(command_error("SET NX"))?;
        let created = result.is_some();
        debug!(%key, created, "set_if_absent");
        Ok(created)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.pool.get(key).await.map_err(command_error("GET"))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let _: Option<String> = self
            .pool
            .set(
                key,
                value,
                ttl.map(|ttl| Expiration::PX(ttl_millis(ttl))),
                None,
                false,
            )
            .await
            .map_err(command_error("SET"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = self.pool.del(key).await.map_err(command_error("DEL"))?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let applied: i64 = self
            .pool
            .pexpire(key, ttl_millis(ttl), None)
            .await
            .map_err(command_error("PEXPIRE"))?;
        Ok(applied == 1)
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let len: i64 = self
            .pool
            .rpush(key, value)
            .await
            .map_err(command_error("RPUSH"))?;
        Ok(u64::try_from(len).unwrap_or_default())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.pool
            .lrange(key, 0, -1)
            .await
            .map_err(command_error("LRANGE"))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let removed: i64 = self
            .pool
            .eval(
                DELETE_IF_EQUALS,
                vec![key.to_string()],
                vec![expected.to_string()],
            )
            .await
            .map_err(command_error("EVAL compare-and-delete"))?;
        Ok(removed == 1)
    }

    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let applied: i64 = self
            .pool
            .eval(
                EXPIRE_IF_EQUALS,
                vec![key.to_string()],
                vec![expected.to_string(), ttl_millis(ttl).to_string()],
            )
            .await
            .map_err(command_error("EVAL compare-and-expire"))?;
        Ok(applied == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port_with_port() {
        let (host, port) = parse_host_port("keydb.local:6380").unwrap();
        assert_eq!(host, "keydb.local");
        assert_eq!(port, 6380);
    }

    #[test]
    fn test_parse_host_port_default() {
        let (host, port) = parse_host_port("keydb.local").unwrap();
        assert_eq!(host, "keydb.local");
        assert_eq!(port, 6379);
    }

    #[test]
    fn test_parse_host_port_invalid() {
        assert!(parse_host_port("keydb.local:abc").is_err());
    }

    #[test]
    fn test_scheme_is_stripped() {
        let config = RedisConfig {
            endpoint: "redis://cache.internal:6390".to_string(),
            ..RedisConfig::default()
        };
        assert!(config.to_fred_config().is_ok());
    }

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }
}
