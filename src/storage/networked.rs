//! Networked cache service backends (Redis protocol).
//!
//! Two clients over the same service:
//!
//! - [`RedisBackend`]: one synchronous connection. Every call is one blocking
//!   round trip run on the blocking pool; `batch_put` issues its writes one
//!   after another.
//! - [`RedisPipelinedBackend`]: a multiplexed async connection. `batch_put`
//!   queues every write into one pipeline and flushes it in a single round
//!   trip. Writes from concurrent callers may interleave; there is no
//!   cross-key transaction.
//!
//! Durability follows the service's own persistence policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{Client, Connection, RedisError};

use super::{BackendKind, RedisConfig, StorageBackend, StorageError};
use crate::addressing::ContentAddress;

fn classify(e: RedisError) -> StorageError {
    if e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
        tracing::warn!(error = %e, "Transient cache service failure");
        StorageError::Transient(e.to_string())
    } else {
        StorageError::Backend(e.to_string())
    }
}

fn unavailable(url: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::Unavailable(format!("{}: {}", url, e))
}

fn connect_timeout(config: &RedisConfig) -> Duration {
    Duration::from_secs(config.connect_timeout_secs.max(1))
}

/// Blocking single-connection client.
pub struct RedisBackend {
    conn: Arc<Mutex<Connection>>,
    config: RedisConfig,
}

impl RedisBackend {
    /// Connect and verify the service answers.
    ///
    /// Blocking; call from a blocking context.
    pub fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        let client = Client::open(config.url.as_str()).map_err(|e| unavailable(&config.url, e))?;
        let mut conn = client
            .get_connection_with_timeout(connect_timeout(config))
            .map_err(|e| unavailable(&config.url, e))?;
        let _: String = redis::cmd("PING")
            .query(&mut conn)
            .map_err(|e| unavailable(&config.url, e))?;
        tracing::info!(url = %config.url, "Cache service connected (synchronous)");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> redis::RedisResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            op(&mut *guard)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("blocking task failed: {}", e)))?
        .map_err(classify)
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn put(&self, key: &ContentAddress, value: Vec<u8>) -> Result<(), StorageError> {
        let key = self.config.redis_key(key);
        self.blocking(move |conn| redis::cmd("SET").arg(key).arg(value).query::<()>(conn))
            .await
    }

    async fn get(&self, key: &ContentAddress) -> Result<Option<Vec<u8>>, StorageError> {
        let key = self.config.redis_key(key);
        self.blocking(move |conn| redis::cmd("GET").arg(key).query::<Option<Vec<u8>>>(conn))
            .await
    }

    async fn batch_put(&self, entries: Vec<(ContentAddress, Vec<u8>)>) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }
        let entries: Vec<(String, Vec<u8>)> = entries
            .into_iter()
            .map(|(key, value)| (self.config.redis_key(&key), value))
            .collect();
        self.blocking(move |conn| {
            for (key, value) in entries {
                redis::cmd("SET").arg(key).arg(value).query::<()>(conn)?;
            }
            Ok(())
        })
        .await
    }
}

/// Multiplexed async client with pipelined batch writes.
pub struct RedisPipelinedBackend {
    conn: MultiplexedConnection,
    config: RedisConfig,
}

impl RedisPipelinedBackend {
    /// Connect and verify the service answers.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        let client = Client::open(config.url.as_str()).map_err(|e| unavailable(&config.url, e))?;
        let mut conn = tokio::time::timeout(
            connect_timeout(config),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| unavailable(&config.url, "connect timed out"))?
        .map_err(|e| unavailable(&config.url, e))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable(&config.url, e))?;
        tracing::info!(url = %config.url, "Cache service connected (pipelined)");
        Ok(Self {
            conn,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl StorageBackend for RedisPipelinedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RedisPipelined
    }

    async fn put(&self, key: &ContentAddress, value: Vec<u8>) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(self.config.redis_key(key))
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn get(&self, key: &ContentAddress) -> Result<Option<Vec<u8>>, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.config.redis_key(key))
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(value)
    }

    async fn batch_put(&self, entries: Vec<(ContentAddress, Vec<u8>)>) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }
        let count = entries.len();
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SET").arg(self.config.redis_key(&key)).arg(value).ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(classify)?;
        tracing::debug!(entries = count, "Pipeline flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port_config() -> RedisConfig {
        RedisConfig {
            url: "redis://127.0.0.1:1/".to_string(),
            key_prefix: "test:".to_string(),
            connect_timeout_secs: 1,
        }
    }

    #[test]
    fn sync_connect_to_closed_port_is_unavailable() {
        let err = RedisBackend::connect(&closed_port_config()).err().unwrap();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }

    #[tokio::test]
    async fn pipelined_connect_to_closed_port_is_unavailable() {
        let err = RedisPipelinedBackend::connect(&closed_port_config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }

    #[test]
    fn malformed_url_is_unavailable() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            ..RedisConfig::default()
        };
        assert!(matches!(
            RedisBackend::connect(&config),
            Err(StorageError::Unavailable(_))
        ));
    }
}
