// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Storage backends for serialized latent records.
//!
//! Every backend implements [`StorageBackend`] and is interchangeable from the
//! engine's point of view. They differ in what the medium guarantees:
//!
//! | Backend | Durability | `batch_put` | Concurrency |
//! |---|---|---|---|
//! | [`MemoryBackend`] | none | sequential | sharded map, process-local |
//! | [`LmdbBackend`] | local disk | one transaction | many readers, one writer |
//! | [`RedisBackend`] | service policy | sequential round trips | one connection, serialized |
//! | [`RedisPipelinedBackend`] | service policy | one pipelined flush | multiplexed |
//!
//! All operations are suspension points. Blocking media run their calls on
//! the tokio blocking pool.

mod memory;

#[cfg(feature = "lmdb")]
mod lmdb;
#[cfg(feature = "redis")]
mod networked;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::addressing::ContentAddress;

pub use memory::MemoryBackend;

#[cfg(feature = "lmdb")]
pub use lmdb::LmdbBackend;
#[cfg(feature = "redis")]
pub use networked::{RedisBackend, RedisPipelinedBackend};

/// Storage failures.
///
/// A missing key is never an error: `get` returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The medium could not be opened or reached at construction.
    #[error("Storage medium unavailable: {0}")]
    Unavailable(String),

    /// A single call failed for a recoverable reason (timeout, reset).
    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns true if the caller may retry the same call.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Uniform key/value contract over a storage medium.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Store or overwrite one entry. Last write wins.
    async fn put(&self, key: &ContentAddress, value: Vec<u8>) -> Result<(), StorageError>;

    /// Fetch one entry, `Ok(None)` when absent.
    async fn get(&self, key: &ContentAddress) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store many entries using the medium's native batching.
    async fn batch_put(&self, entries: Vec<(ContentAddress, Vec<u8>)>) -> Result<(), StorageError>;
}

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Memory,
    Lmdb,
    Redis,
    RedisPipelined,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Lmdb => "lmdb",
            Self::Redis => "redis",
            Self::RedisPipelined => "redis-pipelined",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "map" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            "redis" => Ok(Self::Redis),
            "redis-pipelined" | "redis_pipelined" => Ok(Self::RedisPipelined),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// LMDB environment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmdbConfig {
    /// Directory holding the LMDB environment. Created if missing.
    pub path: PathBuf,
    /// Upper bound of the memory map in bytes; rounded up to a page multiple.
    pub map_size: usize,
}

impl Default for LmdbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache/latent"),
            map_size: 160_000_000,
        }
    }
}

/// Networked cache service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    /// Prepended to every hex key so deployments can share one service.
    pub key_prefix: String,
    pub connect_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
            key_prefix: "latent:".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

impl RedisConfig {
    pub(crate) fn redis_key(&self, key: &ContentAddress) -> String {
        format!("{}{}", self.key_prefix, key.to_hex())
    }
}

/// Which backend to open and with what parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackendConfig {
    Memory {
        #[serde(default)]
        capacity_hint: usize,
    },
    Lmdb(LmdbConfig),
    Redis(RedisConfig),
    RedisPipelined(RedisConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Memory { capacity_hint: 0 }
    }
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory { .. } => BackendKind::Memory,
            Self::Lmdb(_) => BackendKind::Lmdb,
            Self::Redis(_) => BackendKind::Redis,
            Self::RedisPipelined(_) => BackendKind::RedisPipelined,
        }
    }
}

/// Open the configured backend.
///
/// Fails with [`StorageError::Unavailable`] when the medium cannot be opened
/// or reached; there is no fallback to another backend.
pub async fn open_backend(config: &BackendConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let backend: Arc<dyn StorageBackend> = match config {
        BackendConfig::Memory { capacity_hint } => {
            Arc::new(MemoryBackend::with_capacity(*capacity_hint))
        }
        #[cfg(feature = "lmdb")]
        BackendConfig::Lmdb(cfg) => {
            let cfg = cfg.clone();
            let backend = tokio::task::spawn_blocking(move || LmdbBackend::open(&cfg))
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))??;
            Arc::new(backend)
        }
        #[cfg(feature = "redis")]
        BackendConfig::Redis(cfg) => {
            let cfg = cfg.clone();
            let backend = tokio::task::spawn_blocking(move || RedisBackend::connect(&cfg))
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))??;
            Arc::new(backend)
        }
        #[cfg(feature = "redis")]
        BackendConfig::RedisPipelined(cfg) => Arc::new(RedisPipelinedBackend::connect(cfg).await?),
        #[allow(unreachable_patterns)]
        other => {
            return Err(StorageError::Unavailable(format!(
                "{} support not compiled in",
                other.kind()
            )))
        }
    };
    tracing::info!(backend = %backend.kind(), "Storage backend opened");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parse() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("LMDB".parse::<BackendKind>().unwrap(), BackendKind::Lmdb);
        assert_eq!(
            "redis-pipelined".parse::<BackendKind>().unwrap(),
            BackendKind::RedisPipelined
        );
        assert!("sqlite".parse::<BackendKind>().is_err());
    }

    #[test]
    fn transient_classifier() {
        assert!(StorageError::Transient("reset".into()).is_transient());
        assert!(!StorageError::Backend("map full".into()).is_transient());
        assert!(!StorageError::Unavailable("refused".into()).is_transient());
    }

    #[test]
    fn redis_key_is_prefixed_hex() {
        let cfg = RedisConfig::default();
        let addr = ContentAddress::of_tokens(&[1, 2]);
        let key = cfg.redis_key(&addr);
        assert!(key.starts_with("latent:"));
        assert_eq!(key.len(), "latent:".len() + 64);
    }

    #[tokio::test]
    async fn open_memory_backend() {
        let backend = open_backend(&BackendConfig::default()).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Memory);
    }
}
