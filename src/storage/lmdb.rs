//! Embedded transactional backend on LMDB (via heed).
//!
//! Entries survive restarts. Each `batch_put` is one write transaction, so a
//! batch is either fully visible or not at all. LMDB serializes writers and
//! lets readers proceed concurrently; the environment is process-local.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::{BackendKind, LmdbConfig, StorageBackend, StorageError};
use crate::addressing::ContentAddress;

/// Map sizes are rounded up to this granularity (covers 4K/16K/64K pages).
const MAP_GRANULE: usize = 64 * 1024;

const DB_NAME: &str = "latent";

/// LMDB-backed latent store.
pub struct LmdbBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    path: PathBuf,
}

fn round_map_size(size: usize) -> usize {
    let size = size.max(MAP_GRANULE);
    size.div_ceil(MAP_GRANULE) * MAP_GRANULE
}

/// Only a full reader table clears on its own; disk and map errors do not.
fn map_heed(e: heed::Error) -> StorageError {
    match e {
        heed::Error::Mdb(heed::MdbError::ReadersFull) => {
            tracing::warn!(error = %e, "LMDB reader slots exhausted");
            StorageError::Transient(e.to_string())
        }
        other => StorageError::Backend(other.to_string()),
    }
}

fn map_join(e: tokio::task::JoinError) -> StorageError {
    StorageError::Backend(format!("blocking task failed: {}", e))
}

impl LmdbBackend {
    /// Open (or create) the environment at `config.path`.
    ///
    /// Blocking; call from a blocking context.
    pub fn open(config: &LmdbConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.path).map_err(|e| {
            StorageError::Unavailable(format!("{}: {}", config.path.display(), e))
        })?;

        let mut options = EnvOpenOptions::new();
        options.map_size(round_map_size(config.map_size)).max_dbs(1);
        // SAFETY: the environment is opened once per backend instance and
        // the directory is owned by this cache.
        let env = unsafe { options.open(&config.path) }.map_err(|e| {
            StorageError::Unavailable(format!("{}: {}", config.path.display(), e))
        })?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(DB_NAME))
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        tracing::info!(path = %config.path.display(), "LMDB environment opened");
        Ok(Self {
            env,
            db,
            path: config.path.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<u64, StorageError> {
        let rtxn = self.env.read_txn().map_err(map_heed)?;
        self.db.len(&rtxn).map_err(map_heed)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl StorageBackend for LmdbBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Lmdb
    }

    async fn put(&self, key: &ContentAddress, value: Vec<u8>) -> Result<(), StorageError> {
        self.batch_put(vec![(*key, value)]).await
    }

    async fn get(&self, key: &ContentAddress) -> Result<Option<Vec<u8>>, StorageError> {
        let env = self.env.clone();
        let db = self.db;
        let key = key.to_hex();
        tokio::task::spawn_blocking(move || -> heed::Result<Option<Vec<u8>>> {
            let rtxn = env.read_txn()?;
            let value = db.get(&rtxn, key.as_bytes())?.map(|v| v.to_vec());
            Ok(value)
        })
        .await
        .map_err(map_join)?
        .map_err(map_heed)
    }

    async fn batch_put(&self, entries: Vec<(ContentAddress, Vec<u8>)>) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }
        let env = self.env.clone();
        let db = self.db;
        let count = entries.len();
        tokio::task::spawn_blocking(move || -> heed::Result<()> {
            let mut wtxn = env.write_txn()?;
            for (key, value) in &entries {
                db.put(&mut wtxn, key.to_hex().as_bytes(), value)?;
            }
            wtxn.commit()
        })
        .await
        .map_err(map_join)?
        .map_err(map_heed)?;
        tracing::debug!(entries = count, "LMDB batch committed");
        Ok(())
    }
}
