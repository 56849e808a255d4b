//! In-process map backend.
//!
//! Uses DashMap so the map can be shared across tasks without a global lock.
//! Nothing survives a restart, and `batch_put` is a sequence of inserts that
//! readers may observe half-applied.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{BackendKind, StorageBackend, StorageError};
use crate::addressing::ContentAddress;

/// Volatile key/value map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<ContentAddress, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn put_sync(&self, key: ContentAddress, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    pub(crate) fn get_sync(&self, key: &ContentAddress) -> Option<Vec<u8>> {
        self.entries.get(key).map(|e| e.value().clone())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn put(&self, key: &ContentAddress, value: Vec<u8>) -> Result<(), StorageError> {
        self.put_sync(*key, value);
        Ok(())
    }

    async fn get(&self, key: &ContentAddress) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.get_sync(key))
    }

    async fn batch_put(&self, entries: Vec<(ContentAddress, Vec<u8>)>) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.put_sync(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_put_get() {
        let backend = MemoryBackend::new();
        let key = ContentAddress::of_tokens(&[1, 2, 3]);
        assert!(backend.get_sync(&key).is_none());
        backend.put_sync(key, vec![9; 10]);
        assert_eq!(backend.get_sync(&key), Some(vec![9; 10]));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn overwrite_keeps_last_value() {
        let backend = MemoryBackend::new();
        let key = ContentAddress::of_tokens(&[7]);
        backend.put_sync(key, vec![1]);
        backend.put_sync(key, vec![2, 2]);
        assert_eq!(backend.get_sync(&key), Some(vec![2, 2]));
        assert_eq!(backend.len(), 1);
    }
}
