// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Storaging engine: prefix retrieval and chunked persistence of latent state.
//!
//! The execution pipeline calls [`StoragingEngine::retrieve`] before running
//! the model on a sequence and [`StoragingEngine::store`] with the newly
//! computed latent afterwards. The engine holds no per-sequence state; it is
//! safe to share behind an `Arc` and call concurrently.

pub mod error;
mod stats;

use std::sync::Arc;

use crate::addressing::{ChunkAddresser, TokenId};
use crate::config::LatentCacheConfig;
use crate::latent::{CodecKind, Latent, LatentCodec};
use crate::storage::{open_backend, BackendKind, StorageBackend};

pub use error::EngineError;
pub use stats::{EngineStats, StatsSnapshot};

/// Result of a prefix lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    /// Concatenated latent of the longest contiguous cached prefix.
    pub latent: Option<Latent>,
    /// Tokens covered by `latent`; a multiple of the chunk size.
    pub tokens_covered: usize,
}

impl Retrieved {
    /// Nothing cached; the caller recomputes from token 0.
    pub fn miss() -> Self {
        Self {
            latent: None,
            tokens_covered: 0,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.latent.is_some()
    }
}

/// Summary of one `store` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOutcome {
    pub chunks_written: usize,
    pub bytes_written: usize,
}

/// Orchestrates addressing, encoding and storage of latent chunks.
pub struct StoragingEngine {
    addresser: ChunkAddresser,
    backend: Arc<dyn StorageBackend>,
    codec: Arc<dyn LatentCodec>,
    stats: EngineStats,
}

impl StoragingEngine {
    /// Create an engine over an already opened backend.
    ///
    /// Fails if `chunk_size` is zero or the codec cannot represent records
    /// of `chunk_size` positions.
    pub fn new(
        chunk_size: usize,
        backend: Arc<dyn StorageBackend>,
        codec: Arc<dyn LatentCodec>,
    ) -> Result<Self, EngineError> {
        let addresser = ChunkAddresser::new(chunk_size)?;
        codec.check_chunk_size(chunk_size)?;
        tracing::debug!(
            chunk_size,
            backend = %backend.kind(),
            codec = %codec.kind(),
            "Storaging engine created"
        );
        Ok(Self {
            addresser,
            backend,
            codec,
            stats: EngineStats::default(),
        })
    }

    /// Open the configured backend and build the configured codec.
    pub async fn from_config(config: &LatentCacheConfig) -> Result<Self, EngineError> {
        let backend = open_backend(&config.backend).await?;
        let codec = config.codec.build(config.chunk_size)?;
        Self::new(config.chunk_size, backend, codec)
    }

    pub fn chunk_size(&self) -> usize {
        self.addresser.chunk_size()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn codec_kind(&self) -> CodecKind {
        self.codec.kind()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Fetch the latent for the longest cached prefix of `tokens`.
    ///
    /// Probes chunk 0, 1, ... and stops at the first miss; chunks after a
    /// miss cannot extend the prefix and are never fetched. A stored record
    /// that does not decode, or does not fit this engine's chunk size and the
    /// chunks before it, ends the prefix like a miss. Storage failures are
    /// returned as errors.
    #[tracing::instrument(name = "latent_retrieve", skip_all, fields(tokens = tokens.len()))]
    pub async fn retrieve(&self, tokens: &[TokenId]) -> Result<Retrieved, EngineError> {
        let chunk_size = self.chunk_size();
        let mut parts: Vec<Latent> = Vec::new();
        let mut missed = false;

        for (chunk, key) in self.addresser.prefix_addresses(tokens, 0) {
            let Some(bytes) = self.backend.get(&key).await? else {
                missed = true;
                break;
            };
            let Some(record) = self.usable_record(chunk, bytes, parts.first()) else {
                missed = true;
                break;
            };
            parts.push(record);
        }

        let tokens_covered = parts.len() * chunk_size;
        self.stats
            .record_retrieve(parts.len() as u64, missed, tokens_covered as u64);

        if parts.is_empty() {
            tracing::debug!("Prefix cache miss");
            return Ok(Retrieved::miss());
        }
        let latent = Latent::concat_seq(&parts)?;
        tracing::debug!(tokens_covered, chunks = parts.len(), "Prefix cache hit");
        Ok(Retrieved {
            latent: Some(latent),
            tokens_covered,
        })
    }

    /// Decode a stored record, or `None` if it cannot extend the prefix.
    ///
    /// Records left by a different chunk size or model share addresses with
    /// current ones.
    fn usable_record(&self, chunk: usize, bytes: Vec<u8>, first: Option<&Latent>) -> Option<Latent> {
        let record = match self.codec.decode(bytes) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(chunk, error = %e, "Cached record does not decode; prefix ends here");
                return None;
            }
        };
        if record.seq_len() != self.chunk_size() {
            tracing::warn!(
                chunk,
                expected = self.chunk_size(),
                actual = record.seq_len(),
                "Cached record spans the wrong number of positions; prefix ends here"
            );
            return None;
        }
        if let Some(first) = first {
            if !first.concat_compatible(&record) {
                tracing::warn!(
                    chunk,
                    expected = ?first.shape(),
                    actual = ?record.shape(),
                    dtype = %record.dtype(),
                    "Cached record layout differs from earlier chunks; prefix ends here"
                );
                return None;
            }
        }
        Some(record)
    }

    /// Persist the complete chunks of `tokens` beyond `restored_offset`.
    ///
    /// `new_latent` holds only the newly computed positions, starting at
    /// `restored_offset`. Positions past the last complete chunk are ignored,
    /// and an offset at or past the last complete chunk writes nothing.
    /// All chunks are submitted in one `batch_put`.
    #[tracing::instrument(
        name = "latent_store",
        skip_all,
        fields(tokens = tokens.len(), restored_offset)
    )]
    pub async fn store(
        &self,
        tokens: &[TokenId],
        new_latent: &Latent,
        restored_offset: usize,
    ) -> Result<StoreOutcome, EngineError> {
        let chunk_size = self.chunk_size();
        if restored_offset % chunk_size != 0 {
            return Err(EngineError::InvalidOffset {
                offset: restored_offset,
                seq_len: tokens.len(),
                chunk_size,
            });
        }

        let chunk_offset = restored_offset / chunk_size;
        let total_chunks = self.addresser.complete_chunks(tokens.len());
        if total_chunks <= chunk_offset {
            return Ok(StoreOutcome::default());
        }

        let new_chunks = total_chunks - chunk_offset;
        let needed = new_chunks * chunk_size;
        if new_latent.seq_len() < needed {
            return Err(EngineError::LatentTooShort {
                needed,
                actual: new_latent.seq_len(),
            });
        }

        let mut entries = Vec::with_capacity(new_chunks);
        let mut bytes_written = 0;
        for (chunk, key) in self.addresser.prefix_addresses(tokens, chunk_offset) {
            let local = chunk - chunk_offset;
            let record = new_latent.narrow_seq(local * chunk_size, chunk_size)?;
            let encoded = self.codec.encode(record)?;
            bytes_written += encoded.len();
            entries.push((key, encoded));
        }

        self.backend.batch_put(entries).await?;
        self.stats
            .record_store(new_chunks as u64, bytes_written as u64);
        tracing::debug!(chunks = new_chunks, bytes = bytes_written, "Latent chunks stored");

        Ok(StoreOutcome {
            chunks_written: new_chunks,
            bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::ContentAddress;
    use crate::latent::{LatentDType, RawViewCodec, RecordLayout, SafetensorsCodec};
    use crate::storage::MemoryBackend;

    fn engine(chunk_size: usize) -> StoragingEngine {
        StoragingEngine::new(
            chunk_size,
            Arc::new(MemoryBackend::new()),
            Arc::new(SafetensorsCodec),
        )
        .unwrap()
    }

    fn latent(seq: usize) -> Latent {
        let values: Vec<f32> = (0..2 * seq * 3).map(|i| i as f32 * 0.5).collect();
        Latent::from_f32(vec![2, seq, 3], &values).unwrap()
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let result = StoragingEngine::new(0, Arc::new(MemoryBackend::new()), Arc::new(SafetensorsCodec));
        assert!(matches!(result, Err(EngineError::InvalidChunkSize(_))));
    }

    #[test]
    fn raw_layout_must_match_chunk_size() {
        let layout = RecordLayout::layered(LatentDType::F32, 2, 8, 3).unwrap();
        let result = StoragingEngine::new(
            4,
            Arc::new(MemoryBackend::new()),
            Arc::new(RawViewCodec::new(layout)),
        );
        assert!(matches!(result, Err(EngineError::Codec(_))));
    }

    #[tokio::test]
    async fn short_sequence_is_noop() {
        let engine = engine(4);
        let outcome = engine.store(&[1, 2, 3], &latent(3), 0).await.unwrap();
        assert_eq!(outcome, StoreOutcome::default());
        assert_eq!(engine.retrieve(&[1, 2, 3]).await.unwrap(), Retrieved::miss());
    }

    #[tokio::test]
    async fn misaligned_offset_rejected() {
        let engine = engine(4);
        let err = engine.store(&[0; 8], &latent(6), 2).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidOffset { offset: 2, .. }));
        assert!(err.is_caller_error());
    }

    #[tokio::test]
    async fn offset_past_sequence_is_noop() {
        let engine = engine(4);
        let outcome = engine.store(&[0; 6], &latent(0), 8).await.unwrap();
        assert_eq!(outcome, StoreOutcome::default());
        assert_eq!(engine.stats().stores, 0);
    }

    #[tokio::test]
    async fn undecodable_record_is_a_miss() {
        let backend = Arc::new(MemoryBackend::new());
        let engine = StoragingEngine::new(2, backend.clone(), Arc::new(SafetensorsCodec)).unwrap();
        let key = ContentAddress::of_tokens(&[5, 6]);
        backend.put(&key, b"not a container".to_vec()).await.unwrap();

        let got = engine.retrieve(&[5, 6, 7, 8]).await.unwrap();
        assert_eq!(got, Retrieved::miss());
        assert_eq!(engine.stats().chunk_misses, 1);
    }

    #[tokio::test]
    async fn short_latent_rejected() {
        let engine = engine(4);
        let err = engine.store(&[0; 8], &latent(7), 0).await.unwrap_err();
        assert!(matches!(err, EngineError::LatentTooShort { needed: 8, actual: 7 }));
    }

    #[tokio::test]
    async fn partial_tail_ignored() {
        let engine = engine(4);
        let tokens: Vec<u32> = (0..10).collect();
        let outcome = engine.store(&tokens, &latent(10), 0).await.unwrap();
        assert_eq!(outcome.chunks_written, 2);
        let got = engine.retrieve(&tokens).await.unwrap();
        assert_eq!(got.tokens_covered, 8);
        assert_eq!(got.latent.unwrap(), latent(10).narrow_seq(0, 8).unwrap());
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let engine = engine(2);
        engine.store(&[1, 2, 3, 4], &latent(4), 0).await.unwrap();
        engine.retrieve(&[1, 2, 3, 4, 5, 6]).await.unwrap();
        let snap = engine.stats();
        assert_eq!(snap.retrieves, 1);
        assert_eq!(snap.chunk_hits, 2);
        assert_eq!(snap.chunk_misses, 1);
        assert_eq!(snap.chunks_stored, 2);
        assert_eq!(snap.tokens_restored, 4);
    }
}
