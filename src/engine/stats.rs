//! Engine counters.
//!
//! Kept in atomics for in-process inspection and mirrored to the `metrics`
//! facade for export.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub(crate) const CHUNK_HITS: &str = "gg_latent_chunk_hits_total";
pub(crate) const CHUNK_MISSES: &str = "gg_latent_chunk_misses_total";
pub(crate) const CHUNKS_STORED: &str = "gg_latent_chunks_stored_total";
pub(crate) const STORE_BYTES: &str = "gg_latent_store_bytes_total";
pub(crate) const RETRIEVE_TOKENS: &str = "gg_latent_retrieve_tokens";

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub retrieves: u64,
    pub chunk_hits: u64,
    pub chunk_misses: u64,
    pub tokens_restored: u64,
    pub stores: u64,
    pub chunks_stored: u64,
    pub bytes_stored: u64,
}

impl StatsSnapshot {
    /// Fraction of probed chunks that hit.
    pub fn hit_rate(&self) -> f64 {
        let total = self.chunk_hits + self.chunk_misses;
        if total == 0 {
            return 0.0;
        }
        self.chunk_hits as f64 / total as f64
    }
}

/// Live engine counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    retrieves: AtomicU64,
    chunk_hits: AtomicU64,
    chunk_misses: AtomicU64,
    tokens_restored: AtomicU64,
    stores: AtomicU64,
    chunks_stored: AtomicU64,
    bytes_stored: AtomicU64,
}

impl EngineStats {
    pub(crate) fn record_retrieve(&self, hits: u64, missed: bool, tokens: u64) {
        self.retrieves.fetch_add(1, Ordering::Relaxed);
        self.chunk_hits.fetch_add(hits, Ordering::Relaxed);
        self.tokens_restored.fetch_add(tokens, Ordering::Relaxed);
        metrics::counter!(CHUNK_HITS).increment(hits);
        if missed {
            self.chunk_misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(CHUNK_MISSES).increment(1);
        }
        metrics::histogram!(RETRIEVE_TOKENS).record(tokens as f64);
    }

    pub(crate) fn record_store(&self, chunks: u64, bytes: u64) {
        self.stores.fetch_add(1, Ordering::Relaxed);
        self.chunks_stored.fetch_add(chunks, Ordering::Relaxed);
        self.bytes_stored.fetch_add(bytes, Ordering::Relaxed);
        metrics::counter!(CHUNKS_STORED).increment(chunks);
        metrics::counter!(STORE_BYTES).increment(bytes);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            retrieves: self.retrieves.load(Ordering::Relaxed),
            chunk_hits: self.chunk_hits.load(Ordering::Relaxed),
            chunk_misses: self.chunk_misses.load(Ordering::Relaxed),
            tokens_restored: self.tokens_restored.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            chunks_stored: self.chunks_stored.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
        }
    }
}
