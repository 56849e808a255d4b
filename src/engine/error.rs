//! Engine error types.
//!
//! Invalid inputs are rejected, not truncated. A cache miss is never an
//! error, and neither is a stale or foreign record; see [`super::Retrieved`].

use thiserror::Error;

use crate::addressing::AddressError;
use crate::latent::{CodecError, LatentError};
use crate::storage::StorageError;

/// Errors surfaced by [`super::StoragingEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(#[from] AddressError),

    #[error("Restored offset {offset} for sequence of {seq_len} tokens is not a multiple of chunk size {chunk_size}")]
    InvalidOffset {
        offset: usize,
        seq_len: usize,
        chunk_size: usize,
    },

    #[error("Latent covers {actual} positions, {needed} needed for the new chunks")]
    LatentTooShort { needed: usize, actual: usize },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Latent error: {0}")]
    Latent(#[from] LatentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_transient())
    }

    /// Returns true if the caller passed invalid arguments.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidOffset { .. } | Self::LatentTooShort { .. } | Self::Latent(_)
        )
    }
}
