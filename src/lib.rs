//! GG-LATENT: prefix-addressed latent state cache
//!
//! Lets an inference runtime skip recomputing model state for token prefixes
//! it has already processed. A sequence is split into fixed-size chunks; each
//! complete chunk is keyed by the hash of the whole prefix ending at it, and
//! the latent computed for that chunk is stored under the key.
//!
//! # Flow
//!
//! - **Retrieve**: probe chunk keys in order, stop at the first miss, and
//!   concatenate the hits into one latent along the sequence axis.
//! - **Compute**: the caller runs the model from `tokens_covered` onward.
//! - **Store**: slice the new latent per chunk, encode, and submit all
//!   records in one batch.
//!
//! # Components
//!
//! - [`addressing`]: cumulative SHA-256 chunk keys
//! - [`latent`]: the latent tensor and its codecs
//! - [`storage`]: in-process, LMDB and networked backends
//! - [`engine`]: the [`StoragingEngine`] tying them together
//!
//! ```no_run
//! use std::sync::Arc;
//! use gg_latent::{Latent, MemoryBackend, SafetensorsCodec, StoragingEngine};
//!
//! # async fn run() -> Result<(), gg_latent::EngineError> {
//! let engine = StoragingEngine::new(4, Arc::new(MemoryBackend::new()), Arc::new(SafetensorsCodec))?;
//! let tokens = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
//! let hit = engine.retrieve(&tokens).await?;
//! assert_eq!(hit.tokens_covered, 0);
//!
//! let latent = Latent::from_f32(vec![1, 10, 2], &[0.0; 20])?;
//! engine.store(&tokens, &latent, hit.tokens_covered).await?;
//! assert_eq!(engine.retrieve(&tokens).await?.tokens_covered, 8);
//! # Ok(())
//! # }
//! ```

pub mod addressing;
pub mod cli;
pub mod config;
pub mod engine;
pub mod latent;
pub mod storage;
pub mod telemetry;

pub use addressing::{AddressError, ChunkAddresser, ContentAddress, TokenId};
pub use config::{ConfigError, LatentCacheConfig};
pub use engine::{EngineError, EngineStats, Retrieved, StatsSnapshot, StoragingEngine, StoreOutcome};
pub use latent::{
    CodecError, CodecKind, Latent, LatentCodec, LatentDType, LatentError, RawViewCodec,
    RecordLayout, SafetensorsCodec,
};
pub use storage::{open_backend, BackendConfig, BackendKind, MemoryBackend, StorageBackend, StorageError};
