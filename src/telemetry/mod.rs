//! Telemetry for the latent cache.
//!
//! Structured logging setup. Engine counters are exported through the
//! `metrics` facade from [`crate::engine::EngineStats`].

mod logging;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
