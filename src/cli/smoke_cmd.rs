//! `smoke` subcommand: store and retrieve a synthetic sequence.
//!
//! Exercises the configured backend and codec end to end. Running it twice
//! against a persistent backend is harmless; the second run overwrites the
//! same keys with identical records.

use half::f16;

use crate::config::{self, LatentCacheConfig};
use crate::engine::StoragingEngine;
use crate::latent::{CodecKind, Latent, LatentDType};

/// Chunks in the synthetic sequence, plus a partial tail.
const SMOKE_CHUNKS: usize = 3;

/// Layers and hidden size used when the codec does not fix them.
const DEFAULT_LAYERS: usize = 2;
const DEFAULT_HIDDEN: usize = 8;

fn synthetic_latent(cfg: &LatentCacheConfig, seq: usize) -> Result<Latent, String> {
    let (dtype, layers, hidden) = match cfg.codec.kind {
        CodecKind::Raw => (cfg.codec.raw_dtype, cfg.codec.raw_layers, cfg.codec.raw_hidden),
        CodecKind::Safetensors => (LatentDType::F16, DEFAULT_LAYERS, DEFAULT_HIDDEN),
    };
    let n = layers * seq * hidden;
    let shape = vec![layers, seq, hidden];
    let latent = match dtype {
        LatentDType::F16 => {
            let values: Vec<f16> = (0..n).map(|i| f16::from_f32((i % 251) as f32)).collect();
            Latent::from_f16(shape, &values)
        }
        LatentDType::BF16 => {
            let values: Vec<half::bf16> =
                (0..n).map(|i| half::bf16::from_f32((i % 251) as f32)).collect();
            Latent::from_bf16(shape, &values)
        }
        LatentDType::F32 => {
            let values: Vec<f32> = (0..n).map(|i| (i % 251) as f32).collect();
            Latent::from_f32(shape, &values)
        }
    };
    latent.map_err(|e| e.to_string())
}

async fn smoke(cfg: &LatentCacheConfig) -> Result<(), String> {
    cfg.validate().map_err(|e| e.to_string())?;
    let engine = StoragingEngine::from_config(cfg)
        .await
        .map_err(|e| e.to_string())?;

    let chunk_size = engine.chunk_size();
    let seq = chunk_size * SMOKE_CHUNKS + chunk_size / 2;
    let tokens: Vec<u32> = (0..seq as u32).map(|t| t.wrapping_mul(2_654_435_761)).collect();
    let latent = synthetic_latent(cfg, seq)?;

    let outcome = engine
        .store(&tokens, &latent, 0)
        .await
        .map_err(|e| e.to_string())?;
    let retrieved = engine.retrieve(&tokens).await.map_err(|e| e.to_string())?;

    println!("BACKEND={}", engine.backend_kind());
    println!("CODEC={}", engine.codec_kind());
    println!("CHUNKS_WRITTEN={}", outcome.chunks_written);
    println!("BYTES_WRITTEN={}", outcome.bytes_written);
    println!("TOKENS_COVERED={}", retrieved.tokens_covered);

    let expected = SMOKE_CHUNKS * chunk_size;
    if retrieved.tokens_covered != expected {
        return Err(format!(
            "retrieved {} tokens, expected {}",
            retrieved.tokens_covered, expected
        ));
    }
    let restored = retrieved.latent.ok_or("retrieve returned no latent")?;
    let original = latent.narrow_seq(0, expected).map_err(|e| e.to_string())?;
    if restored != original {
        return Err("retrieved latent differs from stored latent".to_string());
    }
    Ok(())
}

/// Run the smoke test against the loaded configuration.
///
/// Returns 0 on success, 1 on failure, 2 on a configuration error.
pub async fn run_smoke() -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    match smoke(&cfg).await {
        Ok(()) => {
            println!("Smoke test passed.");
            0
        }
        Err(e) => {
            eprintln!("Smoke test FAILED: {}", e);
            1
        }
    }
}
