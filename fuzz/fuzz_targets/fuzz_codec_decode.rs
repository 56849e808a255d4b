//! Fuzz target for latent record decoding.
//!
//! Stored bytes come from a shared medium and may be corrupt. Decoding them
//! must return Ok or Err, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use gg_latent::{LatentCodec, LatentDType, RawViewCodec, RecordLayout, SafetensorsCodec};

fuzz_target!(|data: &[u8]| {
    if let Ok(latent) = SafetensorsCodec.decode(data.to_vec()) {
        // A decoded record must survive slicing along its sequence axis.
        let _ = latent.narrow_seq(0, latent.seq_len());
    }

    if let Ok(layout) = RecordLayout::layered(LatentDType::F16, 2, 4, 8) {
        let _ = RawViewCodec::new(layout).decode(data.to_vec());
    }
});
