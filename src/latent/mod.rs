//! Latent state tensors and their byte codecs.

pub mod codec;
mod tensor;

pub use codec::{
    CodecConfig, CodecError, CodecKind, LatentCodec, RawViewCodec, RecordLayout, SafetensorsCodec,
};
pub use tensor::{Latent, LatentDType, LatentError, SEQ_AXIS};
