//! Latent codecs: exact byte encodings for latent records.
//!
//! Two strategies are available and chosen per deployment:
//!
//! - [`SafetensorsCodec`]: self-describing. Each record is a safetensors
//!   container holding one tensor named `latent_bytes` with its dtype and
//!   shape, so decoding needs no outside knowledge.
//! - [`RawViewCodec`]: the tensor's little-endian bytes with no framing at
//!   all. Encoding hands over the tensor's buffer and decoding wraps the
//!   stored buffer, neither copies. The dtype and shape come from a fixed
//!   [`RecordLayout`].
//!
//! # Raw-view precondition
//!
//! The raw view stores no metadata. Decoding only checks that the byte count
//! matches the layout; bytes written under a different layout with the same
//! byte count decode into a well-formed tensor with meaningless values. The
//! raw view is only correct when every producer sharing a store uses one
//! latent layout. Encoding rejects latents that do not match the layout, and
//! the engine checks the layout against its chunk size at construction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tensor::{Latent, LatentDType, LatentError, SEQ_AXIS};

/// Tensor name used inside the safetensors container.
pub const TENSOR_NAME: &str = "latent_bytes";

/// Errors raised while encoding or decoding latent records.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Container error: {0}")]
    Container(String),

    #[error("Unsupported element type in record: {0}")]
    UnsupportedDType(String),

    #[error("Latent does not match record layout: expected {expected}, got {actual}")]
    LayoutMismatch { expected: String, actual: String },

    #[error("Record length mismatch: layout needs {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Invalid record layout: {0}")]
    InvalidLayout(String),

    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    #[error(transparent)]
    Latent(#[from] LatentError),
}

/// Codec selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Safetensors,
    Raw,
}

impl CodecKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safetensors => "safetensors",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "safetensors" | "self-describing" => Ok(Self::Safetensors),
            "raw" | "raw-view" => Ok(Self::Raw),
            other => Err(CodecError::UnknownCodec(other.to_string())),
        }
    }
}

/// Converts latent records to and from bytes.
///
/// `decode(encode(x))` must be bit-identical to `x`.
pub trait LatentCodec: Send + Sync + fmt::Debug {
    fn kind(&self) -> CodecKind;

    /// Encode one record, consuming it.
    fn encode(&self, latent: Latent) -> Result<Vec<u8>, CodecError>;

    /// Decode one record, consuming the stored bytes.
    fn decode(&self, bytes: Vec<u8>) -> Result<Latent, CodecError>;

    /// Reject a chunk size this codec cannot represent.
    fn check_chunk_size(&self, _chunk_size: usize) -> Result<(), CodecError> {
        Ok(())
    }
}

fn to_safetensors_dtype(dtype: LatentDType) -> Dtype {
    match dtype {
        LatentDType::F16 => Dtype::F16,
        LatentDType::BF16 => Dtype::BF16,
        LatentDType::F32 => Dtype::F32,
    }
}

fn from_safetensors_dtype(dtype: Dtype) -> Result<LatentDType, CodecError> {
    match dtype {
        Dtype::F16 => Ok(LatentDType::F16),
        Dtype::BF16 => Ok(LatentDType::BF16),
        Dtype::F32 => Ok(LatentDType::F32),
        other => Err(CodecError::UnsupportedDType(format!("{:?}", other))),
    }
}

/// Self-describing safetensors codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetensorsCodec;

impl LatentCodec for SafetensorsCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Safetensors
    }

    fn encode(&self, latent: Latent) -> Result<Vec<u8>, CodecError> {
        let view = TensorView::new(
            to_safetensors_dtype(latent.dtype()),
            latent.shape().to_vec(),
            latent.as_bytes(),
        )
        .map_err(|e| CodecError::Container(format!("{:?}", e)))?;
        safetensors::serialize([(TENSOR_NAME, view)], &None)
            .map_err(|e| CodecError::Container(format!("{:?}", e)))
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<Latent, CodecError> {
        let tensors = SafeTensors::deserialize(&bytes)
            .map_err(|e| CodecError::Container(format!("{:?}", e)))?;
        let view = tensors
            .tensor(TENSOR_NAME)
            .map_err(|e| CodecError::Container(format!("{:?}", e)))?;
        let dtype = from_safetensors_dtype(view.dtype())?;
        Ok(Latent::from_raw(dtype, view.shape().to_vec(), view.data().to_vec())?)
    }
}

/// Fixed dtype and shape of one raw-view record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    dtype: LatentDType,
    shape: Vec<usize>,
}

impl RecordLayout {
    /// Validate a layout: at least two axes, no zero dimension.
    pub fn new(dtype: LatentDType, shape: Vec<usize>) -> Result<Self, CodecError> {
        if shape.len() <= SEQ_AXIS {
            return Err(CodecError::InvalidLayout(format!(
                "shape {:?} has no sequence axis",
                shape
            )));
        }
        if shape.contains(&0) {
            return Err(CodecError::InvalidLayout(format!(
                "shape {:?} has a zero dimension",
                shape
            )));
        }
        Ok(Self { dtype, shape })
    }

    /// Conventional `[layers, chunk_size, hidden]` layout.
    pub fn layered(
        dtype: LatentDType,
        num_layers: usize,
        chunk_size: usize,
        hidden_dim: usize,
    ) -> Result<Self, CodecError> {
        Self::new(dtype, vec![num_layers, chunk_size, hidden_dim])
    }

    pub fn dtype(&self) -> LatentDType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn byte_len(&self) -> usize {
        self.shape.iter().product::<usize>() * self.dtype.size_in_bytes()
    }

    fn describe(&self) -> String {
        format!("{}{:?}", self.dtype, self.shape)
    }
}

/// Zero-framing codec bound to one [`RecordLayout`].
///
/// See the module docs for the correctness precondition.
#[derive(Debug, Clone)]
pub struct RawViewCodec {
    layout: RecordLayout,
}

impl RawViewCodec {
    pub fn new(layout: RecordLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }
}

impl LatentCodec for RawViewCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Raw
    }

    fn encode(&self, latent: Latent) -> Result<Vec<u8>, CodecError> {
        if latent.dtype() != self.layout.dtype || latent.shape() != self.layout.shape() {
            return Err(CodecError::LayoutMismatch {
                expected: self.layout.describe(),
                actual: format!("{}{:?}", latent.dtype(), latent.shape()),
            });
        }
        Ok(latent.into_bytes())
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<Latent, CodecError> {
        let expected = self.layout.byte_len();
        if bytes.len() != expected {
            return Err(CodecError::Length {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Latent::from_raw(self.layout.dtype, self.layout.shape.clone(), bytes)?)
    }

    fn check_chunk_size(&self, chunk_size: usize) -> Result<(), CodecError> {
        if self.layout.shape[SEQ_AXIS] != chunk_size {
            return Err(CodecError::LayoutMismatch {
                expected: format!("sequence axis of {} positions", chunk_size),
                actual: self.layout.describe(),
            });
        }
        Ok(())
    }
}

/// Codec selection and raw-view layout as configured for a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub kind: CodecKind,
    /// Raw view only: element type of every record.
    pub raw_dtype: LatentDType,
    /// Raw view only: number of layers (axis 0).
    pub raw_layers: usize,
    /// Raw view only: hidden dimension (axis 2).
    pub raw_hidden: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            kind: CodecKind::Safetensors,
            raw_dtype: LatentDType::F16,
            raw_layers: 0,
            raw_hidden: 0,
        }
    }
}

impl CodecConfig {
    /// Build the configured codec for records of `chunk_size` positions.
    pub fn build(&self, chunk_size: usize) -> Result<Arc<dyn LatentCodec>, CodecError> {
        match self.kind {
            CodecKind::Safetensors => Ok(Arc::new(SafetensorsCodec)),
            CodecKind::Raw => {
                let layout =
                    RecordLayout::layered(self.raw_dtype, self.raw_layers, chunk_size, self.raw_hidden)?;
                Ok(Arc::new(RawViewCodec::new(layout)))
            }
        }
    }
}
