//! Owned latent tensor with exact byte storage.
//!
//! Elements are kept as row-major little-endian bytes so that 16-bit types
//! never pass through an `f32` intermediate. Axis [`SEQ_AXIS`] is the
//! token-position axis; the conventional layout is `[layers, tokens, hidden]`.

use std::fmt;
use std::str::FromStr;

use half::{bf16, f16};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token-position axis of every latent tensor.
pub const SEQ_AXIS: usize = 1;

/// Errors raised by latent tensor construction and slicing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LatentError {
    #[error("Latent rank {rank} too low: need at least {} axes", SEQ_AXIS + 1)]
    RankTooLow { rank: usize },

    #[error("Element count mismatch: shape needs {expected}, got {actual}")]
    ElementCount { expected: usize, actual: usize },

    #[error("Byte length mismatch: shape needs {expected} bytes, got {actual}")]
    ByteLength { expected: usize, actual: usize },

    #[error("Element type mismatch: expected {expected}, got {actual}")]
    DTypeMismatch {
        expected: LatentDType,
        actual: LatentDType,
    },

    #[error("Sequence range {start}..{} out of bounds for length {seq_len}", .start + .len)]
    OutOfRange {
        start: usize,
        len: usize,
        seq_len: usize,
    },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Cannot concatenate zero latents")]
    EmptyConcat,

    #[error("Unknown element type: {0}")]
    UnknownDType(String),
}

/// Supported latent element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatentDType {
    F16,
    BF16,
    F32,
}

impl LatentDType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            Self::F16 | Self::BF16 => 2,
            Self::F32 => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
        }
    }
}

impl fmt::Display for LatentDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LatentDType {
    type Err = LatentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f16" | "float16" | "half" => Ok(Self::F16),
            "bf16" | "bfloat16" => Ok(Self::BF16),
            "f32" | "float32" | "float" => Ok(Self::F32),
            other => Err(LatentError::UnknownDType(other.to_string())),
        }
    }
}

/// Latent state tensor.
///
/// Equality is byte equality, so two latents compare equal only when they
/// are bit-identical (NaN payloads included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Latent {
    dtype: LatentDType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

fn check_rank(shape: &[usize]) -> Result<(), LatentError> {
    if shape.len() <= SEQ_AXIS {
        return Err(LatentError::RankTooLow { rank: shape.len() });
    }
    Ok(())
}

fn check_count(shape: &[usize], actual: usize) -> Result<(), LatentError> {
    check_rank(shape)?;
    let expected = element_count(shape);
    if expected != actual {
        return Err(LatentError::ElementCount { expected, actual });
    }
    Ok(())
}

impl Latent {
    /// Wrap raw little-endian bytes without copying.
    pub fn from_raw(dtype: LatentDType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self, LatentError> {
        check_rank(&shape)?;
        let expected = element_count(&shape) * dtype.size_in_bytes();
        if data.len() != expected {
            return Err(LatentError::ByteLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn from_f16(shape: Vec<usize>, values: &[f16]) -> Result<Self, LatentError> {
        check_count(&shape, values.len())?;
        let mut data = Vec::with_capacity(values.len() * 2);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Ok(Self { dtype: LatentDType::F16, shape, data })
    }

    pub fn from_bf16(shape: Vec<usize>, values: &[bf16]) -> Result<Self, LatentError> {
        check_count(&shape, values.len())?;
        let mut data = Vec::with_capacity(values.len() * 2);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Ok(Self { dtype: LatentDType::BF16, shape, data })
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Result<Self, LatentError> {
        check_count(&shape, values.len())?;
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Ok(Self { dtype: LatentDType::F32, shape, data })
    }

    pub fn to_f16_vec(&self) -> Result<Vec<f16>, LatentError> {
        self.expect_dtype(LatentDType::F16)?;
        Ok(self
            .data
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes([b[0], b[1]]))
            .collect())
    }

    pub fn to_bf16_vec(&self) -> Result<Vec<bf16>, LatentError> {
        self.expect_dtype(LatentDType::BF16)?;
        Ok(self
            .data
            .chunks_exact(2)
            .map(|b| bf16::from_le_bytes([b[0], b[1]]))
            .collect())
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>, LatentError> {
        self.expect_dtype(LatentDType::F32)?;
        Ok(self
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn expect_dtype(&self, expected: LatentDType) -> Result<(), LatentError> {
        if self.dtype != expected {
            return Err(LatentError::DTypeMismatch {
                expected,
                actual: self.dtype,
            });
        }
        Ok(())
    }

    pub fn dtype(&self) -> LatentDType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Number of token positions.
    pub fn seq_len(&self) -> usize {
        self.shape[SEQ_AXIS]
    }

    pub fn num_elements(&self) -> usize {
        element_count(&self.shape)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    /// Bytes spanned by one token position for one outer index.
    fn row_bytes(&self) -> usize {
        element_count(&self.shape[SEQ_AXIS + 1..]) * self.dtype.size_in_bytes()
    }

    fn outer(&self) -> usize {
        element_count(&self.shape[..SEQ_AXIS])
    }

    /// Copy out positions `start..start + len` along the sequence axis.
    pub fn narrow_seq(&self, start: usize, len: usize) -> Result<Latent, LatentError> {
        let seq_len = self.seq_len();
        if start + len > seq_len {
            return Err(LatentError::OutOfRange { start, len, seq_len });
        }
        let row = self.row_bytes();
        let stride = seq_len * row;
        let mut data = Vec::with_capacity(self.outer() * len * row);
        for o in 0..self.outer() {
            let begin = o * stride + start * row;
            data.extend_from_slice(&self.data[begin..begin + len * row]);
        }
        let mut shape = self.shape.clone();
        shape[SEQ_AXIS] = len;
        Ok(Latent { dtype: self.dtype, shape, data })
    }

    fn same_non_seq_dims(&self, other: &Latent) -> bool {
        self.shape.len() == other.shape.len()
            && self
                .shape
                .iter()
                .zip(&other.shape)
                .enumerate()
                .all(|(axis, (a, b))| axis == SEQ_AXIS || a == b)
    }

    /// True if `other` can follow `self` in [`Latent::concat_seq`].
    pub fn concat_compatible(&self, other: &Latent) -> bool {
        self.dtype == other.dtype && self.same_non_seq_dims(other)
    }

    /// Concatenate along the sequence axis.
    ///
    /// All parts must share element type and every non-sequence dimension.
    pub fn concat_seq(parts: &[Latent]) -> Result<Latent, LatentError> {
        let first = parts.first().ok_or(LatentError::EmptyConcat)?;
        let mut total_seq = 0;
        for part in parts {
            if part.dtype != first.dtype {
                return Err(LatentError::DTypeMismatch {
                    expected: first.dtype,
                    actual: part.dtype,
                });
            }
            if !first.same_non_seq_dims(part) {
                return Err(LatentError::ShapeMismatch {
                    expected: first.shape.clone(),
                    actual: part.shape.clone(),
                });
            }
            total_seq += part.seq_len();
        }

        if parts.len() == 1 {
            return Ok(first.clone());
        }

        let row = first.row_bytes();
        let mut data = Vec::with_capacity(first.outer() * total_seq * row);
        for o in 0..first.outer() {
            for part in parts {
                let stride = part.seq_len() * row;
                data.extend_from_slice(&part.data[o * stride..(o + 1) * stride]);
            }
        }
        let mut shape = first.shape.clone();
        shape[SEQ_AXIS] = total_seq;
        Ok(Latent { dtype: first.dtype, shape, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: Vec<usize>) -> Latent {
        let n: usize = shape.iter().product();
        let values: Vec<f32> = (0..n).map(|i| i as f32).collect();
        Latent::from_f32(shape, &values).unwrap()
    }

    #[test]
    fn rank_one_rejected() {
        let err = Latent::from_f32(vec![4], &[0.0; 4]).unwrap_err();
        assert_eq!(err, LatentError::RankTooLow { rank: 1 });
    }

    #[test]
    fn element_count_checked() {
        let err = Latent::from_f32(vec![2, 2], &[0.0; 3]).unwrap_err();
        assert_eq!(err, LatentError::ElementCount { expected: 4, actual: 3 });
    }

    #[test]
    fn from_raw_checks_byte_length() {
        let err = Latent::from_raw(LatentDType::F16, vec![1, 2, 2], vec![0; 7]).unwrap_err();
        assert_eq!(err, LatentError::ByteLength { expected: 8, actual: 7 });
    }

    #[test]
    fn narrow_picks_positions_per_layer() {
        // [2 layers, 3 tokens, 2 hidden]
        let latent = ramp(vec![2, 3, 2]);
        let mid = latent.narrow_seq(1, 1).unwrap();
        assert_eq!(mid.shape(), &[2, 1, 2]);
        assert_eq!(mid.to_f32_vec().unwrap(), vec![2.0, 3.0, 8.0, 9.0]);
    }

    #[test]
    fn narrow_out_of_range() {
        let latent = ramp(vec![1, 3, 1]);
        assert!(matches!(
            latent.narrow_seq(2, 2),
            Err(LatentError::OutOfRange { start: 2, len: 2, seq_len: 3 })
        ));
    }

    #[test]
    fn concat_inverts_narrow() {
        let latent = ramp(vec![2, 6, 3]);
        let parts: Vec<_> = (0..3).map(|i| latent.narrow_seq(i * 2, 2).unwrap()).collect();
        assert_eq!(Latent::concat_seq(&parts).unwrap(), latent);
    }

    #[test]
    fn concat_rejects_mixed_dtype() {
        let a = Latent::from_f32(vec![1, 1, 1], &[1.0]).unwrap();
        let b = Latent::from_f16(vec![1, 1, 1], &[f16::ONE]).unwrap();
        assert!(matches!(
            Latent::concat_seq(&[a, b]),
            Err(LatentError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn concat_rejects_hidden_mismatch() {
        let a = ramp(vec![1, 1, 2]);
        let b = ramp(vec![1, 1, 3]);
        assert!(matches!(
            Latent::concat_seq(&[a, b]),
            Err(LatentError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn concat_compatibility_ignores_seq_axis_only() {
        let a = ramp(vec![2, 4, 3]);
        assert!(a.concat_compatible(&ramp(vec![2, 1, 3])));
        assert!(!a.concat_compatible(&ramp(vec![2, 4, 5])));
        assert!(!a.concat_compatible(&ramp(vec![2, 4])));
        let halves = Latent::from_f16(vec![2, 4, 3], &[f16::ZERO; 24]).unwrap();
        assert!(!a.concat_compatible(&halves));
    }

    #[test]
    fn concat_empty_is_error() {
        assert_eq!(Latent::concat_seq(&[]), Err(LatentError::EmptyConcat));
    }

    #[test]
    fn f16_bits_preserved() {
        let values = [f16::from_bits(0x3c01), f16::from_bits(0x7e01), f16::MIN_POSITIVE_SUBNORMAL];
        let latent = Latent::from_f16(vec![1, 3, 1], &values).unwrap();
        let back = latent.to_f16_vec().unwrap();
        let bits: Vec<u16> = back.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, vec![0x3c01, 0x7e01, 0x0001]);
    }

    #[test]
    fn dtype_parse() {
        assert_eq!("F16".parse::<LatentDType>().unwrap(), LatentDType::F16);
        assert_eq!("bfloat16".parse::<LatentDType>().unwrap(), LatentDType::BF16);
        assert!("int8".parse::<LatentDType>().is_err());
    }
}
