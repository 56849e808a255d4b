//! Content addressing for chunk-aligned token prefixes.
//!
//! Every complete chunk of a sequence is addressed by the SHA-256 digest of
//! the *cumulative* prefix ending at that chunk boundary, so two sequences
//! share an address for chunk `i` only if their first `(i + 1) * chunk_size`
//! tokens are identical.

use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Token id as produced by the tokenizer.
pub type TokenId = u32;

/// Errors raised when a prefix cannot be addressed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Chunk size must be positive")]
    ZeroChunkSize,

    #[error("Cannot address an empty prefix")]
    EmptyPrefix,

    #[error("Prefix length {len} is not a multiple of chunk size {chunk_size}")]
    Misaligned { len: usize, chunk_size: usize },
}

/// 256-bit content address of a cumulative token prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress([u8; 32]);

impl ContentAddress {
    /// Hash a token prefix. Tokens are fed as 4-byte little-endian words.
    pub fn of_tokens(tokens: &[TokenId]) -> Self {
        let mut hasher = Sha256::new();
        feed(&mut hasher, tokens);
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form, used as the key on every storage medium.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn feed(hasher: &mut Sha256, tokens: &[TokenId]) {
    for &t in tokens {
        hasher.update(t.to_le_bytes());
    }
}

/// Chunk-granular addresser bound to one `chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAddresser {
    chunk_size: usize,
}

impl ChunkAddresser {
    pub fn new(chunk_size: usize) -> Result<Self, AddressError> {
        if chunk_size == 0 {
            return Err(AddressError::ZeroChunkSize);
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of complete chunks in a sequence of `len` tokens.
    pub fn complete_chunks(&self, len: usize) -> usize {
        len / self.chunk_size
    }

    /// Address a chunk-aligned cumulative prefix.
    pub fn address(&self, prefix: &[TokenId]) -> Result<ContentAddress, AddressError> {
        if prefix.is_empty() {
            return Err(AddressError::EmptyPrefix);
        }
        if prefix.len() % self.chunk_size != 0 {
            return Err(AddressError::Misaligned {
                len: prefix.len(),
                chunk_size: self.chunk_size,
            });
        }
        Ok(ContentAddress::of_tokens(prefix))
    }

    /// Addresses of every complete chunk of `tokens`, starting at chunk index
    /// `from_chunk`.
    ///
    /// Yields `(chunk_index, address)`; the address for chunk `i` covers
    /// `tokens[..(i + 1) * chunk_size]` and equals `address()` of that slice.
    /// The running digest is cloned at each boundary, so the whole sequence is
    /// hashed once and probing can stop early without wasted work.
    pub fn prefix_addresses<'a>(
        &self,
        tokens: &'a [TokenId],
        from_chunk: usize,
    ) -> PrefixAddresses<'a> {
        let total = self.complete_chunks(tokens.len());
        let mut hasher = Sha256::new();
        let start = from_chunk.min(total);
        feed(&mut hasher, &tokens[..start * self.chunk_size]);
        PrefixAddresses {
            tokens,
            chunk_size: self.chunk_size,
            next: start,
            total,
            hasher,
        }
    }
}

/// Iterator over cumulative-prefix addresses, see [`ChunkAddresser::prefix_addresses`].
pub struct PrefixAddresses<'a> {
    tokens: &'a [TokenId],
    chunk_size: usize,
    next: usize,
    total: usize,
    hasher: Sha256,
}

impl Iterator for PrefixAddresses<'_> {
    type Item = (usize, ContentAddress);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        let chunk = &self.tokens[index * self.chunk_size..(index + 1) * self.chunk_size];
        feed(&mut self.hasher, chunk);
        self.next += 1;
        let digest: [u8; 32] = self.hasher.clone().finalize().into();
        Some((index, ContentAddress(digest)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PrefixAddresses<'_> {}
