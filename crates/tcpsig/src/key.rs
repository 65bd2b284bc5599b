//! Shared-secret key material.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Longest key accepted, in bytes (TCP_MD5SIG_MAXKEYLEN).
pub const MAX_KEY_LEN: usize = 80;

/// Owned key bytes of an SA, zeroed when dropped.
///
/// `Debug` never prints the key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SaKey {
    bytes: Vec<u8>,
    bits: u16,
}

impl SaKey {
    /// Copy `bits` worth of key material out of `data`.
    ///
    /// `data` must hold at least `ceil(bits / 8)` bytes; trailing bytes are
    /// ignored. The copy is allocated with `try_reserve_exact` so allocation
    /// failure surfaces as [`Error::ResourceExhausted`].
    pub fn copy_from(data: &[u8], bits: u16) -> Result<Self> {
        let len = usize::from(bits).div_ceil(8);
        if len == 0 || len > MAX_KEY_LEN || data.len() < len {
            return Err(Error::InvalidKeyLength {
                bits,
                len: data.len(),
            });
        }

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|e| Error::ResourceExhausted(format!("key buffer: {}", e)))?;
        bytes.extend_from_slice(&data[..len]);

        Ok(Self { bytes, bits })
    }

    /// Build a key from a byte string, using its full length.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let bits = u16::try_from(data.len() * 8).map_err(|_| Error::InvalidKeyLength {
            bits: u16::MAX,
            len: data.len(),
        })?;
        Self::copy_from(data, bits)
    }

    /// Key length in bits.
    pub fn bits(&self) -> u16 {
        self.bits
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; empty keys are rejected on construction.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaKey")
            .field("bits", &self.bits)
            .finish_non_exhaustive()
    }
}
