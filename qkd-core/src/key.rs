//! Key material records
//!
//! A [`KeyMaterial`] is handed out by a key buffer for exactly one use and is
//! dropped afterwards. Buffers only account for key *amounts*; the bits of a key
//! are synthesised from the link's shared secret and the key id, so the two
//! endpoints of a link derive identical bytes for the same id without sharing
//! any state.

use crate::{Error, Result};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const SYNTHESIS_LABEL: &[u8] = b"qkd-key";

/// One-shot key record
#[derive(PartialEq, Eq)]
pub struct KeyMaterial {
    id: u32,
    size_bits: u32,
    raw: Bytes,
}

impl KeyMaterial {
    /// Derive the bits of key `id` from the link secret
    ///
    /// HMAC-SHA256 in counter mode over `label || id || size || counter`,
    /// truncated to `ceil(size_bits / 8)` bytes. Unused bits of the last byte
    /// are cleared.
    pub fn synthesize(id: u32, size_bits: u32, link_secret: &[u8]) -> Result<Self> {
        let len = bytes_for_bits(size_bits);
        let mut output = Vec::with_capacity(len);
        let mut counter = 1u32;

        while output.len() < len {
            let mut mac = HmacSha256::new_from_slice(link_secret)
                .map_err(|e| Error::Crypto(format!("HMAC init failed: {}", e)))?;
            mac.update(SYNTHESIS_LABEL);
            mac.update(&id.to_be_bytes());
            mac.update(&size_bits.to_be_bytes());
            mac.update(&counter.to_be_bytes());
            output.extend_from_slice(&mac.finalize().into_bytes());
            counter += 1;
        }

        output.truncate(len);
        mask_trailing_bits(&mut output, size_bits);
        Ok(Self {
            id,
            size_bits,
            raw: Bytes::from(output),
        })
    }

    /// Wrap existing key bits
    pub fn from_raw(id: u32, size_bits: u32, raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        if raw.len() != bytes_for_bits(size_bits) {
            return Err(Error::Validation(format!(
                "key {} declares {} bits but carries {} bytes",
                id,
                size_bits,
                raw.len()
            )));
        }
        Ok(Self { id, size_bits, raw })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn size_bits(&self) -> u32 {
        self.size_bits
    }

    pub fn size_bytes(&self) -> usize {
        self.raw.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Consume the record, keeping only its bits
    pub fn into_bytes(self) -> Bytes {
        self.raw
    }

    /// Short hex fingerprint for logs (first 4 bytes)
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.raw[..self.raw.len().min(4)])
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("size_bits", &self.size_bits)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

pub(crate) fn bytes_for_bits(bits: u32) -> usize {
    (bits as usize).div_ceil(8)
}

fn mask_trailing_bits(bytes: &mut [u8], size_bits: u32) {
    let spare = (bytes.len() * 8) as u32 - size_bits;
    if spare > 0 {
        if let Some(last) = bytes.last_mut() {
            *last &= 0xFFu8 << spare;
        }
    }
}
