//! Cipher and authentication primitives used by the crypto engine

use crate::frame::AUTH_TAG_LEN;
use crate::packet::AuthenticationType;
use crate::{Error, Result};
use aes::{Aes128, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

type HmacSha256 = Hmac<Sha256>;
type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Key size drawn from the buffer for a VMAC tag
pub const VMAC_KEY_BITS: u32 = 256;

/// One-time pad: XOR `data` in place with `key`
///
/// The pad must be at least as long as the data.
pub fn otp_apply(data: &mut [u8], key: &[u8]) -> Result<()> {
    if key.len() < data.len() {
        return Err(Error::Crypto(format!(
            "one-time pad of {} bytes cannot cover {} bytes",
            key.len(),
            data.len()
        )));
    }
    data.iter_mut().zip(key).for_each(|(d, k)| *d ^= k);
    Ok(())
}

/// AES in counter mode, in place
///
/// 16-byte keys select AES-128, 32-byte keys AES-256. The initial counter
/// block carries the message id in its first four bytes, so no two frames of
/// one sender share a keystream even if a key were reused.
pub fn aes_ctr_apply(data: &mut [u8], key: &[u8], message_id: u32) -> Result<()> {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&message_id.to_be_bytes());

    let invalid = |e: ctr::cipher::InvalidLength| {
        Error::Crypto(format!("AES key of {} bytes: {}", key.len(), e))
    };
    match key.len() {
        16 => Aes128Ctr::new_from_slices(key, &iv)
            .map_err(invalid)?
            .apply_keystream(data),
        32 => Aes256Ctr::new_from_slices(key, &iv)
            .map_err(invalid)?
            .apply_keystream(data),
        other => {
            return Err(Error::Crypto(format!(
                "unsupported AES key length {} bytes",
                other
            )))
        }
    }
    Ok(())
}

/// Produces and checks the 33-byte authentication tag of a frame
pub struct FrameSigner<'a> {
    kind: AuthenticationType,
    key: Option<&'a [u8]>,
}

impl<'a> FrameSigner<'a> {
    /// `key` is required for VMAC and ignored by the unkeyed digests
    pub fn new(kind: AuthenticationType, key: Option<&'a [u8]>) -> Self {
        Self { kind, key }
    }

    /// Tag over `data`, zero-padded to the tag field width
    pub fn sign(&self, data: &[u8]) -> Result<[u8; AUTH_TAG_LEN]> {
        let mut tag = [0u8; AUTH_TAG_LEN];
        match self.kind {
            AuthenticationType::None => {}
            AuthenticationType::Vmac => {
                let key = self
                    .key
                    .ok_or_else(|| Error::Crypto("VMAC requires a key".to_string()))?;
                let mut mac = HmacSha256::new_from_slice(key)
                    .map_err(|e| Error::Crypto(format!("Invalid key length: {}", e)))?;
                mac.update(data);
                copy_digest(&mut tag, &mac.finalize().into_bytes());
            }
            AuthenticationType::Md5 => copy_digest(&mut tag, &Md5::digest(data)),
            AuthenticationType::Sha1 => copy_digest(&mut tag, &Sha1::digest(data)),
        }
        Ok(tag)
    }

    /// Compare the full tag field in constant time
    pub fn verify(&self, data: &[u8], tag: &[u8; AUTH_TAG_LEN]) -> Result<bool> {
        let expected = self.sign(data)?;
        let diff = expected
            .iter()
            .zip(tag.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        Ok(diff == 0)
    }
}

fn copy_digest(tag: &mut [u8; AUTH_TAG_LEN], digest: &[u8]) {
    let len = digest.len().min(AUTH_TAG_LEN);
    tag[..len].copy_from_slice(&digest[..len]);
}

/// gzip-compress a plaintext
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len()), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`compress`]; corrupt input is a decode error
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::decode(format!("gzip: {}", e)))?;
    Ok(out)
}
