// SPDX-License-Identifier: MIT
//
// QKD Network Simulator: Key Buffers and Secure Channel Engine
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Secure-channel wire headers
//!
//! Every processed packet leaves a node as
//!
//! ```text
//! [u32 length][u32 messageId][u8 encrypted][u8 authenticated][u8 zipped]
//! [u8 version=2][u8 reserved][u16 channelId][u32 encryptionKeyId]
//! [u32 authenticationKeyId][33-byte authTag][ciphertext...]
//! ```
//!
//! All integers are big-endian. `length` covers the header and the ciphertext
//! and is what the stream de-framer relies on. The plaintext behind the
//! ciphertext ends with a [`CommandHeader`]; variable-length inner headers are
//! preceded by a [`DelimiterHeader`].

use crate::packet::{AuthenticationType, EncryptionType};
use crate::{Error, Result};
use bytes::{Buf, BufMut};

/// Protocol version carried by every valid frame
pub const FRAME_VERSION: u8 = 2;

/// Width of the authentication tag field
pub const AUTH_TAG_LEN: usize = 33;

/// Secure-channel header prefixed to every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub message_id: u32,
    pub encrypted: u8,
    pub authenticated: u8,
    pub zipped: u8,
    pub version: u8,
    pub reserved: u8,
    pub channel_id: u16,
    pub encryption_key_id: u32,
    pub authentication_key_id: u32,
    pub auth_tag: [u8; AUTH_TAG_LEN],
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            length: Self::SIZE as u32,
            message_id: 0,
            encrypted: EncryptionType::None as u8,
            authenticated: AuthenticationType::None as u8,
            zipped: 0,
            version: FRAME_VERSION,
            reserved: 0,
            channel_id: 0,
            encryption_key_id: 0,
            authentication_key_id: 0,
            auth_tag: [0u8; AUTH_TAG_LEN],
        }
    }
}

impl FrameHeader {
    /// Serialized size in bytes
    pub const SIZE: usize = 4 + 4 + 1 + 1 + 1 + 1 + 1 + 2 + 4 + 4 + AUTH_TAG_LEN;

    pub fn new(message_id: u32, channel_id: u16) -> Self {
        Self {
            message_id,
            channel_id,
            ..Default::default()
        }
    }

    /// Offset of the version byte
    pub const VERSION_OFFSET: usize = 11;

    /// A header is ours only when it carries the current version
    pub fn is_valid(&self) -> bool {
        self.version == FRAME_VERSION
    }

    /// Version byte of a possibly incomplete header
    pub fn peek_version(bytes: &[u8]) -> Option<u8> {
        bytes.get(Self::VERSION_OFFSET).copied()
    }

    pub fn encryption_type(&self) -> Result<EncryptionType> {
        EncryptionType::try_from(self.encrypted)
    }

    pub fn authentication_type(&self) -> Result<AuthenticationType> {
        AuthenticationType::try_from(self.authenticated)
    }

    pub fn is_zipped(&self) -> bool {
        self.zipped != 0
    }

    /// Number of ciphertext bytes following the header
    pub fn body_len(&self) -> Result<usize> {
        (self.length as usize)
            .checked_sub(Self::SIZE)
            .ok_or_else(|| {
                Error::decode(format!(
                    "frame length {} shorter than header size {}",
                    self.length,
                    Self::SIZE
                ))
            })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut buf = &mut out[..];
        buf.put_u32(self.length);
        buf.put_u32(self.message_id);
        buf.put_u8(self.encrypted);
        buf.put_u8(self.authenticated);
        buf.put_u8(self.zipped);
        buf.put_u8(self.version);
        buf.put_u8(self.reserved);
        buf.put_u16(self.channel_id);
        buf.put_u32(self.encryption_key_id);
        buf.put_u32(self.authentication_key_id);
        buf.put_slice(&self.auth_tag);
        out
    }

    /// Parse the header at the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::decode(format!(
                "frame header needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }

        let mut buf = &bytes[..Self::SIZE];
        let length = buf.get_u32();
        let message_id = buf.get_u32();
        let encrypted = buf.get_u8();
        let authenticated = buf.get_u8();
        let zipped = buf.get_u8();
        let version = buf.get_u8();
        let reserved = buf.get_u8();
        let channel_id = buf.get_u16();
        let encryption_key_id = buf.get_u32();
        let authentication_key_id = buf.get_u32();
        let mut auth_tag = [0u8; AUTH_TAG_LEN];
        buf.copy_to_slice(&mut auth_tag);

        Ok(Self {
            length,
            message_id,
            encrypted,
            authenticated,
            zipped,
            version,
            reserved,
            channel_id,
            encryption_key_id,
            authentication_key_id,
            auth_tag,
        })
    }
}

/// Identity of the first header inside the plaintext
///
/// Placed at the very end of the plaintext, so nothing outside the ciphertext
/// reveals the original protocol chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandHeader {
    pub protocol: u16,
    pub command: u8,
}

impl CommandHeader {
    pub const SIZE: usize = 3;

    pub fn new(protocol: u16) -> Self {
        Self {
            protocol,
            command: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let p = self.protocol.to_be_bytes();
        [p[0], p[1], self.command]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [hi, lo, command] => Ok(Self {
                protocol: u16::from_be_bytes([*hi, *lo]),
                command: *command,
            }),
            _ => Err(Error::decode(format!(
                "command header needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            ))),
        }
    }
}

/// Byte length of the variable-length header that follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimiterHeader {
    pub delimiter_size: u8,
}

impl DelimiterHeader {
    pub const SIZE: usize = 1;

    /// Fails when the delimited header does not fit the one-byte size field
    pub fn for_len(len: usize) -> Result<Self> {
        u8::try_from(len)
            .map(|delimiter_size| Self { delimiter_size })
            .map_err(|_| {
                Error::Validation(format!(
                    "variable-length header of {} bytes exceeds delimiter range",
                    len
                ))
            })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.delimiter_size]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bytes
            .first()
            .map(|&delimiter_size| Self { delimiter_size })
            .ok_or_else(|| Error::decode("missing delimiter header"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_and_layout() {
        assert_eq!(FrameHeader::SIZE, 56);

        let mut header = FrameHeader::new(0x0102_0304, 0xBEEF);
        header.length = 0x0000_0100;
        header.encrypted = 1;
        header.authenticated = 3;
        header.encryption_key_id = 7;
        header.authentication_key_id = 8;
        header.auth_tag[0] = 0xAA;
        header.auth_tag[32] = 0xBB;

        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], &[0, 0, 1, 0]);
        assert_eq!(&bytes[4..8], &[1, 2, 3, 4]);
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[9], 3);
        assert_eq!(bytes[10], 0);
        assert_eq!(bytes[11], FRAME_VERSION);
        assert_eq!(&bytes[13..15], &[0xBE, 0xEF]);
        assert_eq!(&bytes[15..19], &[0, 0, 0, 7]);
        assert_eq!(&bytes[19..23], &[0, 0, 0, 8]);
        assert_eq!(bytes[23], 0xAA);
        assert_eq!(bytes[55], 0xBB);

        assert_eq!(FrameHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_version_gates_validity() {
        let mut header = FrameHeader::default();
        assert!(header.is_valid());
        header.version = 1;
        assert!(!header.is_valid());

        let bytes = header.to_bytes();
        let parsed = FrameHeader::from_bytes(&bytes).unwrap();
        assert!(!parsed.is_valid());
        assert_eq!(FrameHeader::peek_version(&bytes[..12]), Some(1));
        assert_eq!(FrameHeader::peek_version(&bytes[..11]), None);
    }

    #[test]
    fn test_short_input_is_rejected() {
        let err = FrameHeader::from_bytes(&[0u8; 20]).unwrap_err();
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_body_len() {
        let mut header = FrameHeader::default();
        header.length = 100;
        assert_eq!(header.body_len().unwrap(), 44);
        header.length = 10;
        assert!(header.body_len().is_err());
    }

    #[test]
    fn test_command_header() {
        let header = CommandHeader {
            protocol: 0x0102,
            command: 9,
        };
        assert_eq!(header.to_bytes(), [1, 2, 9]);
        assert_eq!(CommandHeader::from_bytes(&[1, 2, 9]).unwrap(), header);
        assert!(CommandHeader::from_bytes(&[1, 2]).is_err());
    }

    #[test]
    fn test_delimiter_range() {
        assert_eq!(DelimiterHeader::for_len(60).unwrap().to_bytes(), [60]);
        assert!(DelimiterHeader::for_len(256).is_err());
        assert!(DelimiterHeader::from_bytes(&[]).is_err());
    }
}
