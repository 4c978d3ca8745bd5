//! Simulated packets
//!
//! A [`Packet`] is a stack of typed protocol headers (outermost first), an opaque
//! payload and out-of-band tags. Tags never reach the wire; they tell the link
//! manager whether and how to protect the packet and carry its type of service.

use crate::headers::NetworkHeader;
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encryption applied to a frame (wire codes 0-2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EncryptionType {
    #[default]
    None = 0,
    Otp = 1,
    Aes = 2,
}

impl TryFrom<u8> for EncryptionType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Otp),
            2 => Ok(Self::Aes),
            other => Err(Error::decode(format!("unknown encryption type {}", other))),
        }
    }
}

impl fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Otp => "otp",
            Self::Aes => "aes",
        })
    }
}

/// Authentication applied to a frame (wire codes 0, 3-5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AuthenticationType {
    #[default]
    None = 0,
    Vmac = 3,
    Md5 = 4,
    Sha1 = 5,
}

impl AuthenticationType {
    /// Only VMAC is keyed and draws material from the key buffer
    pub fn needs_key(&self) -> bool {
        matches!(self, Self::Vmac)
    }
}

impl TryFrom<u8> for AuthenticationType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::None),
            3 => Ok(Self::Vmac),
            4 => Ok(Self::Md5),
            5 => Ok(Self::Sha1),
            other => Err(Error::decode(format!(
                "unknown authentication type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Vmac => "vmac",
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
        })
    }
}

/// Out-of-band metadata attached to a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketTags {
    pub encrypt: EncryptionType,
    pub authenticate: AuthenticationType,
    pub tos: Option<u8>,
    pub processed: bool,
}

impl PacketTags {
    /// True when the link manager has to run the packet through the engine
    pub fn needs_processing(&self) -> bool {
        self.encrypt != EncryptionType::None || self.authenticate != AuthenticationType::None
    }
}

/// Header stack + payload + tags
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    headers: Vec<NetworkHeader>,
    payload: Bytes,
    tags: PacketTags,
}

impl Packet {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            headers: Vec::new(),
            payload: payload.into(),
            tags: PacketTags::default(),
        }
    }

    /// Opaque bytes without any parsed header (frames, foreign traffic)
    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Self::new(bytes)
    }

    /// Build a packet from headers listed outermost first
    pub fn with_headers(headers: Vec<NetworkHeader>, payload: impl Into<Bytes>) -> Self {
        Self {
            headers,
            payload: payload.into(),
            tags: PacketTags::default(),
        }
    }

    /// Prepend a header, it becomes the outermost one
    pub fn add_header(&mut self, header: NetworkHeader) {
        self.headers.insert(0, header);
    }

    /// Remove and return the outermost header
    pub fn remove_header(&mut self) -> Option<NetworkHeader> {
        if self.headers.is_empty() {
            None
        } else {
            Some(self.headers.remove(0))
        }
    }

    pub fn peek_header(&self) -> Option<&NetworkHeader> {
        self.headers.first()
    }

    pub fn headers(&self) -> &[NetworkHeader] {
        &self.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn tags(&self) -> &PacketTags {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut PacketTags {
        &mut self.tags
    }

    /// Ask the link manager to encrypt and/or authenticate this packet
    pub fn mark(&mut self, encrypt: EncryptionType, authenticate: AuthenticationType) {
        self.tags.encrypt = encrypt;
        self.tags.authenticate = authenticate;
    }

    pub fn set_tos(&mut self, tos: u8) {
        self.tags.tos = Some(tos);
    }

    /// Priority band from the TOS tag, falling back to the IPv4 header
    pub fn priority_band(&self) -> u8 {
        let tos = self.tags.tos.or_else(|| match self.headers.first() {
            Some(NetworkHeader::Ipv4(ip)) => Some(ip.tos),
            _ => None,
        });
        tos.map(tos_to_band).unwrap_or(1)
    }

    /// Wire size of headers plus payload
    pub fn size(&self) -> usize {
        self.headers.iter().map(NetworkHeader::encoded_len).sum::<usize>() + self.payload.len()
    }

    /// Serialize every header followed by the payload
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        for header in &self.headers {
            header.write(&mut buf);
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Same headers and payload, ignoring tags
    pub fn same_contents(&self, other: &Packet) -> bool {
        self.headers == other.headers && self.payload == other.payload
    }
}

// pfifo_fast priority map, indexed by socket priority
const PRIO_TO_BAND: [u8; 16] = [1, 2, 2, 2, 1, 2, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1];

const PRIO_BESTEFFORT: u8 = 0;
const PRIO_BULK: u8 = 2;
const PRIO_INTERACTIVE_BULK: u8 = 4;
const PRIO_INTERACTIVE: u8 = 6;

/// Socket priority derived from the TOS byte
pub fn tos_to_priority(tos: u8) -> u8 {
    match (tos & 0x1e) >> 1 {
        0..=3 => PRIO_BESTEFFORT,
        4..=7 => PRIO_BULK,
        8..=11 => PRIO_INTERACTIVE,
        _ => PRIO_INTERACTIVE_BULK,
    }
}

/// Queue band (0 = highest priority) for a TOS byte
pub fn tos_to_band(tos: u8) -> u8 {
    PRIO_TO_BAND[usize::from(tos_to_priority(tos) & 0x0f)]
}
