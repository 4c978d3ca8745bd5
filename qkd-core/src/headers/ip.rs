//! IPv4, ICMP, UDP and TCP headers

use super::{ensure_len, get_addr, put_addr};
use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes};
use std::net::Ipv4Addr;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// IPv4 header without options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    pub const SIZE: usize = 20;

    // Version 4, IHL 5 words
    const VERSION_IHL: u8 = 0x45;

    pub fn new(source: Ipv4Addr, destination: Ipv4Addr, protocol: u8) -> Self {
        Self {
            tos: 0,
            total_length: Self::SIZE as u16,
            identification: 0,
            flags_fragment: 0,
            ttl: 64,
            protocol,
            checksum: 0,
            source,
            destination,
        }
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(Self::VERSION_IHL);
        buf.put_u8(self.tos);
        buf.put_u16(self.total_length);
        buf.put_u16(self.identification);
        buf.put_u16(self.flags_fragment);
        buf.put_u8(self.ttl);
        buf.put_u8(self.protocol);
        buf.put_u16(self.checksum);
        put_addr(buf, self.source);
        put_addr(buf, self.destination);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "IPv4 header")?;
        let version_ihl = buf.get_u8();
        if version_ihl != Self::VERSION_IHL {
            return Err(Error::decode(format!(
                "unsupported IPv4 version/IHL byte {:#04x}",
                version_ihl
            )));
        }
        Ok(Self {
            tos: buf.get_u8(),
            total_length: buf.get_u16(),
            identification: buf.get_u16(),
            flags_fragment: buf.get_u16(),
            ttl: buf.get_u8(),
            protocol: buf.get_u8(),
            checksum: buf.get_u16(),
            source: get_addr(buf),
            destination: get_addr(buf),
        })
    }
}

/// Common ICMP header: type, code, checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
}

impl IcmpHeader {
    pub const SIZE: usize = 4;

    pub const ECHO_REPLY: u8 = 0;
    pub const DESTINATION_UNREACHABLE: u8 = 3;
    pub const ECHO: u8 = 8;
    pub const TIME_EXCEEDED: u8 = 11;

    pub fn new(icmp_type: u8, code: u8) -> Self {
        Self {
            icmp_type,
            code,
            checksum: 0,
        }
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.icmp_type);
        buf.put_u8(self.code);
        buf.put_u16(self.checksum);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "ICMP header")?;
        Ok(Self {
            icmp_type: buf.get_u8(),
            code: buf.get_u8(),
            checksum: buf.get_u16(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpEchoHeader {
    pub identifier: u16,
    pub sequence: u16,
}

impl IcmpEchoHeader {
    pub const SIZE: usize = 4;

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.identifier);
        buf.put_u16(self.sequence);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "ICMP echo header")?;
        Ok(Self {
            identifier: buf.get_u16(),
            sequence: buf.get_u16(),
        })
    }
}

/// Body of destination-unreachable and time-exceeded messages
///
/// `info` is the 32-bit word after the common header (next-hop MTU for
/// unreachable, unused for time exceeded), followed by the offending IPv4
/// header and the first 8 bytes of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpErrorHeader {
    pub info: u32,
    pub original: Ipv4Header,
    pub data: [u8; 8],
}

impl IcmpErrorHeader {
    pub const SIZE: usize = 4 + Ipv4Header::SIZE + 8;

    pub fn new(original: Ipv4Header, data: [u8; 8]) -> Self {
        Self {
            info: 0,
            original,
            data,
        }
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.info);
        self.original.write(buf);
        buf.put_slice(&self.data);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "ICMP error header")?;
        let info = buf.get_u32();
        let original = Ipv4Header::read(buf)?;
        let mut data = [0u8; 8];
        buf.copy_to_slice(&mut data);
        Ok(Self {
            info,
            original,
            data,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub const SIZE: usize = 8;

    pub fn new(source_port: u16, destination_port: u16) -> Self {
        Self {
            source_port,
            destination_port,
            length: Self::SIZE as u16,
            checksum: 0,
        }
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.source_port);
        buf.put_u16(self.destination_port);
        buf.put_u16(self.length);
        buf.put_u16(self.checksum);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "UDP header")?;
        Ok(Self {
            source_port: buf.get_u16(),
            destination_port: buf.get_u16(),
            length: buf.get_u16(),
            checksum: buf.get_u16(),
        })
    }
}

/// TCP header with options
///
/// The data offset is derived from the option bytes, which must be padded to
/// a multiple of four and may not exceed 40 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    /// Reserved bits and control flags (low 12 bits of the offset word)
    pub flags: u16,
    pub window: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
    options: Bytes,
}

impl TcpHeader {
    pub const MIN_SIZE: usize = 20;
    pub const MAX_OPTIONS: usize = 40;

    pub fn new(source_port: u16, destination_port: u16) -> Self {
        Self {
            source_port,
            destination_port,
            sequence: 0,
            acknowledgement: 0,
            flags: 0,
            window: 65_535,
            checksum: 0,
            urgent_pointer: 0,
            options: Bytes::new(),
        }
    }

    pub fn with_options(mut self, options: impl Into<Bytes>) -> Result<Self> {
        let options = options.into();
        if options.len() % 4 != 0 || options.len() > Self::MAX_OPTIONS {
            return Err(Error::Validation(format!(
                "TCP options must be a multiple of 4 bytes up to {}, got {}",
                Self::MAX_OPTIONS,
                options.len()
            )));
        }
        self.options = options;
        Ok(self)
    }

    pub fn options(&self) -> &Bytes {
        &self.options
    }

    pub fn encoded_len(&self) -> usize {
        Self::MIN_SIZE + self.options.len()
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        let data_offset = (self.encoded_len() / 4) as u16;
        buf.put_u16(self.source_port);
        buf.put_u16(self.destination_port);
        buf.put_u32(self.sequence);
        buf.put_u32(self.acknowledgement);
        buf.put_u16((data_offset << 12) | (self.flags & 0x0fff));
        buf.put_u16(self.window);
        buf.put_u16(self.checksum);
        buf.put_u16(self.urgent_pointer);
        buf.put_slice(&self.options);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::MIN_SIZE, "TCP header")?;
        let source_port = buf.get_u16();
        let destination_port = buf.get_u16();
        let sequence = buf.get_u32();
        let acknowledgement = buf.get_u32();
        let offset_word = buf.get_u16();
        let window = buf.get_u16();
        let checksum = buf.get_u16();
        let urgent_pointer = buf.get_u16();

        let header_len = usize::from(offset_word >> 12) * 4;
        if header_len < Self::MIN_SIZE {
            return Err(Error::decode(format!(
                "TCP data offset {} below minimum",
                header_len
            )));
        }
        let options_len = header_len - Self::MIN_SIZE;
        ensure_len(buf, options_len, "TCP options")?;
        let options = buf.copy_to_bytes(options_len);

        Ok(Self {
            source_port,
            destination_port,
            sequence,
            acknowledgement,
            flags: offset_word & 0x0fff,
            window,
            checksum,
            urgent_pointer,
            options,
        })
    }
}
