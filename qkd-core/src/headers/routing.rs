//! Routing protocol headers (AODV, AODVQ, OLSR, DSDV, DSDVQ)
//!
//! The Q variants extend their base message with a 32-bit key-material
//! metric appended after the base fields.

use super::{ensure_len, get_addr, put_addr};
use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes};
use std::net::Ipv4Addr;

pub const AODV_PORT: u16 = 654;
pub const AODVQ_PORT: u16 = 655;
pub const OLSR_PORT: u16 = 698;
pub const DSDV_PORT: u16 = 269;
pub const DSDVQ_PORT: u16 = 270;

/// OLSR packet header: total packet length (this header included) and sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OlsrPacketHeader {
    pub length: u16,
    pub sequence: u16,
}

impl OlsrPacketHeader {
    pub const SIZE: usize = 4;

    /// Header whose length covers exactly `messages`
    pub fn for_messages(sequence: u16, messages: &[OlsrMessageHeader]) -> Result<Self> {
        let total = Self::SIZE + messages.iter().map(|m| m.encoded_len()).sum::<usize>();
        let length = u16::try_from(total).map_err(|_| {
            Error::Validation(format!("OLSR packet of {} bytes is too long", total))
        })?;
        Ok(Self { length, sequence })
    }

    /// Bytes of messages announced after this header
    pub fn messages_len(&self) -> Option<usize> {
        usize::from(self.length).checked_sub(Self::SIZE)
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.length);
        buf.put_u16(self.sequence);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "OLSR packet header")?;
        Ok(Self {
            length: buf.get_u16(),
            sequence: buf.get_u16(),
        })
    }
}

/// One OLSR message: 12-byte message header plus its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OlsrMessageHeader {
    pub message_type: u8,
    pub vtime: u8,
    pub originator: Ipv4Addr,
    pub ttl: u8,
    pub hop_count: u8,
    pub sequence: u16,
    pub body: Bytes,
}

impl OlsrMessageHeader {
    pub const HEADER_SIZE: usize = 12;

    pub fn new(message_type: u8, originator: Ipv4Addr, body: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            vtime: 0,
            originator,
            ttl: 255,
            hop_count: 0,
            sequence: 0,
            body: body.into(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.body.len()
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.message_type);
        buf.put_u8(self.vtime);
        buf.put_u16(self.encoded_len() as u16);
        put_addr(buf, self.originator);
        buf.put_u8(self.ttl);
        buf.put_u8(self.hop_count);
        buf.put_u16(self.sequence);
        buf.put_slice(&self.body);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::HEADER_SIZE, "OLSR message header")?;
        let message_type = buf.get_u8();
        let vtime = buf.get_u8();
        let size = usize::from(buf.get_u16());
        let originator = get_addr(buf);
        let ttl = buf.get_u8();
        let hop_count = buf.get_u8();
        let sequence = buf.get_u16();

        let body_len = size.checked_sub(Self::HEADER_SIZE).ok_or_else(|| {
            Error::decode(format!("OLSR message size {} below header size", size))
        })?;
        ensure_len(buf, body_len, "OLSR message body")?;

        Ok(Self {
            message_type,
            vtime,
            originator,
            ttl,
            hop_count,
            sequence,
            body: buf.copy_to_bytes(body_len),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AodvMessageType {
    Rreq = 1,
    Rrep = 2,
    Rerr = 3,
    RrepAck = 4,
}

impl TryFrom<u8> for AodvMessageType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Rreq),
            2 => Ok(Self::Rrep),
            3 => Ok(Self::Rerr),
            4 => Ok(Self::RrepAck),
            other => Err(Error::decode(format!("unknown AODV message type {}", other))),
        }
    }
}

/// Leading type byte of AODV and AODVQ messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AodvTypeHeader {
    pub message_type: AodvMessageType,
}

impl AodvTypeHeader {
    pub const SIZE: usize = 1;

    pub fn new(message_type: AodvMessageType) -> Self {
        Self { message_type }
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.message_type as u8);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "AODV type header")?;
        Ok(Self {
            message_type: AodvMessageType::try_from(buf.get_u8())?,
        })
    }
}

/// Route request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RreqHeader {
    pub flags: u8,
    pub hop_count: u8,
    pub request_id: u32,
    pub destination: Ipv4Addr,
    pub destination_seq: u32,
    pub origin: Ipv4Addr,
    pub origin_seq: u32,
}

impl RreqHeader {
    pub const SIZE: usize = 23;

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.flags);
        buf.put_u8(0);
        buf.put_u8(self.hop_count);
        buf.put_u32(self.request_id);
        put_addr(buf, self.destination);
        buf.put_u32(self.destination_seq);
        put_addr(buf, self.origin);
        buf.put_u32(self.origin_seq);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "RREQ header")?;
        let flags = buf.get_u8();
        buf.advance(1);
        Ok(Self {
            flags,
            hop_count: buf.get_u8(),
            request_id: buf.get_u32(),
            destination: get_addr(buf),
            destination_seq: buf.get_u32(),
            origin: get_addr(buf),
            origin_seq: buf.get_u32(),
        })
    }
}

/// Route reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RrepHeader {
    pub flags: u8,
    pub prefix_size: u8,
    pub hop_count: u8,
    pub destination: Ipv4Addr,
    pub destination_seq: u32,
    pub origin: Ipv4Addr,
    pub lifetime_ms: u32,
}

impl RrepHeader {
    pub const SIZE: usize = 19;

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.flags);
        buf.put_u8(self.prefix_size);
        buf.put_u8(self.hop_count);
        put_addr(buf, self.destination);
        buf.put_u32(self.destination_seq);
        put_addr(buf, self.origin);
        buf.put_u32(self.lifetime_ms);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "RREP header")?;
        Ok(Self {
            flags: buf.get_u8(),
            prefix_size: buf.get_u8(),
            hop_count: buf.get_u8(),
            destination: get_addr(buf),
            destination_seq: buf.get_u32(),
            origin: get_addr(buf),
            lifetime_ms: buf.get_u32(),
        })
    }
}

/// Route error: list of unreachable destinations with their sequence numbers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerrHeader {
    pub flags: u8,
    unreachable: Vec<(Ipv4Addr, u32)>,
}

impl RerrHeader {
    pub const BASE_SIZE: usize = 3;
    const ENTRY_SIZE: usize = 8;

    pub fn new(flags: u8, unreachable: Vec<(Ipv4Addr, u32)>) -> Result<Self> {
        if unreachable.len() > usize::from(u8::MAX) {
            return Err(Error::Validation(format!(
                "RERR can list at most 255 destinations, got {}",
                unreachable.len()
            )));
        }
        Ok(Self { flags, unreachable })
    }

    pub fn unreachable(&self) -> &[(Ipv4Addr, u32)] {
        &self.unreachable
    }

    pub fn encoded_len(&self) -> usize {
        Self::BASE_SIZE + Self::ENTRY_SIZE * self.unreachable.len()
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.flags);
        buf.put_u8(0);
        buf.put_u8(self.unreachable.len() as u8);
        for (addr, seq) in &self.unreachable {
            put_addr(buf, *addr);
            buf.put_u32(*seq);
        }
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::BASE_SIZE, "RERR header")?;
        let flags = buf.get_u8();
        buf.advance(1);
        let count = usize::from(buf.get_u8());
        ensure_len(buf, count * Self::ENTRY_SIZE, "RERR destinations")?;

        let mut unreachable = Vec::with_capacity(count);
        for _ in 0..count {
            let addr = get_addr(buf);
            unreachable.push((addr, buf.get_u32()));
        }
        Ok(Self { flags, unreachable })
    }
}

/// Route reply acknowledgement (one reserved byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RrepAckHeader;

impl RrepAckHeader {
    pub const SIZE: usize = 1;

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(0);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "RREP-ACK header")?;
        buf.advance(1);
        Ok(Self)
    }
}

/// Route request carrying the path's key-material metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AodvqRreqHeader {
    pub rreq: RreqHeader,
    pub key_metric: u32,
}

impl AodvqRreqHeader {
    pub const SIZE: usize = RreqHeader::SIZE + 4;

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        self.rreq.write(buf);
        buf.put_u32(self.key_metric);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "AODVQ RREQ header")?;
        let rreq = RreqHeader::read(buf)?;
        Ok(Self {
            rreq,
            key_metric: buf.get_u32(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AodvqRrepHeader {
    pub rrep: RrepHeader,
    pub key_metric: u32,
}

impl AodvqRrepHeader {
    pub const SIZE: usize = RrepHeader::SIZE + 4;

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        self.rrep.write(buf);
        buf.put_u32(self.key_metric);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "AODVQ RREP header")?;
        let rrep = RrepHeader::read(buf)?;
        Ok(Self {
            rrep,
            key_metric: buf.get_u32(),
        })
    }
}

/// DSDV routing update entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsdvHeader {
    pub destination: Ipv4Addr,
    pub hop_count: u32,
    pub destination_seq: u32,
}

impl DsdvHeader {
    pub const SIZE: usize = 12;

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        put_addr(buf, self.destination);
        buf.put_u32(self.hop_count);
        buf.put_u32(self.destination_seq);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "DSDV header")?;
        Ok(Self {
            destination: get_addr(buf),
            hop_count: buf.get_u32(),
            destination_seq: buf.get_u32(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsdvqHeader {
    pub dsdv: DsdvHeader,
    pub key_metric: u32,
}

impl DsdvqHeader {
    pub const SIZE: usize = DsdvHeader::SIZE + 4;

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        self.dsdv.write(buf);
        buf.put_u32(self.key_metric);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        ensure_len(buf, Self::SIZE, "DSDVQ header")?;
        let dsdv = DsdvHeader::read(buf)?;
        Ok(Self {
            dsdv,
            key_metric: buf.get_u32(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_olsr_packet_length_covers_messages() {
        let messages = vec![
            OlsrMessageHeader::new(1, Ipv4Addr::new(10, 0, 0, 1), vec![0u8; 8]),
            OlsrMessageHeader::new(2, Ipv4Addr::new(10, 0, 0, 2), vec![0u8; 4]),
        ];
        let packet = OlsrPacketHeader::for_messages(7, &messages).unwrap();
        assert_eq!(packet.length, 4 + 20 + 16);
        assert_eq!(packet.messages_len(), Some(36));
    }

    #[test]
    fn test_olsr_message_size_field() {
        let message = OlsrMessageHeader::new(1, Ipv4Addr::new(10, 0, 0, 1), vec![9u8; 6]);
        let mut buf = BytesMut::new();
        message.write(&mut buf);
        assert_eq!(&buf[2..4], &[0, 18]);

        let parsed = OlsrMessageHeader::read(&mut &buf[..]).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_olsr_message_undersized() {
        let mut bytes = [0u8; 12];
        bytes[3] = 4;
        assert!(OlsrMessageHeader::read(&mut &bytes[..]).is_err());
    }

    #[test]
    fn test_aodv_type_codes() {
        let mut buf = BytesMut::new();
        AodvTypeHeader::new(AodvMessageType::Rerr).write(&mut buf);
        assert_eq!(&buf[..], &[3]);
        assert!(AodvTypeHeader::read(&mut &[9u8][..]).is_err());
    }

    #[test]
    fn test_fixed_sizes() {
        let addr = Ipv4Addr::new(1, 2, 3, 4);
        let rrep = RrepHeader {
            flags: 0,
            prefix_size: 0,
            hop_count: 1,
            destination: addr,
            destination_seq: 1,
            origin: addr,
            lifetime_ms: 3000,
        };
        let mut buf = BytesMut::new();
        rrep.write(&mut buf);
        assert_eq!(buf.len(), RrepHeader::SIZE);

        buf.clear();
        AodvqRrepHeader {
            rrep,
            key_metric: 5,
        }
        .write(&mut buf);
        assert_eq!(buf.len(), 23);
    }

    #[test]
    fn test_rerr_entries() {
        let rerr = RerrHeader::new(0, vec![(Ipv4Addr::new(10, 0, 0, 9), 44)]).unwrap();
        assert_eq!(rerr.encoded_len(), 11);

        let mut buf = BytesMut::new();
        rerr.write(&mut buf);
        let parsed = RerrHeader::read(&mut &buf[..]).unwrap();
        assert_eq!(parsed.unreachable(), &[(Ipv4Addr::new(10, 0, 0, 9), 44)]);
    }
}
