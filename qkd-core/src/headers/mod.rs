//! Simulated protocol headers
//!
//! The secure channel only needs to serialize headers and find the next one
//! in a chain, so every header the simulator can carry is a variant of the
//! closed [`NetworkHeader`] enum. Routing headers are framed as byte layouts
//! only; no routing logic lives here.
//!
//! All multi-byte fields are big-endian.

pub mod ip;
pub mod routing;

pub use ip::{
    IcmpEchoHeader, IcmpErrorHeader, IcmpHeader, Ipv4Header, TcpHeader, UdpHeader,
};
pub use routing::{
    AodvMessageType, AodvTypeHeader, AodvqRrepHeader, AodvqRreqHeader, DsdvHeader, DsdvqHeader,
    OlsrMessageHeader, OlsrPacketHeader, RerrHeader, RrepAckHeader, RrepHeader, RreqHeader,
};

use crate::{Error, Result};
use bytes::{Buf, BufMut};
use std::fmt;
use std::net::Ipv4Addr;

/// Discriminant of a [`NetworkHeader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    Ipv4,
    Icmp,
    IcmpEcho,
    IcmpDestinationUnreachable,
    IcmpTimeExceeded,
    Udp,
    Tcp,
    OlsrPacket,
    OlsrMessage,
    AodvType,
    AodvRreq,
    AodvRrep,
    AodvRerr,
    AodvRrepAck,
    AodvqType,
    AodvqRreq,
    AodvqRrep,
    AodvqRerr,
    AodvqRrepAck,
    Dsdv,
    Dsdvq,
}

impl HeaderKind {
    /// Variable-length headers are preceded by a delimiter inside the plaintext
    pub fn is_variable_length(&self) -> bool {
        matches!(self, Self::Tcp | Self::OlsrMessage)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ipv4 => "IPv4",
            Self::Icmp => "ICMP",
            Self::IcmpEcho => "ICMP echo",
            Self::IcmpDestinationUnreachable => "ICMP destination unreachable",
            Self::IcmpTimeExceeded => "ICMP time exceeded",
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
            Self::OlsrPacket => "OLSR packet",
            Self::OlsrMessage => "OLSR message",
            Self::AodvType => "AODV type",
            Self::AodvRreq => "AODV RREQ",
            Self::AodvRrep => "AODV RREP",
            Self::AodvRerr => "AODV RERR",
            Self::AodvRrepAck => "AODV RREP-ACK",
            Self::AodvqType => "AODVQ type",
            Self::AodvqRreq => "AODVQ RREQ",
            Self::AodvqRrep => "AODVQ RREP",
            Self::AodvqRerr => "AODVQ RERR",
            Self::AodvqRrepAck => "AODVQ RREP-ACK",
            Self::Dsdv => "DSDV",
            Self::Dsdvq => "DSDVQ",
        }
    }
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Any header the simulator can put on a packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkHeader {
    Ipv4(Ipv4Header),
    Icmp(IcmpHeader),
    IcmpEcho(IcmpEchoHeader),
    IcmpDestinationUnreachable(IcmpErrorHeader),
    IcmpTimeExceeded(IcmpErrorHeader),
    Udp(UdpHeader),
    Tcp(TcpHeader),
    OlsrPacket(OlsrPacketHeader),
    OlsrMessage(OlsrMessageHeader),
    AodvType(AodvTypeHeader),
    AodvRreq(RreqHeader),
    AodvRrep(RrepHeader),
    AodvRerr(RerrHeader),
    AodvRrepAck(RrepAckHeader),
    AodvqType(AodvTypeHeader),
    AodvqRreq(AodvqRreqHeader),
    AodvqRrep(AodvqRrepHeader),
    AodvqRerr(RerrHeader),
    AodvqRrepAck(RrepAckHeader),
    Dsdv(DsdvHeader),
    Dsdvq(DsdvqHeader),
}

impl NetworkHeader {
    pub fn kind(&self) -> HeaderKind {
        match self {
            Self::Ipv4(_) => HeaderKind::Ipv4,
            Self::Icmp(_) => HeaderKind::Icmp,
            Self::IcmpEcho(_) => HeaderKind::IcmpEcho,
            Self::IcmpDestinationUnreachable(_) => HeaderKind::IcmpDestinationUnreachable,
            Self::IcmpTimeExceeded(_) => HeaderKind::IcmpTimeExceeded,
            Self::Udp(_) => HeaderKind::Udp,
            Self::Tcp(_) => HeaderKind::Tcp,
            Self::OlsrPacket(_) => HeaderKind::OlsrPacket,
            Self::OlsrMessage(_) => HeaderKind::OlsrMessage,
            Self::AodvType(_) => HeaderKind::AodvType,
            Self::AodvRreq(_) => HeaderKind::AodvRreq,
            Self::AodvRrep(_) => HeaderKind::AodvRrep,
            Self::AodvRerr(_) => HeaderKind::AodvRerr,
            Self::AodvRrepAck(_) => HeaderKind::AodvRrepAck,
            Self::AodvqType(_) => HeaderKind::AodvqType,
            Self::AodvqRreq(_) => HeaderKind::AodvqRreq,
            Self::AodvqRrep(_) => HeaderKind::AodvqRrep,
            Self::AodvqRerr(_) => HeaderKind::AodvqRerr,
            Self::AodvqRrepAck(_) => HeaderKind::AodvqRrepAck,
            Self::Dsdv(_) => HeaderKind::Dsdv,
            Self::Dsdvq(_) => HeaderKind::Dsdvq,
        }
    }

    /// Serialized size, excluding any delimiter
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Ipv4(_) => Ipv4Header::SIZE,
            Self::Icmp(_) => IcmpHeader::SIZE,
            Self::IcmpEcho(_) => IcmpEchoHeader::SIZE,
            Self::IcmpDestinationUnreachable(_) | Self::IcmpTimeExceeded(_) => {
                IcmpErrorHeader::SIZE
            }
            Self::Udp(_) => UdpHeader::SIZE,
            Self::Tcp(h) => h.encoded_len(),
            Self::OlsrPacket(_) => OlsrPacketHeader::SIZE,
            Self::OlsrMessage(h) => h.encoded_len(),
            Self::AodvType(_) | Self::AodvqType(_) => AodvTypeHeader::SIZE,
            Self::AodvRreq(_) => RreqHeader::SIZE,
            Self::AodvRrep(_) => RrepHeader::SIZE,
            Self::AodvRerr(h) | Self::AodvqRerr(h) => h.encoded_len(),
            Self::AodvRrepAck(_) | Self::AodvqRrepAck(_) => RrepAckHeader::SIZE,
            Self::AodvqRreq(_) => AodvqRreqHeader::SIZE,
            Self::AodvqRrep(_) => AodvqRrepHeader::SIZE,
            Self::Dsdv(_) => DsdvHeader::SIZE,
            Self::Dsdvq(_) => DsdvqHeader::SIZE,
        }
    }

    pub fn is_variable_length(&self) -> bool {
        self.kind().is_variable_length()
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        match self {
            Self::Ipv4(h) => h.write(buf),
            Self::Icmp(h) => h.write(buf),
            Self::IcmpEcho(h) => h.write(buf),
            Self::IcmpDestinationUnreachable(h) | Self::IcmpTimeExceeded(h) => h.write(buf),
            Self::Udp(h) => h.write(buf),
            Self::Tcp(h) => h.write(buf),
            Self::OlsrPacket(h) => h.write(buf),
            Self::OlsrMessage(h) => h.write(buf),
            Self::AodvType(h) | Self::AodvqType(h) => h.write(buf),
            Self::AodvRreq(h) => h.write(buf),
            Self::AodvRrep(h) => h.write(buf),
            Self::AodvRerr(h) | Self::AodvqRerr(h) => h.write(buf),
            Self::AodvRrepAck(h) | Self::AodvqRrepAck(h) => h.write(buf),
            Self::AodvqRreq(h) => h.write(buf),
            Self::AodvqRrep(h) => h.write(buf),
            Self::Dsdv(h) => h.write(buf),
            Self::Dsdvq(h) => h.write(buf),
        }
    }

    /// Parse a header of `kind` from the front of `buf`, advancing it
    pub fn read(kind: HeaderKind, buf: &mut &[u8]) -> Result<Self> {
        Ok(match kind {
            HeaderKind::Ipv4 => Self::Ipv4(Ipv4Header::read(buf)?),
            HeaderKind::Icmp => Self::Icmp(IcmpHeader::read(buf)?),
            HeaderKind::IcmpEcho => Self::IcmpEcho(IcmpEchoHeader::read(buf)?),
            HeaderKind::IcmpDestinationUnreachable => {
                Self::IcmpDestinationUnreachable(IcmpErrorHeader::read(buf)?)
            }
            HeaderKind::IcmpTimeExceeded => Self::IcmpTimeExceeded(IcmpErrorHeader::read(buf)?),
            HeaderKind::Udp => Self::Udp(UdpHeader::read(buf)?),
            HeaderKind::Tcp => Self::Tcp(TcpHeader::read(buf)?),
            HeaderKind::OlsrPacket => Self::OlsrPacket(OlsrPacketHeader::read(buf)?),
            HeaderKind::OlsrMessage => Self::OlsrMessage(OlsrMessageHeader::read(buf)?),
            HeaderKind::AodvType => Self::AodvType(AodvTypeHeader::read(buf)?),
            HeaderKind::AodvRreq => Self::AodvRreq(RreqHeader::read(buf)?),
            HeaderKind::AodvRrep => Self::AodvRrep(RrepHeader::read(buf)?),
            HeaderKind::AodvRerr => Self::AodvRerr(RerrHeader::read(buf)?),
            HeaderKind::AodvRrepAck => Self::AodvRrepAck(RrepAckHeader::read(buf)?),
            HeaderKind::AodvqType => Self::AodvqType(AodvTypeHeader::read(buf)?),
            HeaderKind::AodvqRreq => Self::AodvqRreq(AodvqRreqHeader::read(buf)?),
            HeaderKind::AodvqRrep => Self::AodvqRrep(AodvqRrepHeader::read(buf)?),
            HeaderKind::AodvqRerr => Self::AodvqRerr(RerrHeader::read(buf)?),
            HeaderKind::AodvqRrepAck => Self::AodvqRrepAck(RrepAckHeader::read(buf)?),
            HeaderKind::Dsdv => Self::Dsdv(DsdvHeader::read(buf)?),
            HeaderKind::Dsdvq => Self::Dsdvq(DsdvqHeader::read(buf)?),
        })
    }
}

pub(crate) fn ensure_len(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.len() < needed {
        return Err(Error::decode(format!(
            "{} needs {} bytes, {} left",
            what,
            needed,
            buf.len()
        )));
    }
    Ok(())
}

pub(crate) fn put_addr<B: BufMut>(buf: &mut B, addr: Ipv4Addr) {
    buf.put_slice(&addr.octets());
}

pub(crate) fn get_addr(buf: &mut &[u8]) -> Ipv4Addr {
    Ipv4Addr::from(buf.get_u32())
}
