//! Protocol-chain plaintext codec
//!
//! The plaintext of a frame is every header of the packet in order, the
//! payload, and a trailing [`CommandHeader`] naming the chain. On receipt the
//! chain is rebuilt from the tag alone: each header says what comes next
//! (IPv4 protocol number, ICMP type, UDP destination port, AODV message
//! type, OLSR packet length). Whatever follows the last inferable header is
//! payload.
//!
//! Packets whose header stack cannot be rebuilt that way are rejected at
//! encode time, so a frame that decodes badly indicates corruption.

use crate::frame::{CommandHeader, DelimiterHeader};
use crate::headers::ip::{IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};
use crate::headers::routing::{AODVQ_PORT, AODV_PORT, DSDVQ_PORT, DSDV_PORT, OLSR_PORT};
use crate::headers::{AodvMessageType, HeaderKind, IcmpHeader, NetworkHeader};
use crate::packet::Packet;
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Value carried in the command header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ProtocolTag {
    /// No headers, payload only
    Raw = 0,
    Ipv4 = 4,
    AodvRreq = 101,
    AodvRrep = 102,
    AodvRerr = 103,
    AodvRrepAck = 104,
    AodvqRreq = 111,
    AodvqRrep = 112,
    AodvqRerr = 113,
    AodvqRrepAck = 114,
    Olsr = 120,
    Dsdv = 130,
    Dsdvq = 131,
}

impl TryFrom<u16> for ProtocolTag {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        Ok(match value {
            0 => Self::Raw,
            4 => Self::Ipv4,
            101 => Self::AodvRreq,
            102 => Self::AodvRrep,
            103 => Self::AodvRerr,
            104 => Self::AodvRrepAck,
            111 => Self::AodvqRreq,
            112 => Self::AodvqRrep,
            113 => Self::AodvqRerr,
            114 => Self::AodvqRrepAck,
            120 => Self::Olsr,
            130 => Self::Dsdv,
            131 => Self::Dsdvq,
            other => return Err(Error::decode(format!("unknown protocol tag {}", other))),
        })
    }
}

impl ProtocolTag {
    /// Tag naming a header stack
    pub fn for_headers(headers: &[NetworkHeader]) -> Result<Self> {
        let first = match headers.first() {
            None => return Ok(Self::Raw),
            Some(NetworkHeader::Ipv4(_)) => return Ok(Self::Ipv4),
            Some(NetworkHeader::Udp(_)) => headers.get(1),
            Some(other) => {
                return Err(Error::Validation(format!(
                    "a {} header cannot lead a protected packet",
                    other.kind()
                )))
            }
        };

        match first {
            Some(NetworkHeader::AodvType(t)) => Ok(match t.message_type {
                AodvMessageType::Rreq => Self::AodvRreq,
                AodvMessageType::Rrep => Self::AodvRrep,
                AodvMessageType::Rerr => Self::AodvRerr,
                AodvMessageType::RrepAck => Self::AodvRrepAck,
            }),
            Some(NetworkHeader::AodvqType(t)) => Ok(match t.message_type {
                AodvMessageType::Rreq => Self::AodvqRreq,
                AodvMessageType::Rrep => Self::AodvqRrep,
                AodvMessageType::Rerr => Self::AodvqRerr,
                AodvMessageType::RrepAck => Self::AodvqRrepAck,
            }),
            Some(NetworkHeader::OlsrPacket(_)) => Ok(Self::Olsr),
            Some(NetworkHeader::Dsdv(_)) => Ok(Self::Dsdv),
            Some(NetworkHeader::Dsdvq(_)) => Ok(Self::Dsdvq),
            _ => Err(Error::Validation(
                "UDP-led packets must carry a routing protocol header".to_string(),
            )),
        }
    }

    /// Kind of the first header in the chain
    pub fn first_kind(&self) -> Option<HeaderKind> {
        match self {
            Self::Raw => None,
            Self::Ipv4 => Some(HeaderKind::Ipv4),
            _ => Some(HeaderKind::Udp),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encode,
    Decode,
}

/// Walks a header chain, telling which header follows the current one
#[derive(Debug)]
struct ChainCursor {
    direction: Direction,
    olsr_remaining: usize,
}

impl ChainCursor {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            olsr_remaining: 0,
        }
    }

    fn fail(&self, msg: String) -> Error {
        match self.direction {
            Direction::Encode => Error::Validation(msg),
            Direction::Decode => Error::Decode(msg),
        }
    }

    /// Kind expected after `header`, `None` when the rest is payload
    fn advance(&mut self, header: &NetworkHeader) -> Result<Option<HeaderKind>> {
        Ok(match header {
            NetworkHeader::Ipv4(ip) => match ip.protocol {
                IPPROTO_ICMP => Some(HeaderKind::Icmp),
                IPPROTO_TCP => Some(HeaderKind::Tcp),
                IPPROTO_UDP => Some(HeaderKind::Udp),
                _ => None,
            },
            NetworkHeader::Icmp(icmp) => match icmp.icmp_type {
                IcmpHeader::ECHO | IcmpHeader::ECHO_REPLY => Some(HeaderKind::IcmpEcho),
                IcmpHeader::DESTINATION_UNREACHABLE => Some(HeaderKind::IcmpDestinationUnreachable),
                IcmpHeader::TIME_EXCEEDED => Some(HeaderKind::IcmpTimeExceeded),
                _ => None,
            },
            NetworkHeader::Udp(udp) => match udp.destination_port {
                AODV_PORT => Some(HeaderKind::AodvType),
                AODVQ_PORT => Some(HeaderKind::AodvqType),
                OLSR_PORT => Some(HeaderKind::OlsrPacket),
                DSDV_PORT => Some(HeaderKind::Dsdv),
                DSDVQ_PORT => Some(HeaderKind::Dsdvq),
                _ => None,
            },
            NetworkHeader::AodvType(t) => Some(match t.message_type {
                AodvMessageType::Rreq => HeaderKind::AodvRreq,
                AodvMessageType::Rrep => HeaderKind::AodvRrep,
                AodvMessageType::Rerr => HeaderKind::AodvRerr,
                AodvMessageType::RrepAck => HeaderKind::AodvRrepAck,
            }),
            NetworkHeader::AodvqType(t) => Some(match t.message_type {
                AodvMessageType::Rreq => HeaderKind::AodvqRreq,
                AodvMessageType::Rrep => HeaderKind::AodvqRrep,
                AodvMessageType::Rerr => HeaderKind::AodvqRerr,
                AodvMessageType::RrepAck => HeaderKind::AodvqRrepAck,
            }),
            NetworkHeader::OlsrPacket(p) => {
                self.olsr_remaining = p.messages_len().ok_or_else(|| {
                    self.fail(format!("OLSR packet length {} below header size", p.length))
                })?;
                self.next_olsr_message()
            }
            NetworkHeader::OlsrMessage(m) => {
                self.olsr_remaining = self
                    .olsr_remaining
                    .checked_sub(m.encoded_len())
                    .ok_or_else(|| {
                        self.fail(format!(
                            "OLSR message of {} bytes overruns its packet ({} left)",
                            m.encoded_len(),
                            self.olsr_remaining
                        ))
                    })?;
                self.next_olsr_message()
            }
            _ => None,
        })
    }

    fn next_olsr_message(&self) -> Option<HeaderKind> {
        (self.olsr_remaining > 0).then_some(HeaderKind::OlsrMessage)
    }
}

/// Plaintext size of `packet`, command header included
pub fn encoded_len(packet: &Packet) -> usize {
    let headers: usize = packet
        .headers()
        .iter()
        .map(|h| {
            let delimiter = if h.is_variable_length() {
                DelimiterHeader::SIZE
            } else {
                0
            };
            delimiter + h.encoded_len()
        })
        .sum();
    headers + packet.payload().len() + CommandHeader::SIZE
}

/// Serialize `packet` into frame plaintext
///
/// Fails with `Error::Validation` when the header stack could not be rebuilt
/// from its protocol tag on the receiving side.
pub fn encode(packet: &Packet) -> Result<BytesMut> {
    let headers = packet.headers();
    let tag = ProtocolTag::for_headers(headers)?;
    let mut cursor = ChainCursor::new(Direction::Encode);
    let mut expected = tag.first_kind();
    let mut buf = BytesMut::with_capacity(encoded_len(packet));

    for header in headers {
        let kind = header.kind();
        match expected {
            Some(want) if want == kind => {}
            Some(want) => {
                return Err(Error::Validation(format!(
                    "expected {} header, found {}",
                    want, kind
                )))
            }
            None => {
                return Err(Error::Validation(format!(
                    "{} header follows the end of the protocol chain",
                    kind
                )))
            }
        }

        if kind.is_variable_length() {
            let delimiter = DelimiterHeader::for_len(header.encoded_len())?;
            buf.put_slice(&delimiter.to_bytes());
        }
        header.write(&mut buf);
        expected = cursor.advance(header)?;
    }

    if let Some(missing) = expected {
        return Err(Error::Validation(format!(
            "protocol chain incomplete, missing {} header",
            missing
        )));
    }

    buf.put_slice(packet.payload());
    buf.put_slice(&CommandHeader::new(tag as u16).to_bytes());
    Ok(buf)
}

/// Rebuild a packet from frame plaintext
///
/// Every failure is an `Error::Decode`.
pub fn decode(plaintext: &[u8]) -> Result<Packet> {
    let split = plaintext.len().checked_sub(CommandHeader::SIZE).ok_or_else(|| {
        Error::decode(format!(
            "plaintext of {} bytes has no command header",
            plaintext.len()
        ))
    })?;
    let (body, trailer) = plaintext.split_at(split);
    let tag = ProtocolTag::try_from(CommandHeader::from_bytes(trailer)?.protocol)?;

    let mut rest = body;
    let mut headers = Vec::new();
    let mut cursor = ChainCursor::new(Direction::Decode);
    let mut next = tag.first_kind();

    while let Some(kind) = next {
        let header = read_header(kind, &mut rest)?;
        next = cursor.advance(&header)?;
        headers.push(header);
    }

    if ProtocolTag::for_headers(&headers).ok() != Some(tag) {
        return Err(Error::decode(format!(
            "decoded chain does not match protocol tag {:?}",
            tag
        )));
    }

    Ok(Packet::with_headers(headers, Bytes::copy_from_slice(rest)))
}

fn read_header(kind: HeaderKind, rest: &mut &[u8]) -> Result<NetworkHeader> {
    if !kind.is_variable_length() {
        return NetworkHeader::read(kind, rest);
    }

    let delimiter = DelimiterHeader::from_bytes(rest)?;
    let len = usize::from(delimiter.delimiter_size);
    let after_delimiter = &rest[DelimiterHeader::SIZE..];
    if after_delimiter.len() < len {
        return Err(Error::decode(format!(
            "delimited {} header of {} bytes, {} left",
            kind,
            len,
            after_delimiter.len()
        )));
    }

    let (mut section, tail) = after_delimiter.split_at(len);
    let header = NetworkHeader::read(kind, &mut section)?;
    if !section.is_empty() {
        return Err(Error::decode(format!(
            "{} header shorter than its delimiter ({} bytes unused)",
            kind,
            section.len()
        )));
    }
    *rest = tail;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{
        AodvTypeHeader, IcmpEchoHeader, Ipv4Header, OlsrMessageHeader, OlsrPacketHeader,
        RreqHeader, TcpHeader, UdpHeader,
    };
    use std::net::Ipv4Addr;

    const A: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);
    const B: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 2);

    fn assert_round_trip(packet: &Packet) {
        let plaintext = encode(packet).unwrap();
        assert_eq!(plaintext.len(), encoded_len(packet));
        let decoded = decode(&plaintext).unwrap();
        assert!(decoded.same_contents(packet), "{:?} != {:?}", decoded, packet);
    }

    #[test]
    fn test_raw_payload() {
        let packet = Packet::new(b"hello".to_vec());
        let plaintext = encode(&packet).unwrap();
        assert_eq!(&plaintext[..5], b"hello");
        assert_eq!(&plaintext[5..], &[0, 0, 0]);
        assert_round_trip(&packet);
    }

    #[test]
    fn test_ipv4_udp_chain() {
        let packet = Packet::with_headers(
            vec![
                NetworkHeader::Ipv4(Ipv4Header::new(A, B, IPPROTO_UDP)),
                NetworkHeader::Udp(UdpHeader::new(5000, 9)),
            ],
            vec![1u8; 100],
        );
        let plaintext = encode(&packet).unwrap();
        assert_eq!(&plaintext[plaintext.len() - 3..], &[0, 4, 0]);
        assert_round_trip(&packet);
    }

    #[test]
    fn test_tcp_is_delimited() {
        let tcp = TcpHeader::new(80, 8080).with_options(vec![0u8; 8]).unwrap();
        let packet = Packet::with_headers(
            vec![
                NetworkHeader::Ipv4(Ipv4Header::new(A, B, IPPROTO_TCP)),
                NetworkHeader::Tcp(tcp),
            ],
            vec![5u8; 10],
        );
        let plaintext = encode(&packet).unwrap();
        assert_eq!(plaintext[20], 28);
        assert_round_trip(&packet);
    }

    #[test]
    fn test_icmp_echo_chain() {
        let packet = Packet::with_headers(
            vec![
                NetworkHeader::Ipv4(Ipv4Header::new(A, B, IPPROTO_ICMP)),
                NetworkHeader::Icmp(IcmpHeader::new(IcmpHeader::ECHO, 0)),
                NetworkHeader::IcmpEcho(IcmpEchoHeader {
                    identifier: 1,
                    sequence: 2,
                }),
            ],
            vec![0xEE; 16],
        );
        assert_round_trip(&packet);
    }

    #[test]
    fn test_olsr_messages_repeat_until_length_exhausted() {
        let messages = vec![
            OlsrMessageHeader::new(1, A, vec![1u8; 4]),
            OlsrMessageHeader::new(2, B, vec![2u8; 8]),
            OlsrMessageHeader::new(3, A, Bytes::new()),
        ];
        let olsr = OlsrPacketHeader::for_messages(1, &messages).unwrap();
        let mut headers = vec![
            NetworkHeader::Udp(UdpHeader::new(OLSR_PORT, OLSR_PORT)),
            NetworkHeader::OlsrPacket(olsr),
        ];
        headers.extend(messages.into_iter().map(NetworkHeader::OlsrMessage));

        let packet = Packet::with_headers(headers, vec![9u8; 3]);
        let plaintext = encode(&packet).unwrap();
        let decoded = decode(&plaintext).unwrap();
        assert_eq!(decoded.headers().len(), 5);
        assert_eq!(decoded.payload().as_ref(), &[9u8; 3]);
        assert_eq!(&plaintext[plaintext.len() - 3..], &[0, 120, 0]);
    }

    #[test]
    fn test_aodv_tag() {
        let packet = Packet::with_headers(
            vec![
                NetworkHeader::Udp(UdpHeader::new(AODV_PORT, AODV_PORT)),
                NetworkHeader::AodvType(AodvTypeHeader::new(AodvMessageType::Rreq)),
                NetworkHeader::AodvRreq(RreqHeader {
                    flags: 0,
                    hop_count: 0,
                    request_id: 1,
                    destination: B,
                    destination_seq: 0,
                    origin: A,
                    origin_seq: 1,
                }),
            ],
            Bytes::new(),
        );
        assert_eq!(
            ProtocolTag::for_headers(packet.headers()).unwrap(),
            ProtocolTag::AodvRreq
        );
        assert_round_trip(&packet);
    }

    #[test]
    fn test_inconsistent_chains_are_rejected() {
        // IPv4 says UDP, stack carries ICMP
        let wrong_next = Packet::with_headers(
            vec![
                NetworkHeader::Ipv4(Ipv4Header::new(A, B, IPPROTO_UDP)),
                NetworkHeader::Icmp(IcmpHeader::new(IcmpHeader::ECHO, 0)),
            ],
            Bytes::new(),
        );
        assert!(matches!(encode(&wrong_next), Err(Error::Validation(_))));

        // IPv4 says TCP, stack stops early
        let incomplete = Packet::with_headers(
            vec![NetworkHeader::Ipv4(Ipv4Header::new(A, B, IPPROTO_TCP))],
            Bytes::new(),
        );
        assert!(matches!(encode(&incomplete), Err(Error::Validation(_))));

        // UDP on an unknown port cannot lead
        let bare_udp = Packet::with_headers(
            vec![NetworkHeader::Udp(UdpHeader::new(1, 2))],
            Bytes::new(),
        );
        assert!(encode(&bare_udp).is_err());
    }

    #[test]
    fn test_decode_failures_are_hard_errors() {
        assert!(decode(&[0, 4]).unwrap_err().is_decode_error());
        // Unknown tag
        assert!(decode(&[0, 0, 0x7F, 0]).unwrap_err().is_decode_error());
        // IPv4 tag with a truncated header
        assert!(decode(&[0x45, 0, 0, 0, 4, 0]).unwrap_err().is_decode_error());
    }
}
