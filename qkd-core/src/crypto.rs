//! Secure-channel crypto engine
//!
//! Outbound: packet → chain plaintext → optional gzip → OTP/AES → tag →
//! framed bytes. Inbound: stream chunks → reassembled frames → tag check →
//! decrypt → gunzip → rebuilt packet. Keys are drawn from the link's
//! [`KeyBuffer`] on both sides; the receiver asks for the same key ids the
//! sender put in the frame header.
//!
//! Running out of key material, failing authentication and waiting for the
//! rest of a frame all yield empty results. Only a frame that passes
//! authentication and then fails to decode is an error.

use crate::buffer::{KeyBuffer, KeyBufferStatus};
use crate::chain;
use crate::cipher::{self, FrameSigner, VMAC_KEY_BITS};
use crate::config::CryptoConfig;
use crate::frame::{FrameHeader, FRAME_VERSION};
use crate::key::KeyMaterial;
use crate::metrics::Metrics;
use crate::packet::{AuthenticationType, EncryptionType, Packet, PacketTags};
use crate::{Error, IdSpace, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use tracing::{debug, error, instrument, trace, warn};

/// Per-node secure-channel engine shared by every link of a manager
pub struct CryptoEngine {
    config: CryptoConfig,
    ids: IdSpace,
    metrics: Metrics,
    // Partial frames per channel
    reassembly: HashMap<u32, BytesMut>,
}

impl CryptoEngine {
    pub fn new(config: CryptoConfig, ids: IdSpace, metrics: Metrics) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ids,
            metrics,
            reassembly: HashMap::new(),
        })
    }

    pub fn config(&self) -> &CryptoConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Authentication actually applied to a packet with these tags
    ///
    /// Encrypted packets are never sent without a tag.
    pub fn effective_authentication(&self, tags: &PacketTags) -> AuthenticationType {
        if tags.authenticate == AuthenticationType::None && tags.encrypt != EncryptionType::None {
            self.config.default_authentication
        } else {
            tags.authenticate
        }
    }

    /// Key bits needed to protect `packet`, based on its uncompressed plaintext
    pub fn required_key_bits(&self, packet: &Packet) -> u64 {
        let tags = packet.tags();
        let encryption = match tags.encrypt {
            EncryptionType::None => 0,
            EncryptionType::Otp => chain::encoded_len(packet) as u64 * 8,
            EncryptionType::Aes => u64::from(self.config.aes_key_bits),
        };
        let authentication = if self.effective_authentication(tags).needs_key() {
            u64::from(VMAC_KEY_BITS)
        } else {
            0
        };
        encryption + authentication
    }

    /// Encrypt, authenticate and frame a packet
    ///
    /// Returns no frame when the buffer runs out of key material. A key taken
    /// for encryption is not returned if the authentication key then fails.
    #[instrument(skip(self, packet, buffer), fields(buffer = buffer.id()))]
    pub fn process_outgoing_packet(
        &mut self,
        packet: &Packet,
        buffer: &mut KeyBuffer,
        channel_id: u32,
    ) -> Result<Vec<Bytes>> {
        let channel = u16::try_from(channel_id).map_err(|_| {
            Error::Validation(format!("channel id {} does not fit the frame header", channel_id))
        })?;
        let tags = *packet.tags();
        let authentication = self.effective_authentication(&tags);

        let mut body = chain::encode(packet)?.to_vec();
        let zipped = self.config.compression;
        if zipped {
            body = cipher::compress(&body)?;
        }

        let message_id = self.ids.messages.next_id();
        let mut header = FrameHeader::new(message_id, channel);
        header.zipped = u8::from(zipped);

        match tags.encrypt {
            EncryptionType::None => {}
            EncryptionType::Otp => {
                let bits = key_bits_for(body.len())?;
                let Some(key) = buffer.process_outgoing_request(bits) else {
                    return Ok(self.key_shortage(buffer, "OTP", bits));
                };
                cipher::otp_apply(&mut body, key.as_bytes())?;
                self.note_encryption_key(&mut header, EncryptionType::Otp, &key);
            }
            EncryptionType::Aes => {
                let bits = self.config.aes_key_bits;
                let Some(key) = buffer.process_outgoing_request(bits) else {
                    return Ok(self.key_shortage(buffer, "AES", bits));
                };
                cipher::aes_ctr_apply(&mut body, key.as_bytes(), message_id)?;
                self.note_encryption_key(&mut header, EncryptionType::Aes, &key);
            }
        }

        if authentication != AuthenticationType::None {
            let key = if authentication.needs_key() {
                let Some(key) = buffer.process_outgoing_request(VMAC_KEY_BITS) else {
                    return Ok(self.key_shortage(buffer, "VMAC", VMAC_KEY_BITS));
                };
                header.authentication_key_id = key.id();
                self.metrics.record_authentication_key(key.size_bits());
                Some(key)
            } else {
                None
            };

            let signer = FrameSigner::new(authentication, key.as_ref().map(KeyMaterial::as_bytes));
            header.auth_tag = signer.sign(&body)?;
            header.authenticated = authentication as u8;
        }

        let total = FrameHeader::SIZE + body.len();
        header.length = u32::try_from(total)
            .map_err(|_| Error::Validation(format!("frame of {} bytes is too long", total)))?;

        let mut frame = BytesMut::with_capacity(total);
        frame.put_slice(&header.to_bytes());
        frame.put_slice(&body);
        let frame = frame.freeze();

        debug!(
            message_id,
            channel_id,
            length = total,
            encryption = %tags.encrypt,
            authentication = %authentication,
            zipped,
            "Frame built"
        );
        self.metrics.record_frame_sent(frame.len());
        Ok(vec![frame])
    }

    /// Reassemble, authenticate and decrypt a transport chunk
    ///
    /// Returns every packet completed by this chunk, possibly none. A frame
    /// that fails to decode is logged and counted; the frames around it are
    /// still delivered.
    #[instrument(skip(self, chunk, buffer), fields(buffer = buffer.id(), len = chunk.len()))]
    pub fn process_incoming_packet(
        &mut self,
        chunk: &[u8],
        buffer: &mut KeyBuffer,
        channel_id: u32,
    ) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        for frame in self.check_for_fragmentation(chunk, channel_id) {
            match self.decrypt(&frame, buffer) {
                Ok(Some(packet)) => packets.push(packet),
                Ok(None) => {}
                Err(e) => {
                    error!(channel_id, len = frame.len(), "Dropping undecodable frame: {}", e);
                    self.metrics.record_decode_failure();
                }
            }
        }
        Ok(packets)
    }

    /// Split the channel's byte stream into complete frames
    ///
    /// Bytes of an incomplete trailing frame stay cached for the next chunk.
    /// A chunk that does not start with a valid header while nothing is
    /// cached is returned whole, as a foreign frame.
    pub fn check_for_fragmentation(&mut self, chunk: &[u8], channel_id: u32) -> Vec<Bytes> {
        let cache = self.reassembly.entry(channel_id).or_default();
        let was_empty = cache.is_empty();
        cache.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let Some(version) = FrameHeader::peek_version(cache) else {
                break;
            };
            if version != FRAME_VERSION {
                if was_empty && frames.is_empty() {
                    trace!(channel_id, len = cache.len(), "Passing foreign chunk through");
                    frames.push(cache.split().freeze());
                } else {
                    warn!(
                        channel_id,
                        dropped = cache.len(),
                        "Invalid frame header mid-stream, clearing reassembly cache"
                    );
                    cache.clear();
                }
                break;
            }

            if cache.len() < FrameHeader::SIZE {
                break;
            }
            let length = match FrameHeader::from_bytes(cache) {
                Ok(header) => header.length as usize,
                Err(_) => break,
            };
            if length < FrameHeader::SIZE {
                warn!(
                    channel_id,
                    length, "Frame length below header size, clearing reassembly cache"
                );
                cache.clear();
                break;
            }
            if cache.len() < length {
                break;
            }
            frames.push(cache.split_to(length).freeze());
        }

        if !cache.is_empty() {
            trace!(
                channel_id,
                cached = cache.len(),
                completed = frames.len(),
                "Incomplete frame cached"
            );
            self.metrics.record_reassembly_stall();
        }
        frames
    }

    /// Authenticate, decrypt and decode one complete frame
    ///
    /// `Ok(None)` when key material is missing or authentication fails.
    pub fn decrypt(&mut self, frame: &[u8], buffer: &mut KeyBuffer) -> Result<Option<Packet>> {
        if FrameHeader::peek_version(frame) != Some(FRAME_VERSION)
            || frame.len() < FrameHeader::SIZE
        {
            self.metrics.record_foreign_frame();
            return Ok(Some(Packet::raw(Bytes::copy_from_slice(frame))));
        }

        let header = FrameHeader::from_bytes(frame)?;
        let body_len = header.body_len()?;
        let body = frame
            .get(FrameHeader::SIZE..FrameHeader::SIZE + body_len)
            .ok_or_else(|| {
                Error::decode(format!(
                    "frame announces {} bytes, carries {}",
                    header.length,
                    frame.len()
                ))
            })?;
        let encryption = header.encryption_type()?;
        let authentication = header.authentication_type()?;
        self.metrics.record_frame_received(frame.len());

        // The header is outside the tag, so its authentication field cannot
        // be trusted to waive verification of a ciphertext
        if encryption != EncryptionType::None && authentication == AuthenticationType::None {
            warn!(
                message_id = header.message_id,
                channel_id = header.channel_id,
                encryption = %encryption,
                "Encrypted frame without authentication, dropping frame"
            );
            self.metrics.record_authentication_failure();
            return Ok(None);
        }

        if authentication != AuthenticationType::None {
            let key = if authentication.needs_key() {
                let Some(key) =
                    buffer.process_incoming_request(header.authentication_key_id, VMAC_KEY_BITS)
                else {
                    self.key_shortage(buffer, "VMAC", VMAC_KEY_BITS);
                    return Ok(None);
                };
                self.metrics.record_authentication_key(key.size_bits());
                Some(key)
            } else {
                None
            };

            let signer = FrameSigner::new(authentication, key.as_ref().map(KeyMaterial::as_bytes));
            if !signer.verify(body, &header.auth_tag)? {
                warn!(
                    message_id = header.message_id,
                    channel_id = header.channel_id,
                    authentication = %authentication,
                    "Authentication failed, dropping frame"
                );
                self.metrics.record_authentication_failure();
                return Ok(None);
            }
        }

        let mut plaintext = body.to_vec();
        match encryption {
            EncryptionType::None => {}
            EncryptionType::Otp => {
                let bits = key_bits_for(plaintext.len())?;
                let Some(key) = buffer.process_incoming_request(header.encryption_key_id, bits)
                else {
                    self.key_shortage(buffer, "OTP", bits);
                    return Ok(None);
                };
                cipher::otp_apply(&mut plaintext, key.as_bytes())?;
                self.metrics.record_encryption_key(bits);
            }
            EncryptionType::Aes => {
                let bits = self.config.aes_key_bits;
                let Some(key) = buffer.process_incoming_request(header.encryption_key_id, bits)
                else {
                    self.key_shortage(buffer, "AES", bits);
                    return Ok(None);
                };
                cipher::aes_ctr_apply(&mut plaintext, key.as_bytes(), header.message_id)?;
                self.metrics.record_encryption_key(bits);
            }
        }

        if header.is_zipped() {
            plaintext = cipher::decompress(&plaintext)?;
        }

        let mut packet = chain::decode(&plaintext)?;
        packet.mark(encryption, authentication);
        debug!(
            message_id = header.message_id,
            channel_id = header.channel_id,
            headers = packet.headers().len(),
            payload = packet.payload().len(),
            "Frame decrypted"
        );
        Ok(Some(packet))
    }

    /// Admission control for a packet about to be queued in `band`
    pub fn check_for_resources_to_process_the_packet(
        &self,
        packet: &Packet,
        band: u8,
        buffer: &KeyBuffer,
    ) -> bool {
        let required = self.required_key_bits(packet);
        let admitted = if buffer.current() <= required {
            false
        } else {
            !(band != 0 && buffer.fetch_state() == KeyBufferStatus::Empty)
        };

        if !admitted {
            debug!(
                buffer = buffer.id(),
                band,
                required,
                current = buffer.current(),
                status = %buffer.fetch_state(),
                "Packet not admitted"
            );
            self.metrics.record_admission_rejection();
        }
        admitted
    }

    /// Bytes waiting for the rest of a frame on `channel_id`
    pub fn pending_reassembly_bytes(&self, channel_id: u32) -> usize {
        self.reassembly.get(&channel_id).map_or(0, BytesMut::len)
    }

    /// Forget the reassembly state of a torn-down channel
    pub fn clear_channel(&mut self, channel_id: u32) {
        self.reassembly.remove(&channel_id);
    }

    fn note_encryption_key(
        &self,
        header: &mut FrameHeader,
        encryption: EncryptionType,
        key: &KeyMaterial,
    ) {
        header.encrypted = encryption as u8;
        header.encryption_key_id = key.id();
        self.metrics.record_encryption_key(key.size_bits());
    }

    fn key_shortage(&self, buffer: &KeyBuffer, purpose: &str, bits: u32) -> Vec<Bytes> {
        warn!(
            buffer = buffer.id(),
            purpose,
            requested = bits,
            current = buffer.current(),
            "Not enough key material, dropping packet"
        );
        self.metrics.record_key_shortage();
        Vec::new()
    }
}

fn key_bits_for(len: usize) -> Result<u32> {
    len.checked_mul(8)
        .and_then(|bits| u32::try_from(bits).ok())
        .ok_or_else(|| Error::Validation(format!("plaintext of {} bytes is too long", len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferLimits, BufferSettings};
    use crate::headers::ip::IPPROTO_UDP;
    use crate::headers::{Ipv4Header, NetworkHeader, UdpHeader};
    use crate::scheduler::SimClock;
    use std::net::Ipv4Addr;

    const SECRET: &[u8] = b"crypto-engine-test-secret";

    struct Link {
        sender: CryptoEngine,
        receiver: CryptoEngine,
        tx: KeyBuffer,
        rx: KeyBuffer,
        metrics: Metrics,
    }

    fn link_with(config: CryptoConfig, current: u64) -> Link {
        let ids = IdSpace::new();
        let metrics = Metrics::new();
        let clock = SimClock::new();
        let limits = BufferLimits {
            min: 1_000,
            threshold: 10_000,
            max: 1_000_000,
            current,
        };
        let buffer = |src, dst| {
            KeyBuffer::new(&ids, clock.clone(), src, dst, limits, BufferSettings::default(), SECRET)
                .unwrap()
        };
        Link {
            sender: CryptoEngine::new(config.clone(), ids.clone(), metrics.clone()).unwrap(),
            receiver: CryptoEngine::new(config, ids.clone(), metrics.clone()).unwrap(),
            tx: buffer(1, 2),
            rx: buffer(2, 1),
            metrics,
        }
    }

    fn link() -> Link {
        link_with(CryptoConfig::default(), 500_000)
    }

    fn udp_packet(payload: Vec<u8>) -> Packet {
        Packet::with_headers(
            vec![
                NetworkHeader::Ipv4(Ipv4Header::new(
                    Ipv4Addr::new(10, 0, 0, 1),
                    Ipv4Addr::new(10, 0, 0, 2),
                    IPPROTO_UDP,
                )),
                NetworkHeader::Udp(UdpHeader::new(4000, 9)),
            ],
            payload,
        )
    }

    #[test]
    fn test_otp_round_trip() {
        let mut link = link();
        let mut packet = udp_packet(vec![0xAB; 100]);
        packet.mark(EncryptionType::Otp, AuthenticationType::Vmac);

        let frames = link
            .sender
            .process_outgoing_packet(&packet, &mut link.tx, 1)
            .unwrap();
        assert_eq!(frames.len(), 1);

        let plaintext_len = 20 + 8 + 100 + 3;
        assert_eq!(frames[0].len(), FrameHeader::SIZE + plaintext_len);
        // OTP key matches plaintext length, plus one VMAC key
        assert_eq!(link.tx.current(), 500_000 - plaintext_len as u64 * 8 - 256);

        let received = link
            .receiver
            .process_incoming_packet(&frames[0], &mut link.rx, 1)
            .unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].same_contents(&packet));
        assert_eq!(link.rx.current(), link.tx.current());
    }

    #[test]
    fn test_aes_with_compression() {
        let config = CryptoConfig {
            compression: true,
            aes_key_bits: 128,
            ..Default::default()
        };
        let mut link = link_with(config, 500_000);
        let mut packet = udp_packet(vec![b'z'; 1000]);
        packet.mark(EncryptionType::Aes, AuthenticationType::Sha1);

        let frames = link
            .sender
            .process_outgoing_packet(&packet, &mut link.tx, 3)
            .unwrap();
        let header = FrameHeader::from_bytes(&frames[0]).unwrap();
        assert!(header.is_zipped());
        assert_eq!(header.encrypted, EncryptionType::Aes as u8);
        assert_eq!(header.authenticated, AuthenticationType::Sha1 as u8);
        assert!(frames[0].len() < 1000);
        assert_eq!(link.tx.current(), 500_000 - 128);

        let received = link
            .receiver
            .process_incoming_packet(&frames[0], &mut link.rx, 3)
            .unwrap();
        assert!(received[0].same_contents(&packet));
    }

    #[test]
    fn test_encrypted_packets_always_authenticated() {
        let mut link = link();
        let mut packet = udp_packet(vec![1; 10]);
        packet.mark(EncryptionType::Aes, AuthenticationType::None);

        let frames = link
            .sender
            .process_outgoing_packet(&packet, &mut link.tx, 0)
            .unwrap();
        let header = FrameHeader::from_bytes(&frames[0]).unwrap();
        assert_eq!(header.authenticated, AuthenticationType::Vmac as u8);
        assert_ne!(header.authentication_key_id, 0);
        assert_eq!(link.sender.required_key_bits(&packet), 256 + 256);
    }

    #[test]
    fn test_key_shortage_yields_no_frame() {
        let mut link = link_with(CryptoConfig::default(), 2_000);
        let mut packet = udp_packet(vec![0; 500]);
        packet.mark(EncryptionType::Otp, AuthenticationType::None);

        let frames = link
            .sender
            .process_outgoing_packet(&packet, &mut link.tx, 0)
            .unwrap();
        assert!(frames.is_empty());
        assert_eq!(link.tx.current(), 2_000);
        assert_eq!(link.metrics.key_shortage_drops(), 1);
    }

    #[test]
    fn test_encryption_key_not_returned_when_vmac_key_missing() {
        // 300 bits: enough for the AES key, not for AES + VMAC
        let mut link = link_with(CryptoConfig::default(), 300);
        let mut packet = udp_packet(vec![0; 8]);
        packet.mark(EncryptionType::Aes, AuthenticationType::Vmac);

        let frames = link
            .sender
            .process_outgoing_packet(&packet, &mut link.tx, 0)
            .unwrap();
        assert!(frames.is_empty());
        assert_eq!(link.tx.current(), 300 - 256);
    }

    #[test]
    fn test_fragmented_stream() {
        let mut link = link();
        let mut first = udp_packet(vec![1; 40]);
        first.mark(EncryptionType::Otp, AuthenticationType::Vmac);
        let mut second = udp_packet(vec![2; 60]);
        second.mark(EncryptionType::None, AuthenticationType::Md5);

        let mut stream = Vec::new();
        for packet in [&first, &second] {
            let frames = link
                .sender
                .process_outgoing_packet(packet, &mut link.tx, 5)
                .unwrap();
            stream.extend_from_slice(&frames[0]);
        }

        // Cut inside the first header, then across the frame boundary
        let cuts = [30, FrameHeader::SIZE + 90, stream.len()];
        let mut start = 0;
        let mut received = Vec::new();
        for cut in cuts {
            let out = link
                .receiver
                .process_incoming_packet(&stream[start..cut], &mut link.rx, 5)
                .unwrap();
            received.extend(out);
            start = cut;
        }

        assert_eq!(received.len(), 2);
        assert!(received[0].same_contents(&first));
        assert!(received[1].same_contents(&second));
        assert_eq!(link.receiver.pending_reassembly_bytes(5), 0);
    }

    #[test]
    fn test_partial_frame_is_cached() {
        let mut link = link();
        let mut packet = udp_packet(vec![3; 30]);
        packet.mark(EncryptionType::None, AuthenticationType::Sha1);
        let frame = link
            .sender
            .process_outgoing_packet(&packet, &mut link.tx, 7)
            .unwrap()
            .remove(0);

        let out = link
            .receiver
            .process_incoming_packet(&frame[..70], &mut link.rx, 7)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(link.receiver.pending_reassembly_bytes(7), 70);

        link.receiver.clear_channel(7);
        assert_eq!(link.receiver.pending_reassembly_bytes(7), 0);
    }

    #[test]
    fn test_tampered_frame_is_dropped() {
        let mut link = link();
        let mut packet = udp_packet(vec![4; 64]);
        packet.mark(EncryptionType::Otp, AuthenticationType::Vmac);
        let frame = link
            .sender
            .process_outgoing_packet(&packet, &mut link.tx, 1)
            .unwrap()
            .remove(0);

        let mut tampered = frame.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;

        let out = link
            .receiver
            .process_incoming_packet(&tampered, &mut link.rx, 1)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(link.metrics.authentication_failures(), 1);
    }

    #[test]
    fn test_stripped_authentication_is_rejected() {
        let mut link = link();
        let mut packet = udp_packet(vec![0; 32]);
        packet.mark(EncryptionType::Otp, AuthenticationType::Vmac);
        let frame = link
            .sender
            .process_outgoing_packet(&packet, &mut link.tx, 1)
            .unwrap()
            .remove(0);

        // Claim the frame is unauthenticated, then flip a ciphertext bit
        let mut tampered = frame.to_vec();
        tampered[9] = AuthenticationType::None as u8;
        let last = tampered.len() - 1;
        tampered[last] ^= 0xFF;
        let before = link.rx.current();

        let out = link
            .receiver
            .process_incoming_packet(&tampered, &mut link.rx, 1)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(link.metrics.authentication_failures(), 1);
        assert_eq!(link.rx.current(), before);
    }

    #[test]
    fn test_bad_frame_does_not_drop_its_neighbours() {
        let mut link = link();
        let mut first = udp_packet(vec![5; 20]);
        first.mark(EncryptionType::None, AuthenticationType::Sha1);
        let mut second = udp_packet(vec![6; 20]);
        second.mark(EncryptionType::None, AuthenticationType::Sha1);
        let mut third = udp_packet(vec![7; 20]);
        third.mark(EncryptionType::Otp, AuthenticationType::Vmac);

        let mut chunk = Vec::new();
        for packet in [&first, &second, &third] {
            let frames = link
                .sender
                .process_outgoing_packet(packet, &mut link.tx, 4)
                .unwrap();
            chunk.extend_from_slice(&frames[0]);
        }
        // Unknown encryption type on the middle frame
        let second_start = FrameHeader::from_bytes(&chunk).unwrap().length as usize;
        chunk[second_start + 8] = 9;

        let out = link
            .receiver
            .process_incoming_packet(&chunk, &mut link.rx, 4)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].same_contents(&first));
        assert!(out[1].same_contents(&third));
        assert_eq!(link.metrics.decode_failures(), 1);
        assert_eq!(link.receiver.pending_reassembly_bytes(4), 0);
    }

    #[test]
    fn test_foreign_chunk_passes_through() {
        let mut link = link();
        let foreign = vec![0u8; 80];
        let out = link
            .receiver
            .process_incoming_packet(&foreign, &mut link.rx, 2)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload().as_ref(), &foreign[..]);
        assert!(out[0].headers().is_empty());
        assert_eq!(link.metrics.foreign_frames(), 1);
    }

    #[test]
    fn test_admission() {
        let link = link_with(CryptoConfig::default(), 5_000);
        let mut packet = udp_packet(vec![0; 10]);
        packet.mark(EncryptionType::Aes, AuthenticationType::Vmac);
        assert_eq!(link.sender.required_key_bits(&packet), 512);
        assert!(link
            .sender
            .check_for_resources_to_process_the_packet(&packet, 1, &link.tx));

        let empty = link_with(CryptoConfig::default(), 600);
        assert_eq!(empty.tx.fetch_state(), KeyBufferStatus::Empty);
        // Only the top band may dig into an empty buffer
        assert!(empty
            .sender
            .check_for_resources_to_process_the_packet(&packet, 0, &empty.tx));
        assert!(!empty
            .sender
            .check_for_resources_to_process_the_packet(&packet, 1, &empty.tx));

        let exact = link_with(CryptoConfig::default(), 512);
        assert!(!exact
            .sender
            .check_for_resources_to_process_the_packet(&packet, 0, &exact.tx));
    }

    #[test]
    fn test_large_channel_id_rejected() {
        let mut link = link();
        let mut packet = udp_packet(vec![0; 4]);
        packet.mark(EncryptionType::None, AuthenticationType::Md5);
        assert!(link
            .sender
            .process_outgoing_packet(&packet, &mut link.tx, 70_000)
            .is_err());
    }
}
