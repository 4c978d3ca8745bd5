//! Per-node link manager
//!
//! One [`LinkManager`] runs on every node. It owns a [`Connection`] (and
//! therefore a [`KeyBuffer`]) per QKD link of the node and one
//! [`CryptoEngine`] shared by all of them. Connections are looked up by the
//! node's local address on the link.

use crate::buffer::{BufferLimits, BufferSettings, KeyBuffer, KeyBufferSnapshot, KeyBufferStatus};
use crate::config::CryptoConfig;
use crate::crypto::CryptoEngine;
use crate::metrics::Metrics;
use crate::packet::Packet;
use crate::scheduler::SimClock;
use crate::{Error, IdSpace, Result};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Identifier of the network device a link is attached to
pub type DeviceId = u32;

/// Parameters of a link endpoint being added to a node
#[derive(Debug, Clone)]
pub struct NewLink {
    pub src_node: u32,
    pub dst_node: u32,
    pub local_address: Ipv4Addr,
    pub remote_address: Ipv4Addr,
    pub device: DeviceId,
    pub channel_id: u32,
    pub is_master: bool,
    pub limits: BufferLimits,
    pub link_secret: Bytes,
}

/// One endpoint of a QKD link
pub struct Connection {
    buffer: KeyBuffer,
    channel_id: u32,
    is_master: bool,
    local_address: Ipv4Addr,
    remote_address: Ipv4Addr,
    device: DeviceId,
}

impl Connection {
    pub fn buffer_id(&self) -> u32 {
        self.buffer.id()
    }

    pub fn buffer(&self) -> &KeyBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut KeyBuffer {
        &mut self.buffer
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn local_address(&self) -> Ipv4Addr {
        self.local_address
    }

    pub fn remote_address(&self) -> Ipv4Addr {
        self.remote_address
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }
}

pub struct LinkManager {
    node_id: u32,
    ids: IdSpace,
    clock: SimClock,
    settings: BufferSettings,
    metrics: Metrics,
    engine: CryptoEngine,
    connections: BTreeMap<Ipv4Addr, Connection>,
}

impl LinkManager {
    pub fn new(
        node_id: u32,
        ids: IdSpace,
        clock: SimClock,
        crypto: CryptoConfig,
        settings: BufferSettings,
        metrics: Metrics,
    ) -> Result<Self> {
        let engine = CryptoEngine::new(crypto, ids.clone(), metrics.clone())?;
        Ok(Self {
            node_id,
            ids,
            clock,
            settings,
            metrics,
            engine,
            connections: BTreeMap::new(),
        })
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn engine(&self) -> &CryptoEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Create the connection and its key buffer; returns the buffer id
    pub fn add_new_link(&mut self, link: NewLink) -> Result<u32> {
        if self.connections.contains_key(&link.local_address) {
            return Err(Error::Validation(format!(
                "node {} already has a link on {}",
                self.node_id, link.local_address
            )));
        }
        if self
            .connections
            .values()
            .any(|c| c.channel_id == link.channel_id)
        {
            return Err(Error::Validation(format!(
                "node {} already uses channel {}",
                self.node_id, link.channel_id
            )));
        }

        let buffer = KeyBuffer::new(
            &self.ids,
            self.clock.clone(),
            link.src_node,
            link.dst_node,
            link.limits,
            self.settings.clone(),
            link.link_secret,
        )?;
        let buffer_id = buffer.id();

        info!(
            node = self.node_id,
            buffer = buffer_id,
            local = %link.local_address,
            remote = %link.remote_address,
            channel = link.channel_id,
            master = link.is_master,
            "QKD link added"
        );

        self.connections.insert(
            link.local_address,
            Connection {
                buffer,
                channel_id: link.channel_id,
                is_master: link.is_master,
                local_address: link.local_address,
                remote_address: link.remote_address,
                device: link.device,
            },
        );
        Ok(buffer_id)
    }

    /// Remove a link and forget its reassembly state
    pub fn teardown_link(&mut self, local: Ipv4Addr) -> Result<Connection> {
        let connection = self
            .connections
            .remove(&local)
            .ok_or_else(|| not_found(local))?;
        self.engine.clear_channel(connection.channel_id);
        info!(
            node = self.node_id,
            buffer = connection.buffer_id(),
            local = %local,
            "QKD link torn down"
        );
        Ok(connection)
    }

    /// Protect a packet leaving on the link at `local`
    ///
    /// Packets not marked for encryption or authentication are returned as
    /// they are. Marked packets become zero or one raw frame packet.
    pub fn process_outgoing_request(
        &mut self,
        local: Ipv4Addr,
        packet: Packet,
    ) -> Result<Vec<Packet>> {
        if !packet.tags().needs_processing() {
            return Ok(vec![packet]);
        }

        let connection = self
            .connections
            .get_mut(&local)
            .ok_or_else(|| not_found(local))?;
        let frames = self.engine.process_outgoing_packet(
            &packet,
            &mut connection.buffer,
            connection.channel_id,
        )?;

        let tos = packet.tags().tos;
        Ok(frames
            .into_iter()
            .map(|frame| {
                let mut out = Packet::raw(frame);
                if let Some(tos) = tos {
                    out.set_tos(tos);
                }
                out
            })
            .collect())
    }

    /// Unwrap frames arriving on the link at `local`
    ///
    /// Packets already tagged as processed are returned unchanged, so a packet
    /// never goes through the engine twice.
    pub fn process_incoming_request(
        &mut self,
        local: Ipv4Addr,
        packet: Packet,
    ) -> Result<Vec<Packet>> {
        if packet.tags().processed {
            debug!(node = self.node_id, "Packet already processed, passing through");
            return Ok(vec![packet]);
        }

        let connection = self
            .connections
            .get_mut(&local)
            .ok_or_else(|| not_found(local))?;
        let chunk = packet.to_bytes();
        let mut packets = self.engine.process_incoming_packet(
            &chunk,
            &mut connection.buffer,
            connection.channel_id,
        )?;

        for packet in &mut packets {
            packet.tags_mut().processed = true;
        }
        Ok(packets)
    }

    /// Deliver freshly distilled key bits to the buffer at `local`
    pub fn add_new_key_material(&mut self, local: Ipv4Addr, bits: u32) -> Result<bool> {
        let connection = self
            .connections
            .get_mut(&local)
            .ok_or_else(|| not_found(local))?;
        let stored = connection.buffer.add_new_content(bits);
        if stored {
            self.metrics.record_key_charged(bits);
        } else {
            self.metrics.record_key_discarded(bits);
        }
        Ok(stored)
    }

    /// Status of the buffer behind the given device, for queueing decisions
    pub fn fetch_status_for_destination_buffer(&self, device: DeviceId) -> Option<KeyBufferStatus> {
        self.connections
            .values()
            .find(|c| c.device == device)
            .map(|c| c.buffer.fetch_state())
    }

    /// Admission control before a packet is queued on the link at `local`
    ///
    /// Without an explicit band the packet's TOS decides it.
    pub fn check_for_resources_to_process_the_packet(
        &self,
        packet: &Packet,
        local: Ipv4Addr,
        band: Option<u8>,
    ) -> Result<bool> {
        let connection = self.connections.get(&local).ok_or_else(|| not_found(local))?;
        if !packet.tags().needs_processing() {
            return Ok(true);
        }

        let band = band.unwrap_or_else(|| packet.priority_band());
        Ok(self
            .engine
            .check_for_resources_to_process_the_packet(packet, band, &connection.buffer))
    }

    /// Periodic recalculation over every buffer of the node
    pub fn calculate_average_key_amounts(&mut self) -> Vec<(u32, i64)> {
        self.connections
            .values_mut()
            .map(|c| {
                let value = c.buffer.calculate_average_amount_of_key_in_the_buffer();
                (c.buffer.id(), value)
            })
            .collect()
    }

    pub fn connection(&self, local: Ipv4Addr) -> Option<&Connection> {
        self.connections.get(&local)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Buffer registry lookup by buffer id
    pub fn buffer(&self, buffer_id: u32) -> Option<&KeyBuffer> {
        self.connections
            .values()
            .map(|c| &c.buffer)
            .find(|b| b.id() == buffer_id)
    }

    pub fn buffer_mut(&mut self, buffer_id: u32) -> Option<&mut KeyBuffer> {
        self.connections
            .values_mut()
            .map(|c| &mut c.buffer)
            .find(|b| b.id() == buffer_id)
    }

    pub fn snapshots(&self) -> Vec<KeyBufferSnapshot> {
        self.connections.values().map(|c| c.buffer.snapshot()).collect()
    }
}

fn not_found(local: Ipv4Addr) -> Error {
    Error::NotFound(format!("no QKD link on {}", local))
}
