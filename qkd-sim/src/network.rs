//! Simulated world: nodes, QKD links, traffic generators and a stream
//! transport that delivers frames in randomly sized segments.

use anyhow::{Context, Result};
use bytes::Bytes;
use qkd_core::{
    buffer::KeyBufferSnapshot,
    config::{FlowDirection, LinkConfig, SimulationConfig, TrafficConfig},
    headers::{ip::IPPROTO_UDP, Ipv4Header, NetworkHeader, UdpHeader},
    manager::NewLink,
    metrics::MetricsSnapshot,
    IdSpace, LinkManager, Metrics, Packet, SimClock, Simulator,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::{debug, error, info, warn};

/// Source port of generated datagrams
const TRAFFIC_SOURCE_PORT: u16 = 49152;

/// Per-run traffic counters kept by the driver
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TrafficStats {
    pub generated: u64,
    pub deferred: u64,
    pub key_shortage: u64,
    pub frames_sent: u64,
    pub segments_sent: u64,
    pub delivered: u64,
    pub delivered_bytes: u64,
    pub errors: u64,
}

/// Output of a finished run
#[derive(Debug, Serialize)]
pub struct Report {
    pub seed: u64,
    pub duration_secs: u64,
    pub events_executed: u64,
    pub traffic: TrafficStats,
    pub buffers: Vec<KeyBufferSnapshot>,
    pub metrics: MetricsSnapshot,
}

/// One endpoint of a flow: node id and its address on the link
#[derive(Debug, Clone, Copy)]
struct Endpoint {
    node: u32,
    address: Ipv4Addr,
}

pub struct Network {
    config: SimulationConfig,
    nodes: BTreeMap<u32, LinkManager>,
    metrics: Metrics,
    rng: StdRng,
    stats: TrafficStats,
}

impl Network {
    /// Build the world and a scheduler with every periodic task registered
    pub fn build(config: SimulationConfig) -> Result<(Self, Simulator<Self>)> {
        let clock = SimClock::new();
        let ids = IdSpace::new();
        let metrics = Metrics::new();
        let settings = config.buffer.settings();

        let mut nodes = BTreeMap::new();
        for (index, link) in config.links.iter().enumerate() {
            let secret = Bytes::from(link.secret_bytes()?);
            let channel = 2 * index as u32;

            let ends = [
                (link.src_node, link.dst_node, link.src_address, link.dst_address),
                (link.dst_node, link.src_node, link.dst_address, link.src_address),
            ];
            for (side, (node, peer, local, remote)) in ends.into_iter().enumerate() {
                let channel_id = channel + side as u32;
                let is_master = side == 0;
                if !nodes.contains_key(&node) {
                    let manager = LinkManager::new(
                        node,
                        ids.clone(),
                        clock.clone(),
                        config.crypto.clone(),
                        settings.clone(),
                        metrics.clone(),
                    )?;
                    nodes.insert(node, manager);
                }
                let manager = nodes
                    .get_mut(&node)
                    .context("node registry lost a manager")?;

                manager
                    .add_new_link(NewLink {
                        src_node: node,
                        dst_node: peer,
                        local_address: local,
                        remote_address: remote,
                        device: index as u32,
                        channel_id,
                        is_master,
                        limits: link.limits(),
                        link_secret: secret.clone(),
                    })
                    .with_context(|| format!("Failed to add link {} on node {}", index, node))?;
            }
        }

        let mut sim = Simulator::with_clock(clock);

        for (index, link) in config.links.iter().enumerate() {
            sim.schedule_repeating(link.charge_interval(), move |net: &mut Network, _| {
                net.charge_link(index)
            })?;
        }

        for &node in nodes.keys() {
            let period = config.buffer.recalculate_period();
            sim.schedule_repeating(period, move |net: &mut Network, _| net.recalculate(node))?;
        }

        for (index, flow) in config.traffic.iter().enumerate() {
            sim.schedule_repeating(flow.interval(), move |net: &mut Network, sim| {
                net.emit_traffic(index, sim)
            })?;
        }

        info!(
            nodes = nodes.len(),
            links = config.links.len(),
            flows = config.traffic.len(),
            "Network built"
        );

        let network = Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            nodes,
            metrics,
            stats: TrafficStats::default(),
        };
        Ok((network, sim))
    }

    pub fn stats(&self) -> TrafficStats {
        self.stats
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn report(&self, sim: &Simulator<Self>) -> Report {
        Report {
            seed: self.config.seed,
            duration_secs: self.config.duration_secs,
            events_executed: sim.executed(),
            traffic: self.stats,
            buffers: self.nodes.values().flat_map(LinkManager::snapshots).collect(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Both endpoints of a link receive the same amount of fresh key
    fn charge_link(&mut self, index: usize) {
        let Some(link) = self.config.links.get(index) else {
            return;
        };
        let bits = link.bits_per_charge();
        let endpoints = [
            (link.src_node, link.src_address),
            (link.dst_node, link.dst_address),
        ];

        for (node, address) in endpoints {
            let Some(manager) = self.nodes.get_mut(&node) else {
                continue;
            };
            match manager.add_new_key_material(address, bits) {
                Ok(true) => debug!(node, link = index, bits, "Key material stored"),
                Ok(false) => debug!(node, link = index, bits, "Key material discarded"),
                Err(e) => error!(node, link = index, "Charging failed: {}", e),
            }
        }
    }

    fn recalculate(&mut self, node: u32) {
        if let Some(manager) = self.nodes.get_mut(&node) {
            for (buffer, value) in manager.calculate_average_key_amounts() {
                debug!(node, buffer, value, "Average key amount");
            }
        }
    }

    fn emit_traffic(&mut self, index: usize, sim: &mut Simulator<Self>) {
        let Some(flow) = self.config.traffic.get(index).cloned() else {
            return;
        };
        let Some(link) = self.config.links.get(flow.link).cloned() else {
            return;
        };
        let (from, to) = endpoints(&link, flow.direction);

        self.stats.generated += 1;
        let packet = self.datagram(&flow, from, to);

        let Some(manager) = self.nodes.get_mut(&from.node) else {
            return;
        };
        match manager.check_for_resources_to_process_the_packet(&packet, from.address, None) {
            Ok(true) => {}
            Ok(false) => {
                self.stats.deferred += 1;
                return;
            }
            Err(e) => {
                self.stats.errors += 1;
                error!(flow = index, "Admission check failed: {}", e);
                return;
            }
        }

        let frames = match manager.process_outgoing_request(from.address, packet) {
            Ok(frames) => frames,
            Err(e) => {
                self.stats.errors += 1;
                error!(flow = index, "Outgoing processing failed: {}", e);
                return;
            }
        };
        if frames.is_empty() {
            self.stats.key_shortage += 1;
            warn!(
                flow = index,
                node = from.node,
                "Packet dropped for lack of key material"
            );
            return;
        }

        for frame in frames {
            self.stats.frames_sent += 1;
            self.transmit(frame.to_bytes(), &link, to, sim);
        }
    }

    fn datagram(&mut self, flow: &TrafficConfig, from: Endpoint, to: Endpoint) -> Packet {
        let mut ip = Ipv4Header::new(from.address, to.address, IPPROTO_UDP);
        ip.tos = flow.tos;

        let mut payload = vec![0u8; flow.payload_bytes];
        self.rng.fill_bytes(&mut payload);

        let mut packet = Packet::with_headers(
            vec![
                NetworkHeader::Ipv4(ip),
                NetworkHeader::Udp(UdpHeader::new(TRAFFIC_SOURCE_PORT, flow.destination_port)),
            ],
            payload,
        );
        packet.mark(flow.encryption, flow.authentication);
        packet
    }

    /// Stream transport: random segmentation, in-order delivery after latency
    fn transmit(
        &mut self,
        frame: Bytes,
        link: &LinkConfig,
        to: Endpoint,
        sim: &mut Simulator<Self>,
    ) {
        let mut rest = frame;
        while !rest.is_empty() {
            let upper = link.max_segment_size.min(rest.len());
            let len = self.rng.gen_range(1..=upper);
            let segment = rest.split_to(len);
            self.stats.segments_sent += 1;

            sim.schedule(link.latency(), move |net: &mut Network, _| {
                net.deliver(to, segment)
            });
        }
    }

    fn deliver(&mut self, to: Endpoint, segment: Bytes) {
        let Some(manager) = self.nodes.get_mut(&to.node) else {
            return;
        };
        match manager.process_incoming_request(to.address, Packet::raw(segment)) {
            Ok(packets) => {
                for packet in packets {
                    self.stats.delivered += 1;
                    self.stats.delivered_bytes += packet.size() as u64;
                    debug!(
                        node = to.node,
                        headers = packet.headers().len(),
                        payload = packet.payload().len(),
                        "Packet delivered"
                    );
                }
            }
            Err(e) => {
                self.stats.errors += 1;
                error!(node = to.node, "Incoming processing failed: {}", e);
            }
        }
    }
}

fn endpoints(link: &LinkConfig, direction: FlowDirection) -> (Endpoint, Endpoint) {
    let src = Endpoint {
        node: link.src_node,
        address: link.src_address,
    };
    let dst = Endpoint {
        node: link.dst_node,
        address: link.dst_address,
    };
    match direction {
        FlowDirection::Forward => (src, dst),
        FlowDirection::Reverse => (dst, src),
    }
}
