// SPDX-License-Identifier: MIT
//
// QKD Network Simulator: Key Buffers and Secure Channel Engine
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Metrics collection and reporting

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Secure-channel and key-consumption counters
///
/// Clones share the same counters, so one handle can be given to every
/// engine and link manager of a simulation.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    // Outbound frames
    frames_sent: AtomicU64,
    frame_bytes_sent: AtomicU64,

    // Inbound frames
    frames_received: AtomicU64,
    frame_bytes_received: AtomicU64,

    // Key consumption
    encryption_key_bits: AtomicU64,
    authentication_key_bits: AtomicU64,
    key_bits_charged: AtomicU64,
    key_bits_discarded: AtomicU64,

    // Dropped or deferred traffic
    key_shortage_drops: AtomicU64,
    authentication_failures: AtomicU64,
    decode_failures: AtomicU64,
    foreign_frames: AtomicU64,
    reassembly_stalls: AtomicU64,
    admission_rejections: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_sent: u64,
    pub frame_bytes_sent: u64,
    pub frames_received: u64,
    pub frame_bytes_received: u64,
    pub encryption_key_bits: u64,
    pub authentication_key_bits: u64,
    pub key_bits_charged: u64,
    pub key_bits_discarded: u64,
    pub key_shortage_drops: u64,
    pub authentication_failures: u64,
    pub decode_failures: u64,
    pub foreign_frames: u64,
    pub reassembly_stalls: u64,
    pub admission_rejections: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    // Frame metrics
    pub fn record_frame_sent(&self, bytes: usize) {
        self.inner.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.inner
            .frame_bytes_sent
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_frame_received(&self, bytes: usize) {
        self.inner.frames_received.fetch_add(1, Ordering::Relaxed);
        self.inner
            .frame_bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn frames_sent(&self) -> u64 {
        Self::load(&self.inner.frames_sent)
    }

    pub fn frames_received(&self) -> u64 {
        Self::load(&self.inner.frames_received)
    }

    // Key metrics
    pub fn record_encryption_key(&self, bits: u32) {
        self.inner
            .encryption_key_bits
            .fetch_add(u64::from(bits), Ordering::Relaxed);
    }

    pub fn record_authentication_key(&self, bits: u32) {
        self.inner
            .authentication_key_bits
            .fetch_add(u64::from(bits), Ordering::Relaxed);
    }

    pub fn record_key_charged(&self, bits: u32) {
        self.inner
            .key_bits_charged
            .fetch_add(u64::from(bits), Ordering::Relaxed);
    }

    pub fn record_key_discarded(&self, bits: u32) {
        self.inner
            .key_bits_discarded
            .fetch_add(u64::from(bits), Ordering::Relaxed);
    }

    pub fn encryption_key_bits(&self) -> u64 {
        Self::load(&self.inner.encryption_key_bits)
    }

    pub fn authentication_key_bits(&self) -> u64 {
        Self::load(&self.inner.authentication_key_bits)
    }

    // Drops
    pub fn record_key_shortage(&self) {
        self.inner.key_shortage_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_authentication_failure(&self) {
        self.inner
            .authentication_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.inner.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_foreign_frame(&self) {
        self.inner.foreign_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reassembly_stall(&self) {
        self.inner.reassembly_stalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission_rejection(&self) {
        self.inner
            .admission_rejections
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn key_shortage_drops(&self) -> u64 {
        Self::load(&self.inner.key_shortage_drops)
    }

    pub fn authentication_failures(&self) -> u64 {
        Self::load(&self.inner.authentication_failures)
    }

    pub fn decode_failures(&self) -> u64 {
        Self::load(&self.inner.decode_failures)
    }

    pub fn foreign_frames(&self) -> u64 {
        Self::load(&self.inner.foreign_frames)
    }

    pub fn reassembly_stalls(&self) -> u64 {
        Self::load(&self.inner.reassembly_stalls)
    }

    pub fn admission_rejections(&self) -> u64 {
        Self::load(&self.inner.admission_rejections)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let i = &self.inner;
        MetricsSnapshot {
            frames_sent: Self::load(&i.frames_sent),
            frame_bytes_sent: Self::load(&i.frame_bytes_sent),
            frames_received: Self::load(&i.frames_received),
            frame_bytes_received: Self::load(&i.frame_bytes_received),
            encryption_key_bits: Self::load(&i.encryption_key_bits),
            authentication_key_bits: Self::load(&i.authentication_key_bits),
            key_bits_charged: Self::load(&i.key_bits_charged),
            key_bits_discarded: Self::load(&i.key_bits_discarded),
            key_shortage_drops: Self::load(&i.key_shortage_drops),
            authentication_failures: Self::load(&i.authentication_failures),
            decode_failures: Self::load(&i.decode_failures),
            foreign_frames: Self::load(&i.foreign_frames),
            reassembly_stalls: Self::load(&i.reassembly_stalls),
            admission_rejections: Self::load(&i.admission_rejections),
        }
    }

    /// Generate Prometheus-compatible metrics output
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        let counters: [(&str, &str, u64); 14] = [
            ("qkd_frames_sent_total", "Frames handed to the transport", s.frames_sent),
            ("qkd_frame_bytes_sent_total", "Bytes of frames sent", s.frame_bytes_sent),
            ("qkd_frames_received_total", "Complete frames received", s.frames_received),
            ("qkd_frame_bytes_received_total", "Bytes of frames received", s.frame_bytes_received),
            (
                "qkd_encryption_key_bits_total",
                "Key bits consumed for encryption",
                s.encryption_key_bits,
            ),
            (
                "qkd_authentication_key_bits_total",
                "Key bits consumed for authentication",
                s.authentication_key_bits,
            ),
            ("qkd_key_bits_charged_total", "Key bits stored in buffers", s.key_bits_charged),
            (
                "qkd_key_bits_discarded_total",
                "Key bits discarded by full buffers",
                s.key_bits_discarded,
            ),
            (
                "qkd_key_shortage_drops_total",
                "Packets dropped for lack of key material",
                s.key_shortage_drops,
            ),
            (
                "qkd_authentication_failures_total",
                "Frames failing authentication",
                s.authentication_failures,
            ),
            (
                "qkd_decode_failures_total",
                "Frames dropped because they failed to decode",
                s.decode_failures,
            ),
            (
                "qkd_foreign_frames_total",
                "Frames passed through without processing",
                s.foreign_frames,
            ),
            (
                "qkd_reassembly_stalls_total",
                "Chunks leaving an incomplete frame cached",
                s.reassembly_stalls,
            ),
            (
                "qkd_admission_rejections_total",
                "Packets refused by admission control",
                s.admission_rejections,
            ),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let metrics = Metrics::new();

        metrics.record_frame_sent(100);
        metrics.record_frame_sent(60);
        metrics.record_encryption_key(800);
        metrics.record_authentication_key(256);
        metrics.record_key_shortage();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_sent, 2);
        assert_eq!(snapshot.frame_bytes_sent, 160);
        assert_eq!(snapshot.encryption_key_bits, 800);
        assert_eq!(snapshot.authentication_key_bits, 256);
        assert_eq!(snapshot.key_shortage_drops, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let handle = metrics.clone();
        handle.record_foreign_frame();
        assert_eq!(metrics.foreign_frames(), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_authentication_failure();
        let text = metrics.prometheus_format();
        assert!(text.contains("# TYPE qkd_authentication_failures_total counter"));
        assert!(text.contains("qkd_authentication_failures_total 1\n"));
        assert!(text.contains("qkd_frames_sent_total 0\n"));
    }
}
