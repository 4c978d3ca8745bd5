// SPDX-License-Identifier: MIT
//
// QKD Network Simulator: Key Buffers and Secure Channel Engine
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! QKD Core Library
//!
//! Key management and secure-channel processing for simulated quantum key
//! distribution networks. Every QKD link owns a pair of key buffers that are
//! charged at the link's key rate and drained by encryption and
//! authentication of the packets crossing the link.
//!
//! # Architecture
//!
//! - `key`: key material handed out by buffers
//! - `buffer`: per-link key store with status hysteresis and freshness metrics
//! - `headers`, `packet`, `chain`: network headers and their packing into plaintext
//! - `frame`: secure-channel wire headers
//! - `cipher`: OTP, AES-CTR, tags and compression primitives
//! - `crypto`: the engine turning packets into frames and back
//! - `manager`: per-node link registry and admission control
//! - `scheduler`: deterministic discrete-event clock
//! - `config`, `metrics`, `error`: ambient concerns

pub mod buffer;
pub mod chain;
pub mod cipher;
pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod headers;
pub mod ids;
pub mod key;
pub mod manager;
pub mod metrics;
pub mod packet;
pub mod scheduler;

pub use buffer::{BufferLimits, BufferSettings, KeyBuffer, KeyBufferSnapshot, KeyBufferStatus};
pub use crypto::CryptoEngine;
pub use error::{Error, Result};
pub use ids::IdSpace;
pub use key::KeyMaterial;
pub use manager::{Connection, LinkManager, NewLink};
pub use metrics::Metrics;
pub use packet::{AuthenticationType, EncryptionType, Packet};
pub use scheduler::{SimClock, Simulator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
