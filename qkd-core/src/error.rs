// SPDX-License-Identifier: MIT
//
// QKD Network Simulator: Key Buffers and Secure Channel Engine
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Error types for the QKD simulator
//!
//! Provides a unified error taxonomy using `thiserror` for ergonomic error handling.
//!
//! Running out of key material, waiting for more bytes of a fragmented frame,
//! failing authentication or receiving a foreign frame are *not* errors: those
//! are normal outcomes of the protocol and surface as empty results.

pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for QKD operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Decrypted plaintext does not match the protocol chain it claims to carry
    #[error("Decode error: {0}")]
    Decode(String),

    /// Buffer operation failed
    #[error("Buffer error: {0}")]
    Buffer(String),

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if error is a protocol-chain decode failure
    ///
    /// These indicate data corruption or a reassembly bug and are never
    /// produced by ordinary key shortage.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Error::Decode(_))
    }

    /// Check if error originates from configuration
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }
}

// Conversions for common error types
impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<envy::Error> for Error {
    fn from(e: envy::Error) -> Self {
        Error::Config(format!("Failed to parse environment variables: {}", e))
    }
}
