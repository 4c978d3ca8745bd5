//! Configuration management for QKD simulations

use crate::buffer::{BufferLimits, BufferSettings};
use crate::packet::{AuthenticationType, EncryptionType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// Secure-channel engine configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CryptoConfig {
    /// gzip plaintexts before encryption
    #[serde(default)]
    pub compression: bool,

    /// Tag applied to encrypted packets that request no authentication
    #[serde(default = "default_authentication")]
    pub default_authentication: AuthenticationType,

    /// AES key size: 128 or 256
    #[serde(default = "default_aes_key_bits")]
    pub aes_key_bits: u32,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            compression: false,
            default_authentication: default_authentication(),
            aes_key_bits: default_aes_key_bits(),
        }
    }
}

impl CryptoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.aes_key_bits != 128 && self.aes_key_bits != 256 {
            return Err(Error::Config(format!(
                "aes_key_bits must be 128 or 256, got {}",
                self.aes_key_bits
            )));
        }
        if self.default_authentication == AuthenticationType::None {
            return Err(Error::Config(
                "default_authentication cannot be 'none': encrypted frames are always authenticated"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Key buffer tuning shared by every link
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BufferConfig {
    /// Samples considered when detecting a rising charge curve
    #[serde(default = "default_curve_window")]
    pub curve_window: usize,

    /// Charging periods kept for the moving average
    #[serde(default = "default_max_recorded_charging_periods")]
    pub max_recorded_charging_periods: usize,

    /// Interval of the average-key-amount recalculation
    #[serde(default = "default_recalculate_period_secs")]
    pub recalculate_period_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            curve_window: default_curve_window(),
            max_recorded_charging_periods: default_max_recorded_charging_periods(),
            recalculate_period_secs: default_recalculate_period_secs(),
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.curve_window == 0 {
            return Err(Error::Config("curve_window must be > 0".to_string()));
        }
        if self.max_recorded_charging_periods == 0 {
            return Err(Error::Config(
                "max_recorded_charging_periods must be > 0".to_string(),
            ));
        }
        if self.recalculate_period_secs == 0 {
            return Err(Error::Config(
                "recalculate_period_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn settings(&self) -> BufferSettings {
        BufferSettings {
            curve_window: self.curve_window,
            max_recorded_charging_periods: self.max_recorded_charging_periods,
            recalculate_period: self.recalculate_period(),
        }
    }

    pub fn recalculate_period(&self) -> Duration {
        Duration::from_secs(self.recalculate_period_secs)
    }
}

/// Point-to-point QKD link between two nodes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LinkConfig {
    pub src_node: u32,
    pub dst_node: u32,
    pub src_address: Ipv4Addr,
    pub dst_address: Ipv4Addr,

    #[serde(default = "default_min_bits")]
    pub min_bits: u64,

    #[serde(default = "default_threshold_bits")]
    pub threshold_bits: u64,

    #[serde(default = "default_max_bits")]
    pub max_bits: u64,

    #[serde(default = "default_initial_bits")]
    pub initial_bits: u64,

    /// Key generation rate of the QKD devices
    #[serde(default = "default_key_rate_bps")]
    pub key_rate_bps: u64,

    #[serde(default = "default_charge_interval_ms")]
    pub charge_interval_ms: u64,

    /// One-way transport latency
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Largest transport segment; frames are split at random points below it
    #[serde(default = "default_max_segment_size")]
    pub max_segment_size: usize,

    /// Shared link secret (hex-encoded)
    pub secret: String,
}

impl LinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.src_node == self.dst_node {
            return Err(Error::Config(format!(
                "link endpoints must differ (node {})",
                self.src_node
            )));
        }
        if self.src_address == self.dst_address {
            return Err(Error::Config(format!(
                "link addresses must differ ({})",
                self.src_address
            )));
        }
        self.limits().validate().map_err(|e| {
            Error::Config(format!("link {}-{}: {}", self.src_node, self.dst_node, e))
        })?;
        if self.charge_interval_ms == 0 {
            return Err(Error::Config("charge_interval_ms must be > 0".to_string()));
        }
        if self.max_segment_size == 0 {
            return Err(Error::Config("max_segment_size must be > 0".to_string()));
        }
        if self.secret_bytes()?.is_empty() {
            return Err(Error::Config("link secret cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn limits(&self) -> BufferLimits {
        BufferLimits {
            min: self.min_bits,
            threshold: self.threshold_bits,
            max: self.max_bits,
            current: self.initial_bits,
        }
    }

    pub fn secret_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.secret)
            .map_err(|e| Error::Config(format!("Invalid link secret: {}", e)))
    }

    /// Key bits produced per charge interval
    pub fn bits_per_charge(&self) -> u32 {
        let bits = self.key_rate_bps.saturating_mul(self.charge_interval_ms) / 1000;
        u32::try_from(bits).unwrap_or(u32::MAX)
    }

    pub fn charge_interval(&self) -> Duration {
        Duration::from_millis(self.charge_interval_ms)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Direction of a traffic flow over its link
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    /// src -> dst
    #[default]
    Forward,
    /// dst -> src
    Reverse,
}

/// Periodic application traffic
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TrafficConfig {
    /// Index into `links`
    pub link: usize,

    #[serde(default)]
    pub direction: FlowDirection,

    #[serde(default = "default_payload_bytes")]
    pub payload_bytes: usize,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub encryption: EncryptionType,

    #[serde(default)]
    pub authentication: AuthenticationType,

    #[serde(default)]
    pub tos: u8,

    #[serde(default = "default_destination_port")]
    pub destination_port: u16,
}

impl TrafficConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Complete simulation scenario
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SimulationConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    #[serde(default)]
    pub crypto: CryptoConfig,

    #[serde(default)]
    pub buffer: BufferConfig,

    pub links: Vec<LinkConfig>,

    #[serde(default)]
    pub traffic: Vec<TrafficConfig>,
}

impl SimulationConfig {
    /// Load a YAML scenario file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML scenario held in memory
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid scenario: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.duration_secs == 0 {
            return Err(Error::Config("duration_secs must be > 0".to_string()));
        }
        self.crypto.validate()?;
        self.buffer.validate()?;

        if self.links.is_empty() {
            return Err(Error::Config("at least one link is required".to_string()));
        }

        let mut addresses = HashSet::new();
        for link in &self.links {
            link.validate()?;
            for addr in [link.src_address, link.dst_address] {
                if !addresses.insert(addr) {
                    return Err(Error::Config(format!(
                        "address {} is used by more than one link endpoint",
                        addr
                    )));
                }
            }
        }

        for flow in &self.traffic {
            if flow.link >= self.links.len() {
                return Err(Error::Config(format!(
                    "traffic refers to link {} but only {} are configured",
                    flow.link,
                    self.links.len()
                )));
            }
            if flow.interval_ms == 0 {
                return Err(Error::Config("traffic interval_ms must be > 0".to_string()));
            }
            if flow.payload_bytes == 0 {
                return Err(Error::Config("traffic payload_bytes must be > 0".to_string()));
            }
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Overrides read from `QKD_*` environment variables
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RuntimeOverrides {
    pub seed: Option<u64>,
    pub duration_secs: Option<u64>,
    pub compression: Option<bool>,
}

impl RuntimeOverrides {
    /// Load overrides from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(envy::prefixed("QKD_").from_env()?)
    }

    pub fn apply(&self, config: &mut SimulationConfig) {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(duration) = self.duration_secs {
            config.duration_secs = duration;
        }
        if let Some(compression) = self.compression {
            config.crypto.compression = compression;
        }
    }
}

// Default value functions
fn default_authentication() -> AuthenticationType {
    AuthenticationType::Vmac
}

fn default_aes_key_bits() -> u32 {
    256
}

fn default_curve_window() -> usize {
    5
}

fn default_max_recorded_charging_periods() -> usize {
    5
}

fn default_recalculate_period_secs() -> u64 {
    5
}

fn default_min_bits() -> u64 {
    10_000
}

fn default_threshold_bits() -> u64 {
    200_000
}

fn default_max_bits() -> u64 {
    1_000_000
}

fn default_initial_bits() -> u64 {
    500_000
}

fn default_key_rate_bps() -> u64 {
    100_000
}

fn default_charge_interval_ms() -> u64 {
    1000
}

fn default_latency_ms() -> u64 {
    5
}

fn default_max_segment_size() -> usize {
    1400
}

fn default_payload_bytes() -> usize {
    512
}

fn default_interval_ms() -> u64 {
    100
}

fn default_destination_port() -> u16 {
    9
}

fn default_seed() -> u64 {
    42
}

fn default_duration_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
seed: 7
duration_secs: 10
crypto:
  compression: true
  aes_key_bits: 128
links:
  - src_node: 0
    dst_node: 1
    src_address: 10.0.0.1
    dst_address: 10.0.0.2
    secret: "00112233445566778899aabbccddeeff"
traffic:
  - link: 0
    encryption: otp
    authentication: vmac
    tos: 16
"#;

    #[test]
    fn test_scenario_defaults() {
        let config = SimulationConfig::from_yaml_str(SCENARIO).unwrap();
        assert_eq!(config.seed, 7);
        assert!(config.crypto.compression);
        assert_eq!(config.crypto.aes_key_bits, 128);
        assert_eq!(config.crypto.default_authentication, AuthenticationType::Vmac);
        assert_eq!(config.buffer, BufferConfig::default());

        let link = &config.links[0];
        assert_eq!(link.max_bits, 1_000_000);
        assert_eq!(link.bits_per_charge(), 100_000);
        assert_eq!(link.secret_bytes().unwrap().len(), 16);

        let flow = &config.traffic[0];
        assert_eq!(flow.encryption, EncryptionType::Otp);
        assert_eq!(flow.direction, FlowDirection::Forward);
        assert_eq!(flow.payload_bytes, 512);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = SimulationConfig::from_yaml_str(SCENARIO).unwrap();
        config.crypto.aes_key_bits = 192;
        assert!(config.validate().unwrap_err().is_config_error());

        let mut config = SimulationConfig::from_yaml_str(SCENARIO).unwrap();
        config.traffic[0].link = 3;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::from_yaml_str(SCENARIO).unwrap();
        config.links[0].threshold_bits = config.links[0].max_bits + 1;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::from_yaml_str(SCENARIO).unwrap();
        config.links[0].secret = "not-hex".to_string();
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::from_yaml_str(SCENARIO).unwrap();
        config.crypto.default_authentication = AuthenticationType::None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_addresses_rejected() {
        let mut config = SimulationConfig::from_yaml_str(SCENARIO).unwrap();
        let mut second = config.links[0].clone();
        second.src_node = 2;
        second.dst_node = 3;
        config.links.push(second);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_settings() {
        let settings = BufferConfig::default().settings();
        assert_eq!(settings.curve_window, 5);
        assert_eq!(settings.recalculate_period, Duration::from_secs(5));
    }

    #[test]
    fn test_runtime_overrides() {
        let overrides: RuntimeOverrides = envy::prefixed("QKD_")
            .from_iter(vec![
                ("QKD_SEED".to_string(), "99".to_string()),
                ("QKD_COMPRESSION".to_string(), "false".to_string()),
            ])
            .unwrap();

        let mut config = SimulationConfig::from_yaml_str(SCENARIO).unwrap();
        overrides.apply(&mut config);
        assert_eq!(config.seed, 99);
        assert_eq!(config.duration_secs, 10);
        assert!(!config.crypto.compression);
    }
}
