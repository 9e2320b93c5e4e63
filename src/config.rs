//! Configuration loading and validation.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use pnet::util::MacAddr;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Main configuration for the netwarden engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Network interface to capture on. If None, auto-detect.
    pub interface: Option<String>,

    /// Gateway (router) IPv4 address.
    pub gateway_ip: Ipv4Addr,

    /// Cached gateway MAC address.
    /// If None, it is resolved from the device registry on activation.
    #[serde(default, deserialize_with = "deserialize_opt_mac")]
    pub gateway_mac: Option<MacAddr>,

    /// Local IP to assert in protection frames. If None, the interface
    /// address is used.
    pub local_ip: Option<Ipv4Addr>,

    /// Counter a third party spoofing our own address by re-asserting the
    /// true mapping on every scheduler pass.
    #[serde(default)]
    pub spoof_protection: bool,

    /// Which sniffed traffic directions are surfaced as records.
    #[serde(default)]
    pub packet_direction: PacketDirection,

    /// Capture read timeout in milliseconds. Bounds how long a loop
    /// iteration may block before re-checking its stop flag.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Capacity of the sniffer record channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Devices to seed the registry with.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,

    /// Single-target sniffing session, run alongside the redirect loop.
    #[serde(default)]
    pub sniffer: SnifferConfig,

    /// Prometheus metrics exporter.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Single-target sniffing session settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnifferConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Host to sniff. Required when the session is enabled.
    pub target_ip: Option<Ipv4Addr>,

    /// Target MAC. If None, it is resolved from the device registry.
    #[serde(default, deserialize_with = "deserialize_opt_mac")]
    pub target_mac: Option<MacAddr>,
}

/// One registry entry imported from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    pub ip: Ipv4Addr,

    #[serde(deserialize_with = "deserialize_mac")]
    pub mac: MacAddr,

    /// Keep the device under continuous ARP-spoof pressure.
    #[serde(default)]
    pub blocked: bool,

    /// Forward the device's traffic through this engine.
    #[serde(default)]
    pub redirected: bool,

    /// Upload byte ceiling per reset window. Zero means unlimited.
    #[serde(default)]
    pub upload_cap: u64,

    /// Download byte ceiling per reset window. Zero means unlimited.
    #[serde(default)]
    pub download_cap: u64,
}

/// Which direction of a sniffed target's traffic is surfaced.
///
/// Outbound (target-sourced) frames are always surfaced; gateway-sourced
/// frames only when the preference is `Inbound`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketDirection {
    #[default]
    Outbound,
    Inbound,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Address the `/metrics` endpoint listens on.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

const fn default_read_timeout_ms() -> u64 {
    1000
}

const fn default_channel_capacity() -> usize {
    1000
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9394))
}

fn deserialize_mac<'de, D>(deserializer: D) -> std::result::Result<MacAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    MacAddr::from_str(&s).map_err(serde::de::Error::custom)
}

fn deserialize_opt_mac<'de, D>(deserializer: D) -> std::result::Result<Option<MacAddr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| MacAddr::from_str(&s).map_err(serde::de::Error::custom))
        .transpose()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Validation("read_timeout_ms must be > 0".into()).into());
        }

        if self.channel_capacity == 0 {
            return Err(ConfigError::Validation("channel_capacity must be > 0".into()).into());
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &self.devices {
            if !seen.insert(entry.ip) {
                return Err(
                    ConfigError::Validation(format!("duplicate device entry: {}", entry.ip)).into(),
                );
            }
        }

        if self.sniffer.enabled && self.sniffer.target_ip.is_none() {
            return Err(
                ConfigError::Validation("sniffer.target_ip is required when enabled".into()).into(),
            );
        }

        Ok(())
    }
}
