//! Netwarden - a LAN interception and bandwidth-control engine.
//!
//! Netwarden positions itself between a gateway and selected LAN hosts by
//! ARP cache poisoning, then selectively relays, rate-limits or denies their
//! traffic at the link layer. It can also counter a third party spoofing the
//! operator's own host by re-asserting the true address mapping.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`registry`]: Shared device table with flags and byte budgets
//! - [`network`]: Capture channels, ARP construction, frame classification
//! - [`engine`]: Full-LAN redirect loop and the spoof/protect scheduler
//! - [`sniffer`]: Single-target sniffing session
//! - [`metrics`]: Prometheus exporter setup
//! - [`error`]: Error types
//!
//! # Testing
//!
//! The capture layer is trait-based ([`network::PacketCapture`] and
//! [`network::PacketSender`]), so every loop can be driven end-to-end
//! without a network interface:
//!
//! ```rust
//! use netwarden::registry::DeviceRegistry;
//! use pnet::util::MacAddr;
//!
//! let registry = DeviceRegistry::new();
//! let ip = "10.0.0.5".parse().unwrap();
//! registry.register(ip, MacAddr::new(0xaa, 0, 0, 0, 0, 1));
//! assert!(registry.set_redirected(ip, true));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod network;
pub mod registry;
pub mod sniffer;

pub use config::Config;
pub use error::{Error, Result};
