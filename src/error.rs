//! Error types for the netwarden engine.

use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Main error type for netwarden operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Network-related errors.
///
/// Everything here is fatal to session activation; failures inside a running
/// loop are logged and recovered locally instead.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no suitable network interface found")]
    NoInterface,

    #[error("failed to open datalink channel: {0}")]
    ChannelOpen(String),

    #[error("unsupported channel type")]
    UnsupportedChannel,

    #[error("failed to send frame: {0}")]
    SendFailed(String),

    #[error("gateway MAC for {0} is neither cached nor present in the device registry")]
    GatewayUnresolved(Ipv4Addr),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
