//! Netwarden engine - entry point.
//!
//! This binary arms the full-LAN redirect engine: it seeds the device
//! registry from configuration, resolves the gateway, opens the capture
//! channel and runs the interception loop until Ctrl-C.

use std::borrow::Cow;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use netwarden::Config;
use netwarden::engine::{NetworkIdentity, RedirectEngine, StopHandle};
use netwarden::network::{find_interface, interface_identity, open_capture};
use netwarden::registry::DeviceRegistry;
use netwarden::sniffer::SnifferSession;

/// Seed the registry from the configured device entries.
fn build_registry(config: &Config) -> DeviceRegistry {
    let registry = DeviceRegistry::new();
    for entry in &config.devices {
        registry.register(entry.ip, entry.mac);
        registry.set_blocked(entry.ip, entry.blocked);
        registry.set_redirected(entry.ip, entry.redirected);
        registry.set_caps(entry.ip, entry.upload_cap, entry.download_cap);
    }
    registry
}

/// Start the configured single-target sniffing session, if any.
///
/// The session runs on its own capture handle next to the redirect engine.
/// Surfaced records are consumed here by a logging task; host names stay
/// unresolved since no reverse-lookup collaborator is wired in.
fn start_sniffer(
    config: &Config,
    interface: &pnet::datalink::NetworkInterface,
    identity: NetworkIdentity,
    registry: &DeviceRegistry,
) -> Result<Option<(StopHandle, JoinHandle<()>)>> {
    if !config.sniffer.enabled {
        return Ok(None);
    }

    let target_ip = config
        .sniffer
        .target_ip
        .context("sniffer.target_ip is required")?;
    let target_mac = match config.sniffer.target_mac {
        Some(mac) => mac,
        None => registry
            .get(&target_ip)
            .map(|device| device.mac())
            .context("Sniffer target is not in the device registry")?,
    };
    info!("Sniffing {target_ip} ({target_mac})");

    let (capture, sender) = open_capture(interface, Duration::from_millis(config.read_timeout_ms))
        .context("Failed to open sniffer capture channel")?;

    let (record_tx, mut record_rx) = mpsc::channel(config.channel_capacity);
    let mut session = SnifferSession::new(
        capture,
        sender,
        identity,
        target_ip,
        target_mac,
        config.packet_direction,
        record_tx,
    );
    let handle = session.stop_handle();
    let task = tokio::task::spawn_blocking(move || session.run());

    tokio::spawn(async move {
        while let Some(record) = record_rx.recv().await {
            info!(
                source = %record.summary.source_ip,
                destination = %record.summary.dest_ip,
                host = record.host.as_deref().unwrap_or("not found"),
                kind = ?record.summary.kind,
                "sniffed"
            );
        }
    });

    Ok(Some((handle, task)))
}

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config = Config::load(config_path.as_ref()).context("Failed to load configuration")?;

    // Initialize metrics (must be done early, before any metrics are recorded)
    netwarden::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting netwarden...");

    let interface =
        find_interface(config.interface.as_deref()).context("Failed to find network interface")?;
    info!("Capturing on interface: {}", interface.name);

    let (interface_ip, local_mac) =
        interface_identity(&interface).context("Failed to read interface addresses")?;
    let local_ip = config.local_ip.unwrap_or(interface_ip);
    info!("Local IP: {local_ip}, MAC: {local_mac}");

    let registry = build_registry(&config);
    info!("Registry seeded with {} devices", registry.len());

    let identity = NetworkIdentity::resolve(
        local_ip,
        local_mac,
        config.gateway_ip,
        config.gateway_mac,
        &registry,
    )
    .context("Failed to resolve gateway MAC")?;
    info!("Gateway {} is at {}", identity.gateway_ip, identity.gateway_mac);

    let (capture, sender) = open_capture(
        &interface,
        Duration::from_millis(config.read_timeout_ms),
    )
    .context("Failed to open capture channel")?;

    let mut engine = RedirectEngine::new(
        capture,
        sender,
        registry.clone(),
        identity,
        config.spoof_protection,
    );
    let handle = engine.stop_handle();

    let engine_task = tokio::task::spawn_blocking(move || engine.run());
    let sniffer = start_sniffer(&config, &interface, identity, &registry)?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Ctrl-C received, shutting down...");
    handle.stop();
    if let Some((sniffer_handle, _)) = &sniffer {
        sniffer_handle.stop();
    }

    engine_task.await.context("Engine task failed")?;
    if let Some((_, sniffer_task)) = sniffer {
        sniffer_task.await.context("Sniffer task failed")?;
    }

    for device in registry.snapshot() {
        info!(
            ip = %device.ip,
            sent = device.bytes_sent,
            received = device.bytes_received,
            "session totals"
        );
    }

    info!("Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    run().await
}
