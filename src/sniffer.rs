//! Single-target sniffing session.
//!
//! Inspects one host's web traffic while keeping its connectivity alive.
//! A session opens its own capture handle, so it can run next to a full-LAN
//! redirect session. Classified records flow outward over a bounded channel;
//! reverse host-name resolution is the consumer's business, so records leave
//! here with `host` unset.

use std::net::Ipv4Addr;
use std::time::SystemTime;

use pnet::packet::ethernet::EthernetPacket;
use pnet::util::MacAddr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::PacketDirection;
use crate::engine::{NetworkIdentity, StopHandle};
use crate::network::capture::{CaptureFilter, PacketCapture, PacketSender};
use crate::network::classify::{FrameSummary, TrafficKind, classify};
use crate::network::forward;

/// How the session treats the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SniffMode {
    /// A remote host kept reachable through MAC-rewrite relaying.
    Remote,
    /// The operator's own host; its traffic needs no relay.
    LocalDevice,
}

/// One classified frame, ready for display or export.
#[derive(Debug, Clone)]
pub struct CapturedRecord {
    pub timestamp: SystemTime,
    pub summary: FrameSummary,
    /// Reverse-resolved host name, filled in by an external collaborator.
    pub host: Option<String>,
}

/// Sniffs one target's HTTP/HTTPS traffic, relaying the target's frames in
/// both directions while the session is active.
pub struct SnifferSession<C, S> {
    capture: C,
    sender: S,
    filter: CaptureFilter,
    mode: SniffMode,
    target_ip: Ipv4Addr,
    target_mac: MacAddr,
    identity: NetworkIdentity,
    direction: PacketDirection,
    records: mpsc::Sender<CapturedRecord>,
    handle: StopHandle,
}

impl<C, S> SnifferSession<C, S>
where
    C: PacketCapture,
    S: PacketSender,
{
    /// Arm a session over an opened capture handle.
    ///
    /// When the target is the engine's own host the session switches to
    /// local-device mode: the capture filter narrows to web segments with a
    /// non-empty payload and no relaying is performed.
    pub fn new(
        capture: C,
        sender: S,
        identity: NetworkIdentity,
        target_ip: Ipv4Addr,
        target_mac: MacAddr,
        direction: PacketDirection,
        records: mpsc::Sender<CapturedRecord>,
    ) -> Self {
        let mode = if target_ip == identity.local_ip {
            SniffMode::LocalDevice
        } else {
            SniffMode::Remote
        };

        let filter = match mode {
            SniffMode::Remote => CaptureFilter::Target {
                target_mac,
                gateway_mac: identity.gateway_mac,
                target_ip,
            },
            SniffMode::LocalDevice => CaptureFilter::HttpOfTarget {
                target_mac,
                gateway_mac: identity.gateway_mac,
                target_ip,
            },
        };

        Self {
            capture,
            sender,
            filter,
            mode,
            target_ip,
            target_mac,
            identity,
            direction,
            records,
            handle: StopHandle::default(),
        }
    }

    /// Handle used to stop the loop from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    /// Run until stopped or until the record consumer goes away. Blocking;
    /// callers put this on a dedicated blocking task.
    pub fn run(&mut self) {
        self.handle.start();
        info!(ip = %self.target_ip, mode = ?self.mode, "sniffer session running");

        while self.handle.is_running() {
            self.poll_once();
        }

        info!(ip = %self.target_ip, "sniffer session stopped");
    }

    /// One loop iteration: a bounded-wait read and, if the filter passes,
    /// relay plus record emission.
    pub fn poll_once(&mut self) {
        if let Some(frame) = self.capture.next_frame()
            && self.filter.accepts(&frame)
        {
            self.handle_frame(&frame);
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let Some(ethernet) = EthernetPacket::new(frame) else {
            return;
        };
        let source = ethernet.get_source();

        if source == self.target_mac {
            // Target-to-gateway: relay unconditionally, no byte budget in a
            // sniffing session.
            if self.mode == SniffMode::Remote
                && let Err(err) = forward::retransmit(
                    frame,
                    self.identity.local_mac,
                    self.identity.gateway_mac,
                    &mut self.sender,
                )
            {
                warn!("failed to relay target frame: {err}");
            }

            self.emit(frame);
        } else if source == self.identity.gateway_mac {
            if self.mode == SniffMode::Remote
                && forward::destination_ip(frame) == Some(self.target_ip)
                && let Err(err) = forward::retransmit(
                    frame,
                    self.identity.local_mac,
                    self.target_mac,
                    &mut self.sender,
                )
            {
                warn!("failed to relay gateway frame: {err}");
            }

            // Inbound records are opt-in; the relay above is not.
            if self.direction == PacketDirection::Inbound {
                self.emit(frame);
            }
        }
    }

    /// Surface a frame as a record if it is web traffic of interest.
    fn emit(&mut self, frame: &[u8]) {
        let Some(summary) = classify(frame) else {
            return;
        };

        if !matches!(summary.kind, TrafficKind::Http | TrafficKind::Https) {
            return;
        }

        let record = CapturedRecord {
            timestamp: SystemTime::now(),
            summary,
            host: None,
        };

        if self.records.blocking_send(record).is_err() {
            debug!("record consumer gone, stopping session");
            self.handle.stop();
        }
    }
}
