//! Full-LAN redirect engine: the read-classify-decide-send loop and the ARP
//! spoof/protect scheduler.
//!
//! One engine owns one capture handle exclusively. The loop body is
//! deliberately flat: read one frame with a bounded wait, run the two
//! forwarding paths, then give the scheduler one pass, so spoof pressure is
//! maintained at loop cadence even while traffic is flowing.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::counter;
use pnet::packet::ethernet::EthernetPacket;
use pnet::util::MacAddr;
use tracing::{debug, info, warn};

use crate::error::{NetworkError, Result};
use crate::network::arp::{ArpAssertion, ArpFrameBuilder, SpoofTarget};
use crate::network::capture::{CaptureFilter, PacketCapture, PacketSender};
use crate::network::forward;
use crate::registry::DeviceRegistry;

/// The engine's own addresses on the segment.
///
/// The gateway MAC is resolved once at activation and then immutable for the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub local_ip: Ipv4Addr,
    pub local_mac: MacAddr,
    pub gateway_ip: Ipv4Addr,
    pub gateway_mac: MacAddr,
}

impl NetworkIdentity {
    /// Resolve the gateway MAC from the configured cache, falling back to
    /// the registry snapshot. Activation fails if neither knows it.
    pub fn resolve(
        local_ip: Ipv4Addr,
        local_mac: MacAddr,
        gateway_ip: Ipv4Addr,
        cached_gateway_mac: Option<MacAddr>,
        registry: &DeviceRegistry,
    ) -> Result<Self> {
        let gateway_mac = match cached_gateway_mac {
            Some(mac) => mac,
            None => registry
                .get(&gateway_ip)
                .map(|device| device.mac())
                .ok_or(NetworkError::GatewayUnresolved(gateway_ip))?,
        };

        Ok(Self {
            local_ip,
            local_mac,
            gateway_ip,
            gateway_mac,
        })
    }
}

/// Cooperative stop switch for a running session loop.
///
/// Clearing the flag is the only stop signal; the loop observes it at the
/// top of each iteration and in-flight sends are never cancelled.
#[derive(Clone, Default)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub(crate) fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Intercepts a whole segment: victims' upload traffic is relayed to the
/// gateway, gateway traffic is relayed back to victims, each direction gated
/// by the device's byte budget.
pub struct RedirectEngine<C, S> {
    capture: C,
    sender: S,
    filter: CaptureFilter,
    registry: DeviceRegistry,
    identity: NetworkIdentity,
    arp: ArpFrameBuilder,
    spoof_protection: bool,
    handle: StopHandle,
}

impl<C, S> RedirectEngine<C, S>
where
    C: PacketCapture,
    S: PacketSender,
{
    /// Arm an engine over an opened capture handle.
    pub fn new(
        capture: C,
        sender: S,
        registry: DeviceRegistry,
        identity: NetworkIdentity,
        spoof_protection: bool,
    ) -> Self {
        let arp = ArpFrameBuilder::new(
            identity.local_mac,
            identity.local_ip,
            identity.gateway_ip,
            identity.gateway_mac,
        );

        Self {
            capture,
            sender,
            filter: CaptureFilter::IpOnly,
            registry,
            identity,
            arp,
            spoof_protection,
            handle: StopHandle::default(),
        }
    }

    /// Handle used to stop the loop from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    /// Run until the stop handle clears the flag. Blocking; callers put this
    /// on a dedicated blocking task.
    pub fn run(&mut self) {
        self.handle.start();
        info!(
            gateway = %self.identity.gateway_ip,
            protection = self.spoof_protection,
            "redirect engine running"
        );

        while self.handle.is_running() {
            self.poll_once();
        }

        info!("redirect engine stopped");
    }

    /// One loop iteration: a bounded-wait read, the two forwarding paths for
    /// the frame (if any), then exactly one scheduler pass.
    pub fn poll_once(&mut self) {
        if let Some(frame) = self.capture.next_frame()
            && self.filter.accepts(&frame)
        {
            self.handle_frame(&frame);
        }

        self.spoof_round();
    }

    /// Relay one captured frame, if it belongs to a redirected device.
    ///
    /// Unmatched traffic is not ours to manage: no transmit, no counter.
    fn handle_frame(&mut self, frame: &[u8]) {
        let Some(ethernet) = EthernetPacket::new(frame) else {
            return;
        };

        let source = ethernet.get_source();
        let len = frame.len() as u64;

        if let Some(device) = self
            .registry
            .find_by_mac(source)
            .filter(|device| device.is_redirected())
        {
            // Victim-to-gateway path.
            if device.consume_upload(len) {
                self.relay(frame, self.identity.gateway_mac, "upload");
            } else {
                counter!("netwarden_frames_capped", "direction" => "upload").increment(1);
                debug!(ip = %device.ip(), "upload cap reached, frame dropped");
            }
        } else if source == self.identity.gateway_mac {
            // Gateway-to-victim path, for frames no redirected device claimed.
            // The gateway itself may be a registry entry (that is where its
            // MAC comes from when not cached), so the fall-through must not
            // be keyed on registry membership.
            let Some(dest_ip) = forward::destination_ip(frame) else {
                return;
            };
            let Some(device) = self.registry.get(&dest_ip) else {
                return;
            };

            if !device.is_redirected() {
                return;
            }

            if device.consume_download(len) {
                self.relay(frame, device.mac(), "download");
            } else {
                counter!("netwarden_frames_capped", "direction" => "download").increment(1);
                debug!(ip = %device.ip(), "download cap reached, frame dropped");
            }
        }
    }

    fn relay(&mut self, frame: &[u8], dest: MacAddr, direction: &'static str) {
        match forward::retransmit(frame, self.identity.local_mac, dest, &mut self.sender) {
            Ok(()) => {
                counter!("netwarden_frames_forwarded", "direction" => direction).increment(1);
            }
            Err(err) => warn!("failed to relay frame: {err}"),
        }
    }

    /// One scheduler pass: re-assert the spoofed mappings for every blocked
    /// device, and our own true mapping when protection is enabled.
    fn spoof_round(&mut self) {
        for device in self.registry.blocked() {
            let target = SpoofTarget {
                ip: device.ip(),
                mac: device.mac(),
                redirected: device.is_redirected(),
            };

            self.send_assertions(ArpAssertion::Spoof, &target);
            if self.spoof_protection {
                self.send_assertions(ArpAssertion::Protect, &target);
            }
        }
    }

    fn send_assertions(&mut self, assertion: ArpAssertion, target: &SpoofTarget) {
        let kind = match assertion {
            ArpAssertion::Spoof => "spoof",
            ArpAssertion::Protect => "protect",
        };

        for frame in self.arp.frames_for(assertion, target) {
            match self.sender.send(&frame) {
                Ok(()) => {
                    counter!("netwarden_arp_frames_sent", "kind" => kind).increment(1);
                }
                Err(err) => warn!(ip = %target.ip, "failed to send {kind} frame: {err}"),
            }
        }
    }
}
