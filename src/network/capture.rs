//! Packet capture abstraction.
//!
//! Provides a trait-based abstraction over packet capture to enable:
//! - Testing without real network interfaces
//! - Different capture backends
//!
//! Capture filters are evaluated in-process on each received frame: the
//! datalink channel has no filter engine of its own, so a [`CaptureFilter`]
//! plays the role an interface-level filter expression would, deciding which
//! frames are delivered to a session's loop at all.

use std::net::Ipv4Addr;
use std::time::Duration;

use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::util::MacAddr;

use crate::error::{NetworkError, Result};
use crate::network::classify::tcp_payload_len;

/// Trait for packet capture implementations.
pub trait PacketCapture: Send {
    /// Receive the next frame.
    /// Returns None on timeout or if the capture has ended.
    fn next_frame(&mut self) -> Option<Vec<u8>>;
}

/// Trait for packet sending implementations.
pub trait PacketSender: Send {
    /// Send a raw frame. Fire-and-forget: no acknowledgment is tracked.
    fn send(&mut self, frame: &[u8]) -> Result<()>;
}

/// Which frames a capture session is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFilter {
    /// All IPv4 traffic. Used by the full-LAN redirect loop.
    IpOnly,

    /// IP frames sourced from the target, or from the gateway and destined
    /// to the target's address. Used when sniffing a remote target.
    Target {
        target_mac: MacAddr,
        gateway_mac: MacAddr,
        target_ip: Ipv4Addr,
    },

    /// HTTP/HTTPS TCP segments carrying a non-empty payload, sourced from
    /// the target or from the gateway toward the target. Used when sniffing
    /// the operator's own host.
    HttpOfTarget {
        target_mac: MacAddr,
        gateway_mac: MacAddr,
        target_ip: Ipv4Addr,
    },
}

impl CaptureFilter {
    /// Decide whether a raw frame is delivered to the session loop.
    pub fn accepts(&self, frame: &[u8]) -> bool {
        let Some(ethernet) = EthernetPacket::new(frame) else {
            return false;
        };

        if ethernet.get_ethertype() != EtherTypes::Ipv4 {
            return false;
        }

        match *self {
            Self::IpOnly => true,
            Self::Target {
                target_mac,
                gateway_mac,
                target_ip,
            } => from_target_or_gateway(&ethernet, target_mac, gateway_mac, target_ip),
            Self::HttpOfTarget {
                target_mac,
                gateway_mac,
                target_ip,
            } => {
                if !from_target_or_gateway(&ethernet, target_mac, gateway_mac, target_ip) {
                    return false;
                }
                is_web_segment_with_payload(ethernet.payload())
            }
        }
    }
}

fn from_target_or_gateway(
    ethernet: &EthernetPacket<'_>,
    target_mac: MacAddr,
    gateway_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> bool {
    let source = ethernet.get_source();
    if source == target_mac {
        return true;
    }

    source == gateway_mac
        && Ipv4Packet::new(ethernet.payload())
            .is_some_and(|ipv4| ipv4.get_destination() == target_ip)
}

/// TCP to/from port 80 or 443 with a payload length derived from the IP and
/// TCP header arithmetic, not from the frame length (trailing link-layer
/// padding must not count as payload).
fn is_web_segment_with_payload(ip_payload: &[u8]) -> bool {
    let Some(ipv4) = Ipv4Packet::new(ip_payload) else {
        return false;
    };

    if ipv4.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return false;
    }

    let Some(tcp) = TcpPacket::new(ipv4.payload()) else {
        return false;
    };

    let ports = [tcp.get_source(), tcp.get_destination()];
    if !ports.contains(&80) && !ports.contains(&443) {
        return false;
    }

    tcp_payload_len(&ipv4, &tcp) != 0
}

/// Find a suitable network interface.
///
/// Returns the first interface that is:
/// - Up (active)
/// - Not a loopback interface
/// - Has at least one IP address
pub fn find_interface(name: Option<&str>) -> Result<NetworkInterface> {
    let interfaces = datalink::interfaces();

    if let Some(name) = name {
        interfaces
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| NetworkError::NoInterface.into())
    } else {
        interfaces
            .into_iter()
            .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
            .ok_or_else(|| NetworkError::NoInterface.into())
    }
}

/// Extract the engine's own IP and MAC from a network interface.
pub fn interface_identity(interface: &NetworkInterface) -> Result<(Ipv4Addr, MacAddr)> {
    let mac = interface.mac.ok_or(NetworkError::NoInterface)?;

    let ip = interface
        .ips
        .iter()
        .find_map(|ip| match ip.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .ok_or(NetworkError::NoInterface)?;

    Ok((ip, mac))
}

/// Open a promiscuous datalink channel on the interface.
///
/// The read timeout bounds how long [`PacketCapture::next_frame`] may block,
/// keeping the session loops responsive to their stop flags. Each session
/// opens its own channel; the pair is that session's exclusive handle.
pub fn open_capture(
    interface: &NetworkInterface,
    read_timeout: Duration,
) -> Result<(PnetCapture, PnetSender)> {
    let config = datalink::Config {
        promiscuous: true,
        read_timeout: Some(read_timeout),
        ..datalink::Config::default()
    };

    let (tx, rx) = match datalink::channel(interface, config) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => return Err(NetworkError::UnsupportedChannel.into()),
        Err(e) => return Err(NetworkError::ChannelOpen(e.to_string()).into()),
    };

    Ok((PnetCapture { rx }, PnetSender { tx }))
}

/// Production packet capture using pnet.
pub struct PnetCapture {
    rx: Box<dyn DataLinkReceiver>,
}

impl PacketCapture for PnetCapture {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.rx.next().ok().map(<[u8]>::to_vec)
    }
}

/// Production packet sender using pnet.
pub struct PnetSender {
    tx: Box<dyn DataLinkSender>,
}

impl PacketSender for PnetSender {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.tx
            .send_to(frame, None)
            .ok_or_else(|| NetworkError::SendFailed("send returned None".into()))?
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
        Ok(())
    }
}
