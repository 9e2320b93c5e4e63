//! Captured-frame classification.
//!
//! Turns raw bytes from a capture channel into a flat summary the sniffer
//! and its consumers can work with. Anything that fails to parse is treated
//! as expected noise on a live interface and yields `None`, never an error.

use std::net::Ipv4Addr;

use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::util::MacAddr;

/// Transport-level interest classification of a captured frame.
///
/// `Http`/`Https` require a non-empty TCP payload: a handshake or bare ACK
/// on port 80/443 is not web traffic of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficKind {
    Http,
    Https,
    Udp,
    Other,
}

/// Parsed view of one captured IPv4 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    pub source_mac: MacAddr,
    pub dest_mac: MacAddr,
    pub source_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
    pub identification: u16,
    pub protocol: IpNextHeaderProtocol,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
    pub kind: TrafficKind,
    pub payload: Vec<u8>,
}

/// Transport payload length from the header arithmetic:
/// IP total length minus IP and TCP header lengths.
///
/// Derived from the headers rather than the buffer, so link-layer padding on
/// short frames does not masquerade as payload.
pub fn tcp_payload_len(ipv4: &Ipv4Packet<'_>, tcp: &TcpPacket<'_>) -> usize {
    usize::from(ipv4.get_total_length())
        .saturating_sub(usize::from(ipv4.get_header_length()) * 4)
        .saturating_sub(usize::from(tcp.get_data_offset()) * 4)
}

fn web_kind(source_port: u16, dest_port: u16, payload_len: usize) -> TrafficKind {
    if payload_len == 0 {
        return TrafficKind::Other;
    }
    let ports = [source_port, dest_port];
    if ports.contains(&80) {
        TrafficKind::Http
    } else if ports.contains(&443) {
        TrafficKind::Https
    } else {
        TrafficKind::Other
    }
}

/// Parse and classify a raw captured frame.
///
/// Returns `None` for anything that is not a well-formed IPv4-over-Ethernet
/// frame; such frames are silently discarded by the callers.
pub fn classify(frame: &[u8]) -> Option<FrameSummary> {
    let ethernet = EthernetPacket::new(frame)?;

    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let ipv4 = Ipv4Packet::new(ethernet.payload())?;
    let protocol = ipv4.get_next_level_protocol();

    let (source_port, dest_port, kind, payload) = match protocol {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(ipv4.payload())?;
            let payload_len = tcp_payload_len(&ipv4, &tcp);
            let kind = web_kind(tcp.get_source(), tcp.get_destination(), payload_len);
            let payload = tcp.payload()[..payload_len.min(tcp.payload().len())].to_vec();
            (
                Some(tcp.get_source()),
                Some(tcp.get_destination()),
                kind,
                payload,
            )
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(ipv4.payload())?;
            (
                Some(udp.get_source()),
                Some(udp.get_destination()),
                TrafficKind::Udp,
                udp.payload().to_vec(),
            )
        }
        _ => (None, None, TrafficKind::Other, Vec::new()),
    };

    Some(FrameSummary {
        source_mac: ethernet.get_source(),
        dest_mac: ethernet.get_destination(),
        source_ip: ipv4.get_source(),
        dest_ip: ipv4.get_destination(),
        identification: ipv4.get_identification(),
        protocol,
        source_port,
        dest_port,
        kind,
        payload,
    })
}
