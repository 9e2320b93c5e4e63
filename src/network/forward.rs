//! Link-layer re-addressing of intercepted frames.
//!
//! Poisoned hosts address their traffic to our MAC; to keep their
//! connectivity alive the engine rewrites the Ethernet header and puts the
//! frame back on the wire, toward the real gateway or back toward a device.

use std::net::Ipv4Addr;

use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::util::MacAddr;

use super::capture::PacketSender;
use crate::error::Result;

/// Rewrite the frame's hardware addresses and put it back on the wire.
///
/// Only the Ethernet header changes; the IP payload is retransmitted as
/// captured.
pub fn retransmit<S: PacketSender>(
    frame: &[u8],
    new_source: MacAddr,
    new_dest: MacAddr,
    sender: &mut S,
) -> Result<()> {
    let mut buffer = frame.to_vec();

    if let Some(mut ethernet) = MutableEthernetPacket::new(&mut buffer) {
        ethernet.set_source(new_source);
        ethernet.set_destination(new_dest);
    }

    sender.send(&buffer)
}

/// Extract the destination IP from an IPv4 frame.
pub fn destination_ip(frame: &[u8]) -> Option<Ipv4Addr> {
    let ethernet = EthernetPacket::new(frame)?;

    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let ipv4 = Ipv4Packet::new(ethernet.payload())?;
    Some(ipv4.get_destination())
}
