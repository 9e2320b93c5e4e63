//! Hand-built frames for exercising the codec and the loops.

use std::net::Ipv4Addr;

use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::MutableIpv4Packet;
use pnet::packet::tcp::MutableTcpPacket;
use pnet::packet::udp::MutableUdpPacket;
use pnet::util::MacAddr;

const ETHERNET_HEADER: usize = 14;
const IPV4_HEADER: usize = 20;
const TCP_HEADER: usize = 20;
const UDP_HEADER: usize = 8;

#[allow(clippy::cast_possible_truncation)]
fn ethernet_ipv4(
    buffer: &mut [u8],
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: pnet::packet::ip::IpNextHeaderProtocol,
    total_length: usize,
) {
    {
        let mut eth = MutableEthernetPacket::new(buffer).unwrap();
        eth.set_source(src_mac);
        eth.set_destination(dst_mac);
        eth.set_ethertype(EtherTypes::Ipv4);
    }
    {
        let mut ipv4 = MutableIpv4Packet::new(&mut buffer[ETHERNET_HEADER..]).unwrap();
        ipv4.set_version(4);
        ipv4.set_header_length(5);
        ipv4.set_total_length(total_length as u16);
        ipv4.set_identification(0x1234);
        ipv4.set_ttl(64);
        ipv4.set_next_level_protocol(protocol);
        ipv4.set_source(src_ip);
        ipv4.set_destination(dst_ip);
    }
}

/// A TCP segment with `payload_len` bytes of 0xAB payload.
#[allow(clippy::cast_possible_truncation, clippy::too_many_arguments)]
pub fn tcp_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload_len: usize,
) -> Vec<u8> {
    let total = ETHERNET_HEADER + IPV4_HEADER + TCP_HEADER + payload_len;
    let mut buffer = vec![0u8; total];
    ethernet_ipv4(
        &mut buffer,
        src_mac,
        dst_mac,
        src_ip,
        dst_ip,
        IpNextHeaderProtocols::Tcp,
        IPV4_HEADER + TCP_HEADER + payload_len,
    );
    {
        let mut tcp = MutableTcpPacket::new(&mut buffer[ETHERNET_HEADER + IPV4_HEADER..]).unwrap();
        tcp.set_source(src_port);
        tcp.set_destination(dst_port);
        tcp.set_data_offset(5);
        tcp.set_payload(&vec![0xAB; payload_len]);
    }
    buffer
}

/// A UDP datagram with `payload_len` bytes of 0xCD payload.
#[allow(clippy::cast_possible_truncation, clippy::too_many_arguments)]
pub fn udp_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload_len: usize,
) -> Vec<u8> {
    let total = ETHERNET_HEADER + IPV4_HEADER + UDP_HEADER + payload_len;
    let mut buffer = vec![0u8; total];
    ethernet_ipv4(
        &mut buffer,
        src_mac,
        dst_mac,
        src_ip,
        dst_ip,
        IpNextHeaderProtocols::Udp,
        IPV4_HEADER + UDP_HEADER + payload_len,
    );
    {
        let mut udp = MutableUdpPacket::new(&mut buffer[ETHERNET_HEADER + IPV4_HEADER..]).unwrap();
        udp.set_source(src_port);
        udp.set_destination(dst_port);
        udp.set_length((UDP_HEADER + payload_len) as u16);
        udp.set_payload(&vec![0xCD; payload_len]);
    }
    buffer
}

/// A non-IP frame, as seen on any live segment.
pub fn arp_noise(src_mac: MacAddr) -> Vec<u8> {
    let mut buffer = vec![0u8; 42];
    let mut eth = MutableEthernetPacket::new(&mut buffer).unwrap();
    eth.set_source(src_mac);
    eth.set_destination(MacAddr::broadcast());
    eth.set_ethertype(EtherTypes::Arp);
    buffer
}
