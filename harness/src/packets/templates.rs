//! Byte-exact probe packets and masked expectations for the five probe
//! classes (spec.md §2.2, §6). Built with `pnet_packet` so every header
//! field lands at its real wire offset.

use crate::config::HarnessConfig;
use crate::packets::host_address::{pattern_mac, HostAddress, LAG_BASE_MAC_PATTERN};
use ipnetwork::Ipv4Network;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::IcmpTypes;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::MutableIpv4Packet;
use pnet::packet::tcp::MutableTcpPacket;
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

pub const ETH_LEN: usize = 14;
pub const IPV4_LEN: usize = 20;
pub const TCP_LEN: usize = 20;
/// Offset of the TCP destination port within a full Ethernet+IPv4+TCP frame.
pub const TCP_DPORT_OFFSET: usize = ETH_LEN + IPV4_LEN + 2;
/// Offset of the IPv4 TTL byte.
pub const IPV4_TTL_OFFSET: usize = ETH_LEN + 8;
/// Offset (4 bytes) of the IPv4 destination address.
pub const IPV4_DST_OFFSET: usize = ETH_LEN + 16;

pub const PROBE_SPORT: u16 = 1234;
pub const PROBE_DPORT: u16 = 5000;

/// Which of the five probe classes a burst belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeClass {
    DataplaneUpstreamToServer,
    DataplaneServerToUpstream,
    ControlPlaneIcmp,
    VlanArp,
    VlanGateway,
}

/// A single probe packet ready to transmit on its ingress interface.
#[derive(Debug, Clone)]
pub struct ProbePacket {
    pub ingress_interface: String,
    pub bytes: Vec<u8>,
}

/// A byte-exact template plus the byte ranges a received packet must match.
/// All other bytes are don't-care, per spec.md §3's `ExpectedMask`.
#[derive(Debug, Clone)]
pub struct ExpectedMask {
    template: Vec<u8>,
    care_ranges: Vec<(usize, usize)>,
}

impl ExpectedMask {
    pub fn new(template: Vec<u8>, care_ranges: Vec<(usize, usize)>) -> Self {
        Self {
            template,
            care_ranges,
        }
    }

    /// A received frame matches iff every cared-about byte range equals the
    /// template at that offset. Frames shorter than a cared range never
    /// match; extra trailing bytes beyond the template are ignored.
    pub fn matches(&self, received: &[u8]) -> bool {
        self.care_ranges.iter().all(|&(offset, len)| {
            let end = offset + len;
            received.len() >= end
                && self.template.len() >= end
                && received[offset..end] == self.template[offset..end]
        })
    }
}

pub(crate) fn build_tcp_frame(
    eth_src: MacAddr,
    eth_dst: MacAddr,
    ip_src: Ipv4Addr,
    ip_dst: Ipv4Addr,
    ip_ttl: u8,
    sport: u16,
    dport: u16,
    payload: &[u8],
) -> Vec<u8> {
    let total_len = ETH_LEN + IPV4_LEN + TCP_LEN + payload.len();
    let mut buf = vec![0u8; total_len];

    {
        let mut eth = MutableEthernetPacket::new(&mut buf[..ETH_LEN]).unwrap();
        eth.set_source(eth_src);
        eth.set_destination(eth_dst);
        eth.set_ethertype(EtherTypes::Ipv4);
    }
    {
        let mut ip = MutableIpv4Packet::new(&mut buf[ETH_LEN..ETH_LEN + IPV4_LEN]).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length((IPV4_LEN + TCP_LEN + payload.len()) as u16);
        ip.set_ttl(ip_ttl);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
        ip.set_source(ip_src);
        ip.set_destination(ip_dst);
        let checksum = pnet::packet::ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }
    {
        let mut tcp =
            MutableTcpPacket::new(&mut buf[ETH_LEN + IPV4_LEN..]).unwrap();
        tcp.set_source(sport);
        tcp.set_destination(dport);
        tcp.set_data_offset(5);
        tcp.set_window(0);
        tcp.set_payload(payload);
        let checksum =
            pnet::packet::tcp::ipv4_checksum(&tcp.to_immutable(), &ip_src, &ip_dst);
        tcp.set_checksum(checksum);
    }

    buf
}

fn build_arp_frame(
    eth_src: MacAddr,
    eth_dst: MacAddr,
    op: pnet::packet::arp::ArpOperation,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    const ARP_LEN: usize = 28;
    let mut buf = vec![0u8; ETH_LEN + ARP_LEN];
    {
        let mut eth = MutableEthernetPacket::new(&mut buf[..ETH_LEN]).unwrap();
        eth.set_source(eth_src);
        eth.set_destination(eth_dst);
        eth.set_ethertype(EtherTypes::Arp);
    }
    {
        let mut arp = MutableArpPacket::new(&mut buf[ETH_LEN..]).unwrap();
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(op);
        arp.set_sender_hw_addr(sender_mac);
        arp.set_sender_proto_addr(sender_ip);
        arp.set_target_hw_addr(target_mac);
        arp.set_target_proto_addr(target_ip);
    }
    buf
}

fn build_icmp_echo_frame(
    eth_src: MacAddr,
    eth_dst: MacAddr,
    ip_src: Ipv4Addr,
    ip_dst: Ipv4Addr,
    identifier: u16,
    sequence: u16,
) -> Vec<u8> {
    const ICMP_LEN: usize = 8;
    let total_len = ETH_LEN + IPV4_LEN + ICMP_LEN;
    let mut buf = vec![0u8; total_len];
    {
        let mut eth = MutableEthernetPacket::new(&mut buf[..ETH_LEN]).unwrap();
        eth.set_source(eth_src);
        eth.set_destination(eth_dst);
        eth.set_ethertype(EtherTypes::Ipv4);
    }
    {
        let mut ip = MutableIpv4Packet::new(&mut buf[ETH_LEN..ETH_LEN + IPV4_LEN]).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length((IPV4_LEN + ICMP_LEN) as u16);
        ip.set_ttl(64);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip.set_source(ip_src);
        ip.set_destination(ip_dst);
        let checksum = pnet::packet::ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }
    {
        let mut icmp = MutableEchoRequestPacket::new(&mut buf[ETH_LEN + IPV4_LEN..]).unwrap();
        icmp.set_icmp_type(IcmpTypes::EchoRequest);
        icmp.set_icmp_code(pnet::packet::icmp::IcmpCode::new(0));
        icmp.set_identifier(identifier);
        icmp.set_sequence_number(sequence);
        let checksum = pnet::packet::util::checksum(icmp.packet(), 1);
        icmp.set_checksum(checksum);
    }
    buf
}

/// Precomputed, immutable packet templates for all five probe classes plus
/// the tagged sender stream's T1-side and VLAN-side source patterns.
/// Created once during setup.
pub struct ProbeSetup {
    pub hosts: Vec<HostAddress>,
    pub from_server_dst_addr: Ipv4Addr,

    pub upstream_to_server: Vec<ProbePacket>,
    pub upstream_to_server_mask: ExpectedMask,

    pub server_to_upstream: Vec<ProbePacket>,
    pub server_to_upstream_mask: ExpectedMask,

    pub ping_dut: Vec<ProbePacket>,
    pub ping_dut_mask: ExpectedMask,

    pub vlan_arp: ProbePacket,
    pub vlan_arp_mask: ExpectedMask,
    pub vlan_arp_src_interface: String,

    pub vlan_gateway: Vec<ProbePacket>,
    pub vlan_gateway_mask: ExpectedMask,

    /// T1 ingress interfaces, used by the Sender to cycle through
    /// T1->vlan traffic sources.
    pub t1_interfaces: Vec<String>,
}

impl ProbeSetup {
    pub fn build(cfg: &HarnessConfig, hosts: Vec<HostAddress>) -> Self {
        let t1_ports: Vec<&crate::config::DataplanePort> = cfg
            .dataplane_ports
            .iter()
            .filter(|p| matches!(p.role, crate::config::PortRole::T1))
            .collect();
        let t1_interfaces: Vec<String> =
            t1_ports.iter().map(|p| p.interface.clone()).collect();

        let from_server_dst_addr = pick_deterministic_host(cfg.default_ip_range);

        let dut_eth_addr = cfg.vlan_mac.unwrap_or(cfg.dut_mac);

        let (upstream_to_server, upstream_to_server_mask) =
            build_upstream_to_server(&t1_ports, &hosts, cfg.default_ip_range, cfg.dut_mac);
        let (server_to_upstream, server_to_upstream_mask) =
            build_server_to_upstream(&hosts, from_server_dst_addr, dut_eth_addr);
        let (ping_dut, ping_dut_mask) = build_ping_dut(&hosts, cfg.lo_prefix, dut_eth_addr);
        let (vlan_arp, vlan_arp_mask, vlan_arp_src_interface) = build_vlan_arp(&hosts);
        let (vlan_gateway, vlan_gateway_mask) =
            build_vlan_gateway_arp(&hosts, cfg.vlan_gateway_ip, dut_eth_addr);

        Self {
            hosts,
            from_server_dst_addr,
            upstream_to_server,
            upstream_to_server_mask,
            server_to_upstream,
            server_to_upstream_mask,
            ping_dut,
            ping_dut_mask,
            vlan_arp,
            vlan_arp_mask,
            vlan_arp_src_interface,
            vlan_gateway,
            vlan_gateway_mask,
            t1_interfaces,
        }
    }
}

fn pick_deterministic_host(net: Ipv4Network) -> Ipv4Addr {
    // A fixed, repeatable choice (host offset 2) rather than the original's
    // random pick -- the harness's templates must be stable across runs
    // for reproducible masks.
    crate::packets::host_address::host_ip(net, 2).unwrap_or_else(|_| net.ip())
}

fn build_upstream_to_server(
    t1_ports: &[&crate::config::DataplanePort],
    hosts: &[HostAddress],
    default_ip_range: Ipv4Network,
    dut_mac: MacAddr,
) -> (Vec<ProbePacket>, ExpectedMask) {
    let src_addr = pick_deterministic_host(default_ip_range);
    let mut packets = Vec::new();

    for (counter, port) in t1_ports.iter().enumerate() {
        let eth_src = pattern_mac(LAG_BASE_MAC_PATTERN, counter as u16).unwrap_or(MacAddr::zero());
        for host in hosts {
            let bytes = build_tcp_frame(
                eth_src,
                dut_mac,
                src_addr,
                host.ipv4,
                255,
                PROBE_SPORT,
                PROBE_DPORT,
                &[],
            );
            packets.push(ProbePacket {
                ingress_interface: port.interface.clone(),
                bytes,
            });
        }
    }

    // Only the destination port is checked; everything else is don't-care
    // (the device may rewrite MACs, decrement TTL, or NAT the source).
    let template = build_tcp_frame(
        MacAddr::zero(),
        MacAddr::zero(),
        Ipv4Addr::UNSPECIFIED,
        Ipv4Addr::UNSPECIFIED,
        0,
        0,
        PROBE_DPORT,
        &[],
    );
    let mask = ExpectedMask::new(template, vec![(TCP_DPORT_OFFSET, 2)]);
    (packets, mask)
}

fn build_server_to_upstream(
    hosts: &[HostAddress],
    from_server_dst_addr: Ipv4Addr,
    eth_dst: MacAddr,
) -> (Vec<ProbePacket>, ExpectedMask) {
    let mut packets = Vec::new();
    for host in hosts {
        let bytes = build_tcp_frame(
            host.mac,
            eth_dst,
            host.ipv4,
            from_server_dst_addr,
            64,
            PROBE_SPORT,
            PROBE_DPORT,
            &[],
        );
        packets.push(ProbePacket {
            ingress_interface: host.interface.clone(),
            bytes,
        });
    }

    // Destination address, the post-hop TTL, and the destination port are
    // checked; source address/MACs/checksums are don't-care.
    let template = build_tcp_frame(
        MacAddr::zero(),
        MacAddr::zero(),
        Ipv4Addr::UNSPECIFIED,
        from_server_dst_addr,
        63,
        0,
        PROBE_DPORT,
        &[],
    );
    let mask = ExpectedMask::new(
        template,
        vec![
            (IPV4_TTL_OFFSET, 1),
            (IPV4_DST_OFFSET, 4),
            (TCP_DPORT_OFFSET, 2),
        ],
    );
    (packets, mask)
}

fn build_ping_dut(
    hosts: &[HostAddress],
    lo_prefix: Ipv4Network,
    eth_dst: MacAddr,
) -> (Vec<ProbePacket>, ExpectedMask) {
    let dut_lo = lo_prefix.ip();
    let mut packets = Vec::new();
    for host in hosts {
        let bytes = build_icmp_echo_frame(host.mac, eth_dst, host.ipv4, dut_lo, 1, 0);
        packets.push(ProbePacket {
            ingress_interface: host.interface.clone(),
            bytes,
        });
    }

    const ICMP_TYPE_OFFSET: usize = ETH_LEN + IPV4_LEN;
    const ICMP_SRC_OFFSET: usize = ETH_LEN + 12;
    let template = build_icmp_echo_frame(
        MacAddr::zero(),
        MacAddr::zero(),
        dut_lo,
        Ipv4Addr::UNSPECIFIED,
        1,
        0,
    );
    let mut template = template;
    template[ICMP_TYPE_OFFSET] = pnet::packet::icmp::IcmpTypes::EchoReply.0;
    let mask = ExpectedMask::new(
        template,
        vec![(ICMP_SRC_OFFSET, 4), (ICMP_TYPE_OFFSET, 1)],
    );
    (packets, mask)
}

fn build_vlan_arp(hosts: &[HostAddress]) -> (ProbePacket, ExpectedMask, String) {
    // Pick the first two distinct hosts deterministically.
    let src = &hosts[0];
    let dst = if hosts.len() > 1 { &hosts[1] } else { &hosts[0] };

    let bytes = build_arp_frame(
        src.mac,
        MacAddr::broadcast(),
        ArpOperations::Request,
        src.mac,
        src.ipv4,
        MacAddr::zero(),
        dst.ipv4,
    );
    let probe = ProbePacket {
        ingress_interface: src.interface.clone(),
        bytes,
    };

    const ARP_OP_OFFSET: usize = ETH_LEN + 6;
    const ARP_SPA_OFFSET: usize = ETH_LEN + 14;
    const ARP_TPA_OFFSET: usize = ETH_LEN + 24;
    let template = build_arp_frame(
        MacAddr::zero(),
        src.mac,
        ArpOperations::Reply,
        MacAddr::zero(),
        dst.ipv4,
        src.mac,
        src.ipv4,
    );
    let mask = ExpectedMask::new(
        template,
        vec![(ARP_OP_OFFSET, 2), (ARP_SPA_OFFSET, 4), (ARP_TPA_OFFSET, 4)],
    );
    (probe, mask, src.interface.clone())
}

fn build_vlan_gateway_arp(
    hosts: &[HostAddress],
    gateway_ip: Ipv4Addr,
    eth_dst: MacAddr,
) -> (Vec<ProbePacket>, ExpectedMask) {
    let mut packets = Vec::new();
    for host in hosts {
        let bytes = build_arp_frame(
            host.mac,
            MacAddr::broadcast(),
            ArpOperations::Request,
            host.mac,
            host.ipv4,
            MacAddr::zero(),
            gateway_ip,
        );
        packets.push(ProbePacket {
            ingress_interface: host.interface.clone(),
            bytes,
        });
    }

    const ARP_OP_OFFSET: usize = ETH_LEN + 6;
    const ARP_SPA_OFFSET: usize = ETH_LEN + 14;
    let template = build_arp_frame(
        eth_dst,
        MacAddr::zero(),
        ArpOperations::Reply,
        eth_dst,
        gateway_ip,
        MacAddr::zero(),
        Ipv4Addr::UNSPECIFIED,
    );
    let mask = ExpectedMask::new(template, vec![(ARP_OP_OFFSET, 2), (ARP_SPA_OFFSET, 4)]);
    (packets, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_host(interface: &str, ip: [u8; 4]) -> HostAddress {
        HostAddress {
            vlan: "Vlan1000".to_string(),
            interface: interface.to_string(),
            ipv4: Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]),
            mac: MacAddr::new(0x72, 6, 0, 1, 0, ip[3]),
        }
    }

    #[test]
    fn expected_mask_matches_only_cared_bytes() {
        let template = build_tcp_frame(
            MacAddr::zero(),
            MacAddr::zero(),
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            0,
            0,
            5000,
            &[],
        );
        let mask = ExpectedMask::new(template, vec![(TCP_DPORT_OFFSET, 2)]);

        let matching = build_tcp_frame(
            MacAddr::new(1, 2, 3, 4, 5, 6),
            MacAddr::new(6, 5, 4, 3, 2, 1),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            200,
            9999,
            5000,
            &[],
        );
        assert!(mask.matches(&matching));

        let non_matching = build_tcp_frame(
            MacAddr::zero(),
            MacAddr::zero(),
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            0,
            0,
            4999,
            &[],
        );
        assert!(!mask.matches(&non_matching));
    }

    #[test]
    fn server_to_upstream_mask_checks_dst_and_ttl() {
        let dst = Ipv4Addr::new(10, 0, 0, 9);
        let (_packets, mask) = build_server_to_upstream(&[], dst, MacAddr::zero());

        let good = build_tcp_frame(
            MacAddr::new(1, 1, 1, 1, 1, 1),
            MacAddr::new(2, 2, 2, 2, 2, 2),
            Ipv4Addr::new(192, 168, 1, 5),
            dst,
            63,
            1234,
            5000,
            &[],
        );
        assert!(mask.matches(&good));

        let wrong_ttl = build_tcp_frame(
            MacAddr::new(1, 1, 1, 1, 1, 1),
            MacAddr::new(2, 2, 2, 2, 2, 2),
            Ipv4Addr::new(192, 168, 1, 5),
            dst,
            64,
            1234,
            5000,
            &[],
        );
        assert!(!mask.matches(&wrong_ttl));
    }

    #[test]
    fn vlan_arp_probe_targets_second_host() {
        let hosts = vec![
            sample_host("eth1", [192, 168, 1, 2]),
            sample_host("eth2", [192, 168, 1, 3]),
        ];
        let (probe, _mask, src_iface) = build_vlan_arp(&hosts);
        assert_eq!(src_iface, "eth1");
        assert_eq!(probe.ingress_interface, "eth1");
    }

    #[test]
    fn builds_requested_number_of_vlan_gateway_probes() {
        let hosts = vec![
            sample_host("eth1", [192, 168, 1, 2]),
            sample_host("eth2", [192, 168, 1, 3]),
        ];
        let (packets, _mask) =
            build_vlan_gateway_arp(&hosts, Ipv4Addr::new(192, 168, 0, 1), MacAddr::zero());
        assert_eq!(packets.len(), 2);
    }
}
