//! The Sender's tagged packet format (spec.md §3, §6): an IPv4+TCP frame,
//! sport=1234/dport=5000, whose payload is 60 zero bytes followed by the
//! decimal ASCII rendering of a monotonically increasing sequence number.
//! Parsing/serializing lives here so downstream code never slices payload
//! bytes by hand.

use crate::packets::templates::{build_tcp_frame, ETH_LEN, IPV4_LEN, PROBE_DPORT, PROBE_SPORT, TCP_LEN};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

/// Number of leading zero padding bytes before the decimal sequence number.
pub const PAYLOAD_PAD_LEN: usize = 60;

/// A single tagged stream packet identified by its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedPacket {
    pub seq: u64,
}

impl TaggedPacket {
    pub fn new(seq: u64) -> Self {
        Self { seq }
    }

    fn payload(&self) -> Vec<u8> {
        let mut buf = vec![0u8; PAYLOAD_PAD_LEN];
        buf.extend_from_slice(self.seq.to_string().as_bytes());
        buf
    }

    /// Build the full Ethernet+IPv4+TCP frame for this sequence number.
    #[allow(clippy::too_many_arguments)]
    pub fn build_frame(
        &self,
        eth_src: MacAddr,
        eth_dst: MacAddr,
        ip_src: Ipv4Addr,
        ip_dst: Ipv4Addr,
    ) -> Vec<u8> {
        build_tcp_frame(
            eth_src,
            eth_dst,
            ip_src,
            ip_dst,
            64,
            PROBE_SPORT,
            PROBE_DPORT,
            &self.payload(),
        )
    }

    /// Parse a captured frame, returning the sequence number if it is a
    /// tagged-stream TCP packet (sport=1234, dport=5000, payload a decimal
    /// integer following the zero padding).
    pub fn parse(frame: &[u8]) -> Option<TaggedPacket> {
        if frame.len() < ETH_LEN + IPV4_LEN {
            return None;
        }
        let ip = Ipv4Packet::new(&frame[ETH_LEN..])?;
        if ip.get_next_level_protocol() != pnet::packet::ip::IpNextHeaderProtocols::Tcp {
            return None;
        }
        let ip_header_len = (ip.get_header_length() as usize) * 4;
        let tcp_start = ETH_LEN + ip_header_len;
        if frame.len() < tcp_start + TCP_LEN {
            return None;
        }
        let tcp = TcpPacket::new(&frame[tcp_start..])?;
        if tcp.get_source() != PROBE_SPORT || tcp.get_destination() != PROBE_DPORT {
            return None;
        }
        let payload = tcp.payload();
        let digits_start = payload.iter().position(|&b| b != 0)?;
        let digits = &payload[digits_start..];
        if !digits.iter().all(|b| b.is_ascii_digit()) || digits.is_empty() {
            return None;
        }
        let text = std::str::from_utf8(digits).ok()?;
        let seq: u64 = text.parse().ok()?;
        Some(TaggedPacket { seq })
    }
}
