use pnet::packet::icmp::{IcmpPacket, IcmpTypes, checksum};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use std::net::Ipv4Addr;

use crate::probe::codec::ProbeId;
use crate::probe::icmp::ICMP_HEADER_SIZE;

/// Minimum IPv4 header length (IHL = 5)
const MIN_IPV4_HEADER: usize = 20;

/// ICMP Echo Request type, as quoted inside error messages
const ICMP_ECHO_REQUEST: u8 = 8;

/// What kind of message answered a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// The destination itself answered
    EchoReply,
    /// An intermediate router dropped the probe when its TTL ran out
    TimeExceeded,
}

/// A datagram that was correlated to one of our probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub responder: Ipv4Addr,
    pub probe_id: ProbeId,
    pub kind: ReplyKind,
}

/// Parse a datagram read from a raw IPv4 ICMP socket (outer IP header included)
///
/// Returns None if:
/// - Packet is malformed or truncated
/// - Packet is not a response to our probe (wrong identifier, or not an Echo
///   Request quoted inside a Time Exceeded)
/// - Echo Reply checksum is invalid
/// - Decoded hop is outside `1..=max_hops`
pub fn parse_reply(data: &[u8], our_identifier: u16, max_hops: u8) -> Option<ParsedReply> {
    let ip_packet = Ipv4Packet::new(data)?;
    if ip_packet.get_version() != 4
        || ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Icmp
    {
        return None;
    }

    let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
    if ip_header_len < MIN_IPV4_HEADER || data.len() < ip_header_len + ICMP_HEADER_SIZE {
        return None;
    }

    let responder = ip_packet.get_source();
    let icmp_data = &data[ip_header_len..];
    let icmp_packet = IcmpPacket::new(icmp_data)?;

    let (identifier, sequence, kind) = match icmp_packet.get_icmp_type() {
        IcmpTypes::EchoReply => {
            if checksum(&icmp_packet) != icmp_packet.get_checksum() {
                return None;
            }
            let (identifier, sequence) = read_id_seq(&icmp_data[4..8]);
            (identifier, sequence, ReplyKind::EchoReply)
        }
        IcmpTypes::TimeExceeded => {
            let (identifier, sequence) = parse_quoted_echo(&icmp_data[ICMP_HEADER_SIZE..])?;
            (identifier, sequence, ReplyKind::TimeExceeded)
        }
        _ => return None,
    };

    if identifier != our_identifier {
        return None;
    }

    let probe_id = ProbeId::from_sequence(sequence);
    if probe_id.hop == 0 || probe_id.hop > max_hops {
        return None;
    }

    Some(ParsedReply {
        responder,
        probe_id,
        kind,
    })
}

/// Extract identifier and sequence of our original Echo Request from the
/// payload of a Time Exceeded message
///
/// Layout after the 8-byte ICMP error header:
/// [0..ihl]      Original IP header (ihl = low nibble of byte 0, x4)
/// [ihl..ihl+8]  Original ICMP header: type, code, checksum, identifier, sequence
fn parse_quoted_echo(payload: &[u8]) -> Option<(u16, u16)> {
    let first = *payload.first()?;
    let inner_ihl = ((first & 0x0F) as usize) * 4;
    if inner_ihl < MIN_IPV4_HEADER || payload.len() < inner_ihl + ICMP_HEADER_SIZE {
        return None;
    }

    let inner_icmp = &payload[inner_ihl..inner_ihl + ICMP_HEADER_SIZE];
    if inner_icmp[0] != ICMP_ECHO_REQUEST {
        return None;
    }

    Some(read_id_seq(&inner_icmp[4..8]))
}

fn read_id_seq(bytes: &[u8]) -> (u16, u16) {
    (
        u16::from_be_bytes([bytes[0], bytes[1]]),
        u16::from_be_bytes([bytes[2], bytes[3]]),
    )
}

/// Helpers that forge ICMP datagrams as a raw IPv4 socket would deliver them.
///
/// Shared by unit and integration tests.
#[doc(hidden)]
pub mod forge {
    use pnet::packet::icmp::{IcmpPacket, checksum};
    use std::net::Ipv4Addr;

    use crate::probe::codec::ProbeId;
    use crate::probe::icmp::build_echo_request;

    const ICMP_TIME_EXCEEDED: u8 = 11;
    const ICMP_ECHO_REPLY: u8 = 0;

    /// Wrap an ICMP message in a minimal IPv4 header
    pub fn ipv4_wrap(src: Ipv4Addr, dst: Ipv4Addr, ttl: u8, icmp: &[u8]) -> Vec<u8> {
        let total = 20 + icmp.len();
        let mut packet = vec![0u8; 20];
        packet[0] = 0x45;
        packet[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        packet[8] = ttl;
        packet[9] = 1; // ICMP
        packet[12..16].copy_from_slice(&src.octets());
        packet[16..20].copy_from_slice(&dst.octets());
        packet.extend_from_slice(icmp);
        packet
    }

    fn finish_checksum(icmp: &mut [u8]) {
        if let Some(view) = IcmpPacket::new(icmp) {
            let cksum = checksum(&view);
            icmp[2..4].copy_from_slice(&cksum.to_be_bytes());
        }
    }

    /// Echo Reply from `src` answering the probe
    pub fn echo_reply(src: Ipv4Addr, local: Ipv4Addr, identifier: u16, probe: ProbeId) -> Vec<u8> {
        let mut icmp = build_echo_request(identifier, probe, 32);
        icmp[0] = ICMP_ECHO_REPLY;
        finish_checksum(&mut icmp);
        ipv4_wrap(src, local, 64, &icmp)
    }

    /// Time Exceeded from router `src` quoting the probe sent to `dest`
    pub fn time_exceeded(
        src: Ipv4Addr,
        local: Ipv4Addr,
        dest: Ipv4Addr,
        identifier: u16,
        probe: ProbeId,
    ) -> Vec<u8> {
        let original = build_echo_request(identifier, probe, 32);
        let quoted_ip = ipv4_wrap(local, dest, 1, &original[..8]);

        let mut icmp = vec![ICMP_TIME_EXCEEDED, 0, 0, 0, 0, 0, 0, 0];
        icmp.extend_from_slice(&quoted_ip);
        finish_checksum(&mut icmp);
        ipv4_wrap(src, local, 250, &icmp)
    }
}
