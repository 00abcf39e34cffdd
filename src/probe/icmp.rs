use pnet::packet::MutablePacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes, checksum};

use crate::probe::codec::ProbeId;

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;

/// Build an ICMP Echo Request carrying `identifier` and the encoded probe id
///
/// The payload is a fixed byte pattern; correlation relies only on the header.
pub fn build_echo_request(identifier: u16, probe: ProbeId, payload_size: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + payload_size];

    // The buffer is sized for the header above, so the views always fit.
    if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buffer) {
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(probe.to_sequence());

        for (i, byte) in packet.payload_mut().iter_mut().enumerate() {
            *byte = (i & 0xFF) as u8;
        }
    }

    if let Some(view) = IcmpPacket::new(&buffer) {
        let cksum = checksum(&view);
        if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buffer) {
            packet.set_checksum(cksum);
        }
    }

    buffer
}
