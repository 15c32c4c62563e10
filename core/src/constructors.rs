//! Canonical packet shapes used by the session engine (§4.2).

use crate::header::Header;
use crate::packet::{Opcode, Packet, Parameter};

/// The discovery name every GET/DISCOVER beacon carries.
pub const DISCOVER_NAME: &str = "DISCOVER";

/// CONNECT: Final, a max-packet parameter, NAME/LENGTH/HOSTNAME headers.
pub fn connect(filename: &str, length: u64, max_packet: u16, hostname: &str) -> Packet {
    Packet::new(Opcode::CONNECT.with_final(true))
        .with_param(Parameter::max_packet(max_packet))
        .with_header(Header::name(filename))
        .with_header(Header::length(length))
        .with_header(Header::hostname(hostname))
}

/// SUCCESS in reply to CONNECT: accepted max-packet parameter + HOSTNAME.
pub fn connect_success(max_packet: u16, hostname: &str) -> Packet {
    Packet::new(Opcode::SUCCESS.with_final(true))
        .with_param(Parameter::max_packet(max_packet))
        .with_header(Header::hostname(hostname))
}

/// A bare SUCCESS (used to acknowledge the final PUT).
pub fn success() -> Packet {
    Packet::new(Opcode::SUCCESS.with_final(true))
}

pub fn continue_() -> Packet {
    Packet::new(Opcode::CONTINUE.with_final(false))
}

pub fn unauthorized() -> Packet {
    Packet::new(Opcode::UNAUTHORIZED.with_final(true))
}

/// PUT carrying one chunk of transfer data.
pub fn put(chunk: &[u8], is_final: bool) -> Packet {
    Packet::new(Opcode::PUT.with_final(is_final)).with_body(chunk.to_vec(), is_final)
}

pub fn abort() -> Packet {
    Packet::new(Opcode::ABORT.with_final(true))
}

pub fn disconnect() -> Packet {
    Packet::new(Opcode::DISCONNECT.with_final(true))
}

/// Discovery GET: Final, single NAME header with UTF-16 value `DISCOVER`.
pub fn discover_get() -> Packet {
    Packet::new(Opcode::GET.with_final(true)).with_header(Header::name(DISCOVER_NAME))
}

/// Discovery SUCCESS reply: Final, HOSTNAME extension header.
pub fn discover_success(hostname: &str) -> Packet {
    Packet::new(Opcode::SUCCESS.with_final(true)).with_header(Header::hostname(hostname))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Opcode as Op;

    #[test]
    fn discover_get_round_trips() {
        let p = discover_get();
        let bytes = p.encode();
        let decoded = Packet::decode_buf(&bytes, &[Op::GET.masked()]).unwrap();
        assert_eq!(decoded.name(), Some(DISCOVER_NAME.to_string()));
    }

    #[test]
    fn connect_success_carries_negotiated_max_packet() {
        let p = connect_success(4096, "host-a");
        let bytes = p.encode();
        let decoded = Packet::decode_buf(&bytes, &[Op::SUCCESS.masked()]).unwrap();
        assert_eq!(decoded.max_packet_param(), Some(4096));
        assert_eq!(decoded.hostname(), Some("host-a".to_string()));
    }
}
