//! Malformed-packet handling over a real socket (§8 scenario S6).

mod support;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use groundlift_core::events::Consent;

#[test]
fn s6_short_declared_size_terminates_the_connection_without_a_reply() {
    let downloads = tempfile::tempdir().unwrap();
    let (server, addr, _server_rx) = support::spawn_server(downloads.path().to_path_buf(), Consent::Accept);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();

    // A CONNECT header whose declared size (2) is shorter than the 3-byte
    // header itself, followed by bytes that would otherwise belong to a
    // well-formed packet. The codec must reject this before ever handing
    // anything to the state machine (no SUCCESS/UNAUTHORIZED reply).
    let bogus = [0x80u8, 0x00, 0x02, 0xAA, 0xBB, 0xCC, 0xDD];
    stream.write_all(&bogus).unwrap();

    let mut buf = [0u8; 16];
    let read = stream.read(&mut buf);
    match read {
        Ok(0) => {} // connection closed, no reply — expected
        Ok(n) => panic!("server sent a reply ({} bytes) to a malformed packet", n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
            panic!("connection neither closed nor replied within the timeout")
        }
        Err(e) => panic!("unexpected read error: {}", e),
    }

    server.stop();
}
