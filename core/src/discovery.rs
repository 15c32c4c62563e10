//! UDP broadcast discovery (§4.5, §6.2): a responder loop answering
//! `GET`/`DISCOVER` with a `HOSTNAME`-bearing `SUCCESS`, and a requester
//! that broadcasts one `GET` per broadcast-capable interface and collects
//! replies until its timeout elapses.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::constructors::{self, DISCOVER_NAME};
use crate::error::{GlError, Result};
use crate::events::{DiscoveredPeer, DiscoveryCallbacks};
use crate::lifecycle::still_running;
use crate::packet::{Opcode, Packet};
use crate::socket::{self, enumerate_broadcast_interfaces};

/// Default shared discovery/session port (§6.1, §6.2).
pub const DEFAULT_PORT: u16 = 1650;
const GLOBAL_BROADCAST: Ipv4Addr = Ipv4Addr::BROADCAST;
const RECV_BUF_SIZE: usize = 2048;

/// Run the discovery responder loop until `running` is cleared. Binds its
/// own UDP socket; intended to run on a dedicated worker thread alongside
/// the TCP accept loop (§5: "two threads per server instance").
pub fn run_responder(port: u16, hostname: &str, running: Arc<AtomicBool>) -> Result<()> {
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let socket = socket::setup_udp_server(bind_addr, Duration::from_millis(500))?;

    debug!("discovery responder listening on {}", bind_addr);

    let mut buf = [0u8; RECV_BUF_SIZE];
    while still_running(&running) {
        let (len, origin) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(GlError::socket(e)),
        };

        let packet = match Packet::decode_buf(&buf[..len], &[Opcode::GET.masked()]) {
            Ok(p) => p,
            Err(_) => continue, // not a well-formed GET; ignore per §4.5
        };

        if packet.name().as_deref() != Some(DISCOVER_NAME) {
            continue;
        }

        let reply = constructors::discover_success(hostname);
        if let Err(e) = socket.send_to(&reply.encode(), origin) {
            warn!("discovery reply to {} failed: {}", origin, e);
        }
    }

    debug!("discovery responder stopped");
    Ok(())
}

/// Broadcast a discovery GET on every usable interface (falling back to the
/// global broadcast address if none are enumerable) and invoke
/// `callbacks.peer_discovered` for each well-formed reply received before
/// `timeout` elapses.
pub fn discover_peers(port: u16, timeout: Duration, callbacks: &DiscoveryCallbacks) -> Result<()> {
    let socket = socket::setup_udp_client(timeout)?;

    let targets = broadcast_targets(port);
    let get = constructors::discover_get();
    let bytes = get.encode();
    for target in &targets {
        if let Err(e) = socket.send_to(&bytes, target) {
            warn!("discovery GET to {} failed: {}", target, e);
        }
    }

    collect_replies(&socket, &callbacks)
}

fn broadcast_targets(port: u16) -> Vec<SocketAddr> {
    let interfaces = enumerate_broadcast_interfaces();
    if interfaces.is_empty() {
        return vec![SocketAddr::new(IpAddr::V4(GLOBAL_BROADCAST), port)];
    }
    interfaces
        .into_iter()
        .map(|iface| SocketAddr::new(IpAddr::V4(iface.broadcast), port))
        .collect()
}

fn peer_id(hostname: &str, addr: SocketAddr) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    hostname.hash(&mut hasher);
    addr.hash(&mut hasher);
    hasher.finish()
}

fn collect_replies(socket: &UdpSocket, callbacks: &DiscoveryCallbacks) -> Result<()> {
    let mut buf = [0u8; RECV_BUF_SIZE];
    loop {
        let (len, origin) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break;
            }
            Err(e) => return Err(GlError::socket(e)),
        };

        let packet = match Packet::decode_buf(&buf[..len], &[Opcode::SUCCESS.masked()]) {
            Ok(p) => p,
            Err(_) => continue,
        };

        let hostname = match packet.hostname() {
            Some(h) => h,
            None => continue,
        };

        // The wire format (§4.2, §6.2) carries no peer-identifier field —
        // only HOSTNAME. Derive a stable id from hostname+address rather
        // than minting a fresh random one per datagram, so the same peer
        // reported twice in one discovery round compares equal.
        callbacks.emit(DiscoveredPeer {
            id: peer_id(&hostname, origin),
            os_tag: [0, 0, 0],
            hostname,
            addr: origin,
        });
    }
    Ok(())
}
