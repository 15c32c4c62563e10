//! BSD-sockets-like surface (§2.1, §4.6): TCP listen/accept/connect, UDP
//! send/recv with timeout and broadcast, and per-interface broadcast address
//! enumeration.
//!
//! Rust's `std::net` types already give us §3.1's ownership invariant for
//! free — a `TcpListener`/`TcpStream`/`UdpSocket` closes its underlying file
//! descriptor exactly once, on `Drop`, and there is no API to observe a
//! "half-valid" socket. So rather than a hand-rolled socket-handle struct
//! carrying a raw fd (the shape the spec's source used), this module is a
//! set of setup functions that hand back the corresponding std type,
//! pre-configured the way `setup_tcp`/`setup_udp` describe. `socket2` fills
//! in the handful of options `std::net` doesn't expose directly.

use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::GlError;

/// Bind and listen a TCP server socket with `SO_REUSEADDR` set, matching
/// `setup_tcp(server=true)`.
pub fn setup_tcp_server(bind_addr: SocketAddr, backlog: i32) -> Result<TcpListener, GlError> {
    let domain = domain_for(bind_addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(GlError::socket)?;
    socket.set_reuse_address(true).map_err(GlError::socket)?;
    socket.bind(&bind_addr.into()).map_err(GlError::socket)?;
    socket.listen(backlog).map_err(GlError::socket)?;
    Ok(socket.into())
}

/// Connect a TCP client socket, matching `setup_tcp(server=false)` +
/// `connect`.
pub fn setup_tcp_client(peer_addr: SocketAddr) -> Result<TcpStream, GlError> {
    TcpStream::connect(peer_addr).map_err(GlError::socket)
}

/// Bind a UDP socket for the discovery responder: `SO_REUSEADDR` (and
/// `SO_REUSEPORT` where available), broadcast-enabled, multicast loopback
/// disabled, with the given receive timeout. Matches `setup_udp(server=true,
/// timeout_ms)`.
pub fn setup_udp_server(bind_addr: SocketAddr, timeout: Duration) -> Result<UdpSocket, GlError> {
    let domain = domain_for(bind_addr);
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(GlError::socket)?;
    socket.set_reuse_address(true).map_err(GlError::socket)?;
    #[cfg(not(target_os = "windows"))]
    {
        let _ = socket.set_reuse_port(true);
    }
    socket.bind(&bind_addr.into()).map_err(GlError::socket)?;
    socket.set_broadcast(true).map_err(GlError::socket)?;
    if bind_addr.is_ipv4() {
        let _ = socket.set_multicast_loop_v4(false);
    }
    socket
        .set_read_timeout(Some(timeout))
        .map_err(GlError::socket)?;
    Ok(socket.into())
}

/// Bind an ephemeral UDP socket for the discovery requester (or the
/// responder's outbound replies): broadcast-enabled with the given receive
/// timeout. Matches `setup_udp(server=false, timeout_ms)`.
pub fn setup_udp_client(timeout: Duration) -> Result<UdpSocket, GlError> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(GlError::socket)?;
    socket.set_broadcast(true).map_err(GlError::socket)?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(GlError::socket)?;
    Ok(socket)
}

fn domain_for(addr: SocketAddr) -> Domain {
    match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    }
}

/// One IPv4 interface worth broadcasting discovery GETs on.
#[derive(Debug, Clone)]
pub struct BroadcastInterface {
    pub name: String,
    pub address: std::net::Ipv4Addr,
    pub broadcast: std::net::Ipv4Addr,
}

/// Enumerate the host's IPv4 interfaces with a broadcast capability,
/// skipping loopback-only or down interfaces (§4.5). Returns an empty `Vec`
/// if enumeration itself is unavailable; the caller falls back to the global
/// broadcast address in that case.
pub fn enumerate_broadcast_interfaces() -> Vec<BroadcastInterface> {
    let ifaces = match if_addrs::get_if_addrs() {
        Ok(ifaces) => ifaces,
        Err(_) => return Vec::new(),
    };

    ifaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(v4) => v4.broadcast.map(|broadcast| BroadcastInterface {
                name: iface.name.clone(),
                address: v4.ip,
                broadcast,
            }),
            if_addrs::IfAddr::V6(_) => None,
        })
        .collect()
}

/// Shut down a TCP stream for both reads and writes, unblocking any thread
/// currently parked in `recv`/`accept` on the peer side of it (§4.6, §5).
/// Idempotent: shutting down an already-shut-down stream is a harmless
/// duplicate syscall, not an error worth propagating.
pub fn shutdown_both(stream: &TcpStream) {
    let _ = stream.shutdown(std::net::Shutdown::Both);
}
