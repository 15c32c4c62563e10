//! Shared loopback-harness helpers for the integration tests (§8 properties
//! 5-7 and scenarios S1-S6), following the corpus's own loopback
//! bind/accept/connect test shape.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::time::Duration;

use groundlift_core::events::{ClientCallbacks, ClientEvent, Consent, ServerCallbacks, ServerEvent};
use groundlift_core::Server;

pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
}

/// Bring up a server bound to an ephemeral loopback port, returning the
/// handle, its actual address, and a receiver draining every `ServerEvent`
/// it emits.
pub fn spawn_server(
    downloads_dir: std::path::PathBuf,
    consent: Consent,
) -> (Arc<Server>, SocketAddr, Receiver<ServerEvent>) {
    let (tx, rx) = channel();
    let callbacks = ServerCallbacks::default()
        .with_consent(move |_req| consent)
        .with_event(move |event| {
            let _ = tx.send(event.clone());
        });

    let server = Arc::new(Server::new(
        loopback(0),
        downloads_dir,
        "test-server".to_string(),
        callbacks,
    ));
    server.setup().expect("server setup");
    let addr = server.local_addr().expect("bound address");
    server.start().expect("server start");
    (server, addr, rx)
}

/// Drain a client event channel, blocking up to `timeout` for each recv.
pub fn client_callbacks() -> (ClientCallbacks, Receiver<ClientEvent>) {
    let (tx, rx) = channel();
    let callbacks = ClientCallbacks::default().with_event(move |event| {
        let _ = tx.send(event.clone());
    });
    (callbacks, rx)
}

pub fn wait_for_server_event(
    rx: &Receiver<ServerEvent>,
    timeout: Duration,
    mut matches: impl FnMut(&ServerEvent) -> bool,
) -> Option<ServerEvent> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match rx.recv_timeout(remaining) {
            Ok(event) if matches(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

pub fn wait_for_client_event(
    rx: &Receiver<ClientEvent>,
    timeout: Duration,
    mut matches: impl FnMut(&ClientEvent) -> bool,
) -> Option<ClientEvent> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match rx.recv_timeout(remaining) {
            Ok(event) if matches(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}
