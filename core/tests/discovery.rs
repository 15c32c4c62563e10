//! UDP discovery on a single-interface host (§8 scenario S5).

mod support;

use std::sync::atomic::AtomicBool;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use groundlift_core::discovery::{discover_peers, run_responder};
use groundlift_core::events::DiscoveryCallbacks;

#[test]
fn s5_single_interface_discovery_finds_the_responder() {
    // An ephemeral port shared by both sides of this loopback exchange;
    // discovery has no "bind to :0 and report back" hook, so a free port is
    // picked up front and handed to both.
    let port = pick_free_udp_port();

    let running = Arc::new(AtomicBool::new(true));
    let responder_running = running.clone();
    let responder = thread::spawn(move || {
        let _ = run_responder(port, "responder-host", responder_running);
    });

    // Give the responder a moment to bind before the requester broadcasts.
    thread::sleep(Duration::from_millis(100));

    let (tx, rx) = channel();
    let callbacks = DiscoveryCallbacks::default().with_peer_discovered(move |peer| {
        let _ = tx.send(peer.clone());
    });

    discover_peers(port, Duration::from_secs(2), &callbacks).expect("discovery request failed");

    running.store(false, std::sync::atomic::Ordering::SeqCst);
    responder.join().unwrap();

    let mut found = Vec::new();
    while let Ok(peer) = rx.try_recv() {
        found.push(peer);
    }

    assert!(
        found.iter().any(|p| p.hostname == "responder-host"),
        "expected a peer-discovered event for the responder's hostname, got {:?}",
        found
    );
}

fn pick_free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}
