//! End-to-end send/receive scenarios over real loopback TCP (§8 scenarios
//! S1-S4, properties 5 and 7).

mod support;

use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use groundlift_core::events::{ClientEvent, Consent, ServerEvent};
use groundlift_core::{Client, FileBundle};

#[test]
fn s1_small_file_accepted_and_transferred_byte_exact() {
    let downloads = tempfile::tempdir().unwrap();
    let (server, addr, server_rx) = support::spawn_server(downloads.path().to_path_buf(), Consent::Accept);

    let source_dir = tempfile::tempdir().unwrap();
    let source_path = source_dir.path().join("hello.txt");
    std::fs::write(&source_path, b"Hello, world!").unwrap();
    let bundle = FileBundle::from_local(&source_path).unwrap();
    assert_eq!(bundle.size, 13);

    let (client_callbacks, client_rx) = support::client_callbacks();
    let client = Arc::new(Client::new(addr, bundle, "test-client".to_string(), client_callbacks));
    client.start().unwrap();

    let succeeded = support::wait_for_client_event(&client_rx, Duration::from_secs(5), |e| {
        matches!(e, ClientEvent::Succeeded { .. })
    });
    assert!(succeeded.is_some(), "client never reported success");

    let downloaded = support::wait_for_server_event(&server_rx, Duration::from_secs(5), |e| {
        matches!(e, ServerEvent::DownloadSucceeded { .. })
    });
    let bundle = match downloaded {
        Some(ServerEvent::DownloadSucceeded { bundle }) => bundle,
        _ => panic!("server never reported a completed download"),
    };

    let contents = std::fs::read(&bundle.path).unwrap();
    assert_eq!(contents, b"Hello, world!");
    assert_eq!(bundle.name, "hello.txt");

    client.join();
    server.stop();
}

#[test]
fn s2_refused_consent_creates_no_file() {
    let downloads = tempfile::tempdir().unwrap();
    let (server, addr, server_rx) = support::spawn_server(downloads.path().to_path_buf(), Consent::Refuse);

    let source_dir = tempfile::tempdir().unwrap();
    let source_path = source_dir.path().join("hello.txt");
    std::fs::write(&source_path, b"Hello, world!").unwrap();
    let bundle = FileBundle::from_local(&source_path).unwrap();

    let (client_callbacks, client_rx) = support::client_callbacks();
    let client = Arc::new(Client::new(addr, bundle, "test-client".to_string(), client_callbacks));
    client.start().unwrap();

    let refused = support::wait_for_client_event(&client_rx, Duration::from_secs(5), |e| {
        matches!(e, ClientEvent::ConnectionRefused)
    });
    assert!(refused.is_some(), "client never reported refusal");

    // No DownloadSucceeded should ever arrive.
    let spurious = support::wait_for_server_event(&server_rx, Duration::from_millis(300), |e| {
        matches!(e, ServerEvent::DownloadSucceeded { .. })
    });
    assert!(spurious.is_none());

    let entries: Vec<_> = std::fs::read_dir(downloads.path()).unwrap().collect();
    assert!(entries.is_empty(), "refused transfer must not create a file");

    client.join();
    server.stop();
}

#[test]
fn s3_large_file_chunked_transfer_is_byte_exact() {
    let downloads = tempfile::tempdir().unwrap();
    let (server, addr, server_rx) = support::spawn_server(downloads.path().to_path_buf(), Consent::Accept);

    let source_dir = tempfile::tempdir().unwrap();
    let source_path = source_dir.path().join("big.bin");
    let size: usize = 3 * 1024 * 1024;
    {
        let mut f = File::create(&source_path).unwrap();
        let pattern: Vec<u8> = (0..256).map(|i| i as u8).collect();
        let mut written = 0;
        while written < size {
            let take = pattern.len().min(size - written);
            f.write_all(&pattern[..take]).unwrap();
            written += take;
        }
    }
    let bundle = FileBundle::from_local(&source_path).unwrap();
    assert_eq!(bundle.size as usize, size);

    let (client_callbacks, client_rx) = support::client_callbacks();
    let client = Arc::new(
        Client::new(addr, bundle, "test-client".to_string(), client_callbacks).with_max_packet(4096),
    );
    client.start().unwrap();

    let succeeded = support::wait_for_client_event(&client_rx, Duration::from_secs(30), |e| {
        matches!(e, ClientEvent::Succeeded { .. })
    });
    assert!(succeeded.is_some());

    let downloaded = support::wait_for_server_event(&server_rx, Duration::from_secs(30), |e| {
        matches!(e, ServerEvent::DownloadSucceeded { .. })
    });
    let bundle = match downloaded {
        Some(ServerEvent::DownloadSucceeded { bundle }) => bundle,
        _ => panic!("server never reported a completed download"),
    };

    let original = std::fs::read(&source_path).unwrap();
    let received = std::fs::read(&bundle.path).unwrap();
    assert_eq!(received.len(), original.len());
    assert_eq!(received, original);

    client.join();
    server.stop();
}

#[test]
fn s4_mid_transfer_cancel_leaves_partial_file_and_joins_promptly() {
    let downloads = tempfile::tempdir().unwrap();
    let (server, addr, _server_rx) = support::spawn_server(downloads.path().to_path_buf(), Consent::Accept);

    let source_dir = tempfile::tempdir().unwrap();
    let source_path = source_dir.path().join("big.bin");
    let size: usize = 3 * 1024 * 1024;
    std::fs::write(&source_path, vec![0xABu8; size]).unwrap();
    let bundle = FileBundle::from_local(&source_path).unwrap();

    let (client_callbacks, client_rx) = support::client_callbacks();
    let client = Arc::new(
        Client::new(addr, bundle, "test-client".to_string(), client_callbacks).with_max_packet(4096),
    );
    client.start().unwrap();

    // Let roughly 1 MiB go out, then cancel (§8 S4).
    let mut sent_at_least_one_mib = false;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if let Ok(ClientEvent::Progress { sent, .. }) = client_rx.recv_timeout(Duration::from_millis(200)) {
            if sent >= 1024 * 1024 {
                sent_at_least_one_mib = true;
                break;
            }
        }
    }
    assert!(sent_at_least_one_mib, "never observed 1 MiB of progress before cancelling");

    client.cancel();

    // §4.4/§7: the driver must observe the shutdown itself and tell the
    // front-end the transfer didn't complete, not just go quiet.
    let cancelled = support::wait_for_client_event(&client_rx, Duration::from_secs(5), |e| {
        matches!(e, ClientEvent::Failed { .. })
    });
    assert!(
        cancelled.is_some(),
        "client never emitted an event for the cancelled transfer"
    );

    // §8 property 7: the worker thread joins within a bounded time.
    let join_start = std::time::Instant::now();
    client.join();
    assert!(join_start.elapsed() < Duration::from_secs(5));

    server.stop();
}
