//! Event dispatch (§2.6): a callback table per server/client handle, invoked
//! on the worker thread with a user-supplied argument.
//!
//! Callbacks run on whichever worker thread produced the event. The
//! contract (§5) is that they must be non-blocking and short, and must not
//! call back into the engine synchronously in a way that could deadlock
//! (e.g. calling `Server::stop` from inside a callback) — if a front-end
//! needs that, it should post the request to its own queue instead.

use std::fmt;
use std::sync::Arc;

use crate::filebundle::FileBundle;

/// A connection request awaiting the consent callback's decision (§4.3,
/// CREATED state).
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub peer_name: String,
    pub peer_addr: std::net::SocketAddr,
    pub filename: String,
    pub size: u64,
}

/// Lifecycle / progress events surfaced to the embedding front-end.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Started,
    Stopped,
    Accepted { peer_addr: std::net::SocketAddr },
    Closed { peer_addr: std::net::SocketAddr },
    /// Emitted after each appended chunk while receiving a PUT stream.
    Progress { bundle: FileBundle, received: u64 },
    DownloadSucceeded { bundle: FileBundle },
    DownloadFailed { bundle: Option<FileBundle>, reason: String },
    Cancelled { peer_addr: std::net::SocketAddr },
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Started,
    Stopped,
    ConnectionAccepted,
    ConnectionRefused,
    Progress { sent: u64, total: u64 },
    Succeeded { bundle: FileBundle },
    Disconnected,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    pub id: u64,
    pub os_tag: [u8; 3],
    pub hostname: String,
    pub addr: std::net::SocketAddr,
}

/// Consent decision returned by the connection-request callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Accept,
    Refuse,
}

type ConsentFn = dyn Fn(&ConnectionRequest) -> Consent + Send + Sync;
type ServerEventFn = dyn Fn(&ServerEvent) + Send + Sync;
type ClientEventFn = dyn Fn(&ClientEvent) + Send + Sync;
type PeerFn = dyn Fn(&DiscoveredPeer) + Send + Sync;

/// Callback table for a [`crate::server::Server`].
///
/// Default `consent` accepts every incoming request (§4.3: "if none
/// registered, default = accept").
#[derive(Clone)]
pub struct ServerCallbacks {
    consent: Arc<ConsentFn>,
    event: Arc<ServerEventFn>,
}

impl fmt::Debug for ServerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCallbacks").finish_non_exhaustive()
    }
}

impl Default for ServerCallbacks {
    fn default() -> Self {
        ServerCallbacks {
            consent: Arc::new(|_| Consent::Accept),
            event: Arc::new(|_| {}),
        }
    }
}

impl ServerCallbacks {
    pub fn with_consent(mut self, f: impl Fn(&ConnectionRequest) -> Consent + Send + Sync + 'static) -> Self {
        self.consent = Arc::new(f);
        self
    }

    pub fn with_event(mut self, f: impl Fn(&ServerEvent) + Send + Sync + 'static) -> Self {
        self.event = Arc::new(f);
        self
    }

    pub fn decide(&self, req: &ConnectionRequest) -> Consent {
        (self.consent)(req)
    }

    pub fn emit(&self, event: ServerEvent) {
        (self.event)(&event)
    }
}

#[derive(Clone)]
pub struct ClientCallbacks {
    event: Arc<ClientEventFn>,
}

impl fmt::Debug for ClientCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCallbacks").finish_non_exhaustive()
    }
}

impl Default for ClientCallbacks {
    fn default() -> Self {
        ClientCallbacks {
            event: Arc::new(|_| {}),
        }
    }
}

impl ClientCallbacks {
    pub fn with_event(mut self, f: impl Fn(&ClientEvent) + Send + Sync + 'static) -> Self {
        self.event = Arc::new(f);
        self
    }

    pub fn emit(&self, event: ClientEvent) {
        (self.event)(&event)
    }
}

#[derive(Clone)]
pub struct DiscoveryCallbacks {
    peer_discovered: Arc<PeerFn>,
}

impl fmt::Debug for DiscoveryCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryCallbacks").finish_non_exhaustive()
    }
}

impl Default for DiscoveryCallbacks {
    fn default() -> Self {
        DiscoveryCallbacks {
            peer_discovered: Arc::new(|_| {}),
        }
    }
}

impl DiscoveryCallbacks {
    pub fn with_peer_discovered(mut self, f: impl Fn(&DiscoveredPeer) + Send + Sync + 'static) -> Self {
        self.peer_discovered = Arc::new(f);
        self
    }

    pub fn emit(&self, peer: DiscoveredPeer) {
        (self.peer_discovered)(&peer)
    }
}
