//! Client handle (§3.6): {client socket, send thread, one mutex, callback
//! table, file bundle}. Tracks the negotiated packet length once the server
//! has accepted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::error;
use parking_lot::Mutex;

use crate::error::{GlError, Result};
use crate::events::ClientCallbacks;
use crate::filebundle::FileBundle;
use crate::session;

/// This client's advertised max-packet capacity for the CONNECT parameter
/// (§4.2, §4.4 step 1).
pub const DEFAULT_MAX_PACKET: u16 = 8192;

/// A single outgoing send. `cancel` shuts down the socket the send thread
/// is blocked on, per §5's "cancel(client) shuts the client socket; the
/// driver observes and exits."
pub struct Client {
    peer_addr: SocketAddr,
    bundle: FileBundle,
    hostname: String,
    preferred_max_packet: u16,
    callbacks: Arc<ClientCallbacks>,
    handle: Mutex<Option<JoinHandle<()>>>,
    active_stream: Mutex<Option<std::net::TcpStream>>,
}

impl Client {
    pub fn new(
        peer_addr: SocketAddr,
        bundle: FileBundle,
        hostname: String,
        callbacks: ClientCallbacks,
    ) -> Self {
        Client {
            peer_addr,
            bundle,
            hostname,
            preferred_max_packet: DEFAULT_MAX_PACKET,
            callbacks: Arc::new(callbacks),
            handle: Mutex::new(None),
            active_stream: Mutex::new(None),
        }
    }

    /// Override the advertised max-packet capacity sent in CONNECT's
    /// parameter (the server still has the final say via the negotiated
    /// minimum).
    pub fn with_max_packet(mut self, max_packet: u16) -> Self {
        self.preferred_max_packet = max_packet;
        self
    }

    /// Spawn the send thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let this = self.clone();
        let handle = thread::Builder::new()
            .name("groundlift-send".into())
            .spawn(move || this.run())
            .map_err(|e| GlError::Thread(e.to_string()))?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn run(self: Arc<Self>) {
        if let Err(e) = session::client::send_file(
            self.peer_addr,
            self.bundle.clone(),
            self.preferred_max_packet,
            &self.hostname,
            &self.callbacks,
            &self.active_stream,
        ) {
            error!("send to {} failed: {}", self.peer_addr, e);
        }
    }

    /// Shut the client socket down, unblocking the send thread's current
    /// `send`/`recv`; the driver observes the shutdown and exits on its own.
    pub fn cancel(&self) {
        if let Some(stream) = self.active_stream.lock().as_ref() {
            crate::socket::shutdown_both(stream);
        }
    }

    /// Join the send thread. Idempotent: a second call finds nothing to
    /// join and returns immediately.
    pub fn join(&self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn free(&self) {
        self.cancel();
        self.join();
    }
}
