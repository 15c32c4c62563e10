//! Server handle (§3.5): owns the TCP server socket, the UDP discovery
//! socket, the main-accept and discovery threads, and the callback table.
//! Lifecycle: `new -> setup -> start -> discovery_start -> join... -> free`,
//! matching §9's "replace global mutable state with a server-handle value".

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};
use parking_lot::Mutex;

use crate::discovery;
use crate::error::{GlError, Result};
use crate::events::{ServerCallbacks, ServerEvent};
use crate::lifecycle::Lifecycle;
use crate::session;
use crate::socket;

/// Default negotiable maximum packet size this engine advertises (§6.1:
/// "implementation chooses; ≤ 64 KiB since the length field is 16-bit").
pub const DEFAULT_MAX_PACKET: u16 = 8192;

/// A process-lifetime identifier for this server instance (§3, §9's Open
/// Questions: the wire format carries no id field, so this is never sent —
/// it exists purely so an embedding front-end has something stable to key
/// its own UI state on across a run).
pub fn mint_peer_id() -> u64 {
    rand::random()
}

/// The server's accepted-but-not-yet-consumed configuration and runtime
/// state. `start`/`discovery_start` spawn worker threads; `stop`/`free`
/// tear them down idempotently (§8 property 6).
pub struct Server {
    bind_addr: SocketAddr,
    downloads_dir: PathBuf,
    hostname: String,
    max_packet: u16,
    discovery_port: u16,
    callbacks: Arc<ServerCallbacks>,
    lifecycle: Mutex<Lifecycle>,
    /// Cloned out of `lifecycle` once at construction so `accept_loop` can
    /// poll it directly instead of re-locking `lifecycle` every iteration —
    /// `stop` holds that lock for the whole of `stop_and_join`, including
    /// the thread joins, so a loop that needed the same lock just to check
    /// "should I keep going" could never observe the stop signal (the
    /// joiner waits on the loop, the loop waits on the lock the joiner
    /// holds).
    running: std::sync::Arc<std::sync::atomic::AtomicBool>,
    /// `None` until `setup` runs; guarded so `stop` can shut it down from
    /// another thread while the accept thread blocks in `accept`.
    listener: Mutex<Option<std::net::TcpListener>>,
    /// A clone of whichever connection is currently being serviced, so
    /// `stop` can shut it down from another thread while the accept thread
    /// blocks inside `serve_connection`'s `recv` (§5's "one mutex guards
    /// the active connection").
    active_stream: Mutex<Option<std::net::TcpStream>>,
}

impl Server {
    pub fn new(
        bind_addr: SocketAddr,
        downloads_dir: PathBuf,
        hostname: String,
        callbacks: ServerCallbacks,
    ) -> Self {
        let lifecycle = Lifecycle::new();
        let running = lifecycle.running_flag();
        Server {
            bind_addr,
            downloads_dir,
            hostname,
            max_packet: DEFAULT_MAX_PACKET,
            discovery_port: discovery::DEFAULT_PORT,
            callbacks: Arc::new(callbacks),
            lifecycle: Mutex::new(lifecycle),
            running,
            listener: Mutex::new(None),
            active_stream: Mutex::new(None),
        }
    }

    /// Override the negotiable maximum packet size this server advertises
    /// (the actually negotiated max is `min(this, the client's offer)`).
    pub fn with_max_packet(mut self, max_packet: u16) -> Self {
        self.max_packet = max_packet;
        self
    }

    /// The address actually bound by `setup` — useful when `bind_addr` was
    /// given with an ephemeral port (`:0`) and the caller needs to learn
    /// which port the OS picked.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Bind (but do not yet accept on) the TCP server socket.
    pub fn setup(&self) -> Result<()> {
        let listener = socket::setup_tcp_server(self.bind_addr, 1)?;
        // Non-blocking so the accept loop can poll the running flag instead
        // of parking in `accept` with the listener mutex held across the
        // call (§5: mutexes must never be held across a blocking socket
        // call except one interruptible by shutdown from another thread).
        listener
            .set_nonblocking(true)
            .map_err(GlError::socket)?;
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    /// Spawn the main accept loop. One connection is serviced fully before
    /// the next is accepted (§5).
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let this = self.clone();
        let handle = thread::Builder::new()
            .name("groundlift-accept".into())
            .spawn(move || this.accept_loop())
            .map_err(|e| GlError::Thread(e.to_string()))?;
        self.lifecycle.lock().push(handle);
        self.callbacks.emit(ServerEvent::Started);
        Ok(())
    }

    /// Spawn the UDP discovery responder loop.
    pub fn discovery_start(self: &Arc<Self>) -> Result<()> {
        let port = self.discovery_port;
        let hostname = self.hostname.clone();
        let running_for_thread = self.running.clone();
        let handle = thread::Builder::new()
            .name("groundlift-discovery".into())
            .spawn(move || {
                if let Err(e) = discovery::run_responder(port, &hostname, running_for_thread) {
                    error!("discovery responder exited with error: {}", e);
                }
            })
            .map_err(|e| GlError::Thread(e.to_string()))?;
        self.lifecycle.lock().push(handle);
        Ok(())
    }

    fn accept_loop(self: Arc<Self>) {
        loop {
            if !crate::lifecycle::still_running(&self.running) {
                return;
            }

            let accept_result = {
                let listener_guard = self.listener.lock();
                match listener_guard.as_ref() {
                    Some(l) => l.accept(),
                    None => return,
                }
            };

            match accept_result {
                Ok((stream, peer_addr)) => {
                    info!("accepted connection from {}", peer_addr);
                    match stream.try_clone() {
                        Ok(tracked) => *self.active_stream.lock() = Some(tracked),
                        Err(e) => error!("failed to track active connection: {}", e),
                    }
                    if let Err(e) = session::server::serve_connection(
                        stream,
                        peer_addr,
                        &self.downloads_dir,
                        self.max_packet,
                        &self.callbacks,
                    ) {
                        error!("connection from {} ended with error: {}", peer_addr, e);
                    }
                    *self.active_stream.lock() = None;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    /// Stop accepting new connections, join both worker threads, and close
    /// the listener. Idempotent (§8 property 6).
    pub fn stop(&self) {
        *self.listener.lock() = None;
        if let Some(stream) = self.active_stream.lock().as_ref() {
            socket::shutdown_both(stream);
        }
        self.lifecycle.lock().stop_and_join();
        self.callbacks.emit(ServerEvent::Stopped);
    }

    /// Alias for `stop`: freeing a handle that was never started, or
    /// freeing one twice, is a harmless no-op (§5: "double-close and
    /// double-free must be safe").
    pub fn free(&self) {
        self.stop();
    }
}
