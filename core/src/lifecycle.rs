//! Shared join/idempotent-stop/idempotent-free bookkeeping (§5) used by both
//! [`crate::server::Server`] and [`crate::client::Client`].
//!
//! A handle's worker threads poll `running` every socket-timeout tick
//! (§4.6, §9's "shutdown that unblocks accept/recv"). `stop`/`cancel`
//! clears the flag and joins; calling it twice is a no-op the second time,
//! matching §8 property 6.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A shared running-flag plus the set of worker threads it gates.
pub struct Lifecycle {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle {
            running: Arc::new(AtomicBool::new(true)),
            handles: Vec::new(),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag and join every registered thread. Safe to
    /// call more than once: the second call finds `handles` already empty
    /// and `running` already false, and does nothing.
    pub fn stop_and_join(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll-friendly check used inside accept/recv-timeout loops.
pub fn still_running(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}
