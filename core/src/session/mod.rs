//! Session drivers: the thin I/O layer around the pure FSMs in
//! [`crate::fsm`]. Each driver owns the socket and (for the receive side)
//! the destination file; it decodes one packet, resolves whatever
//! filesystem state the FSM needs as input, calls `step`, then executes the
//! FSM's output (write response packets, emit events).

pub mod client;
pub mod server;
