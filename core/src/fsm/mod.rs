//! Pure protocol state machines (§9's redesign note): `(state, input) ->
//! (state, outgoing packets, events)`, with zero I/O. The session drivers in
//! [`crate::session`] own the actual socket/file I/O and call these
//! functions to decide what to do next. This split is what makes the FSMs
//! directly unit- and fuzz-testable without a live socket (§8 property 4,
//! scenario S6).

pub mod client;
pub mod server;
