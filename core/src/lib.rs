//! GroundLift: a LAN peer-to-peer file-transfer engine modelled after
//! AirDrop. This crate is the core engine every front-end embeds: the
//! GroundLift-OBEX wire protocol (`packet`, `header`), the per-connection
//! state machines (`fsm`), the session drivers that turn those state
//! machines into real socket/file I/O (`session`), UDP discovery
//! (`discovery`), and the server/client handles that tie it all together
//! under an explicit start/stop lifecycle (`server`, `client`).
//!
//! GUI windows, CLI argument parsing, and download-directory configuration
//! are deliberately not this crate's concern — see `groundlift-cli` for a
//! reference front-end.

pub mod client;
pub mod constructors;
pub mod discovery;
pub mod error;
pub mod events;
pub mod filebundle;
pub mod fsm;
pub mod header;
pub mod lifecycle;
pub mod packet;
pub mod server;
pub mod session;
pub mod socket;

pub use client::Client;
pub use discovery::DEFAULT_PORT;
pub use error::{GlError, Result};
pub use events::{
    ClientCallbacks, ClientEvent, Consent, ConnectionRequest, DiscoveredPeer, DiscoveryCallbacks,
    ServerCallbacks, ServerEvent,
};
pub use filebundle::FileBundle;
pub use server::Server;
