//! Error taxonomy for the GroundLift engine.
//!
//! Every fallible engine operation returns [`GlError`]. The variants mirror
//! the kinds from the error-handling design: socket failures, malformed-wire
//! protocol errors, file I/O failures, and thread create/join failures. The
//! non-error signal path (timeout, graceful close, local shutdown) isn't a
//! `GlError` variant at all — driver loops distinguish "nothing went wrong,
//! we just stopped" by matching `ProtocolError::ShortRead` themselves rather
//! than by any error kind here.
//!
//! `#[source]`/`#[from]` on every variant give `GlError` a proper
//! `std::error::Error::source()` chain on their own; the report-chain
//! requirement this satisfies is walked outermost-first by `groundlift-cli`
//! via `anyhow`'s `{:#}` formatting rather than by a bespoke wrapper type
//! here.

use std::io;

/// A single GroundLift error, carrying enough context to be chained.
#[derive(Debug, thiserror::Error)]
pub enum GlError {
    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("i/o error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("thread error: {0}")]
    Thread(String),
}

impl GlError {
    pub fn socket(source: io::Error) -> Self {
        GlError::Socket(source)
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        GlError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Malformed-packet / disallowed-opcode / body-overflow failures, produced
/// by the codec and the state machines.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("opcode 0x{opcode:02x} not permitted in current state/expected set")]
    UnexpectedOpcode { opcode: u8 },

    #[error("declared body length {declared} exceeded by {actual} bytes received")]
    BodyOverflow { declared: u64, actual: u64 },

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("invalid header encoding bits for identifier 0x{0:02x}")]
    InvalidHeaderEncoding(u8),
}

pub type Result<T> = std::result::Result<T, GlError>;
