//! Server-side connection FSM (§3.7, §4.3).
//!
//! `State`'s four named variants come straight from §3.7. §4.3's own prose
//! additionally describes a `DONE` outcome for a connection that finished
//! successfully; rather than leave that outcome unrepresentable (the spec's
//! two sections don't quite agree — see `DESIGN.md`), a `Done` variant is
//! added here as a fifth terminal state, alongside `Cancelled`/`Error`,
//! purely to name the success path. It changes no behavior described in
//! §4.3: a connection in `Done` is just as finished as one in `Cancelled`
//! or `Error`.

use crate::events::{Consent, ServerEvent};
use crate::filebundle::FileBundle;
use crate::packet::{Opcode, Packet};

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Created,
    RecvFiles(RecvState),
    Done,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecvState {
    pub bundle: Option<FileBundle>,
    pub received: u64,
    pub max_packet: u16,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Done | State::Cancelled | State::Error)
    }
}

/// The opcode(s) (Final-masked) legal for the current state — the
/// "opcode-permitted-per-state gate" from §2.3. The driver passes this to
/// [`crate::packet::Packet::decode`]; anything else never reaches `step` at
/// all, it's rejected at the framing layer as `INVALID_STATE_OPCODE`
/// (§4.3's "Opcode not in the expected set").
pub fn expected_opcodes(state: &State) -> &'static [u8] {
    match state {
        State::Created => &[Opcode::CONNECT.masked()],
        State::RecvFiles(_) => &[Opcode::PUT.masked()],
        State::Done | State::Cancelled | State::Error => &[],
    }
}

/// Everything the driver needs to act on after one `step` call.
#[derive(Debug, Default)]
pub struct StepOutput {
    pub packets: Vec<Packet>,
    pub events: Vec<ServerEvent>,
}

impl StepOutput {
    fn packet(mut self, p: Packet) -> Self {
        self.packets.push(p);
        self
    }
    fn event(mut self, e: ServerEvent) -> Self {
        self.events.push(e);
        self
    }
}

pub enum Input<'a> {
    /// A CONNECT packet just decoded in `Created`, plus the consent
    /// decision the driver already obtained by calling the registered
    /// callback (the callback runs between two `step` calls, never inside
    /// one, so `step` itself performs no I/O and calls no user code).
    Connect {
        packet: &'a Packet,
        consent: Consent,
        negotiated_max: u16,
    },
    /// A PUT packet decoded in `RecvFiles`. `resolved_bundle` is `Some` only
    /// for the very first PUT of a session — the driver has already built
    /// it from the packet's NAME/LENGTH headers and the resolved download
    /// path before calling `step`, since that resolution touches the
    /// filesystem and therefore cannot happen inside a pure function.
    Put {
        packet: &'a Packet,
        resolved_bundle: Option<FileBundle>,
    },
    /// The TCP connection closed (EOF/shutdown) before a Final PUT arrived.
    ClosedBeforeFinal,
}

pub fn step(state: State, input: Input<'_>) -> (State, StepOutput) {
    match (state, input) {
        (State::Created, Input::Connect { consent: Consent::Refuse, .. }) => (
            State::Done,
            StepOutput::default().packet(crate::constructors::unauthorized()),
        ),
        (State::Created, Input::Connect { consent: Consent::Accept, negotiated_max, .. }) => (
            State::RecvFiles(RecvState {
                bundle: None,
                received: 0,
                max_packet: negotiated_max,
            }),
            StepOutput::default()
                .packet(crate::constructors::connect_success(negotiated_max, "")),
        ),
        (State::RecvFiles(mut rs), Input::Put { packet, resolved_bundle }) => {
            let bundle = match (&rs.bundle, resolved_bundle) {
                (Some(b), _) => b.clone(),
                (None, Some(b)) => {
                    rs.bundle = Some(b.clone());
                    b
                }
                (None, None) => {
                    // Driver programming error: first PUT must carry a
                    // resolved bundle. Treat as a protocol failure rather
                    // than panicking a worker thread.
                    return (
                        State::Error,
                        StepOutput::default().event(ServerEvent::DownloadFailed {
                            bundle: None,
                            reason: "first PUT arrived without a resolved file bundle".into(),
                        }),
                    );
                }
            };

            let chunk = packet
                .body
                .as_ref()
                .map(|b| b.data.as_slice())
                .unwrap_or(&[]);
            let would_be = rs.received + chunk.len() as u64;

            if would_be > bundle.size {
                return (
                    State::Error,
                    StepOutput::default().event(ServerEvent::DownloadFailed {
                        bundle: Some(bundle),
                        reason: format!(
                            "received {} bytes, exceeding declared length {}",
                            would_be, bundle.size
                        ),
                    }),
                );
            }

            rs.received = would_be;
            let is_final = packet.opcode.is_final();

            if is_final {
                let out = StepOutput::default()
                    .event(ServerEvent::Progress {
                        bundle: bundle.clone(),
                        received: rs.received,
                    })
                    .event(ServerEvent::DownloadSucceeded { bundle })
                    .packet(crate::constructors::success());
                (State::Done, out)
            } else {
                let out = StepOutput::default()
                    .event(ServerEvent::Progress {
                        bundle,
                        received: rs.received,
                    })
                    .packet(crate::constructors::continue_());
                (State::RecvFiles(rs), out)
            }
        }
        (state, Input::ClosedBeforeFinal) if !state.is_terminal() => {
            (State::Cancelled, StepOutput::default())
        }
        (state, _) => (state, StepOutput::default()),
    }
}
