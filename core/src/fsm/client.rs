//! Client-side send FSM (§4.4), symmetric to [`crate::fsm::server`]: pure
//! `(state, input) -> (state, packets, events)`, zero I/O.

use crate::events::ClientEvent;
use crate::filebundle::FileBundle;
use crate::packet::{Opcode, Packet};

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    /// CONNECT sent, awaiting SUCCESS/UNAUTHORIZED.
    AwaitingAccept,
    /// Accepted; streaming PUT chunks, each non-final chunk awaiting
    /// CONTINUE before the next is sent.
    Sending(SendState),
    /// Final PUT sent, awaiting its SUCCESS.
    AwaitingFinalAck,
    Done,
    Refused,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendState {
    pub bundle: FileBundle,
    pub sent: u64,
    pub max_packet: u16,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Done | State::Refused | State::Cancelled | State::Error
        )
    }
}

pub fn expected_opcodes(state: &State) -> &'static [u8] {
    match state {
        State::AwaitingAccept => &[Opcode::SUCCESS.masked(), Opcode::UNAUTHORIZED.masked()],
        State::Sending(_) => &[Opcode::CONTINUE.masked()],
        State::AwaitingFinalAck => &[Opcode::SUCCESS.masked()],
        State::Done | State::Refused | State::Cancelled | State::Error => &[],
    }
}

#[derive(Debug, Default)]
pub struct StepOutput {
    pub packets: Vec<Packet>,
    pub events: Vec<ClientEvent>,
}

impl StepOutput {
    fn packet(mut self, p: Packet) -> Self {
        self.packets.push(p);
        self
    }
    fn event(mut self, e: ClientEvent) -> Self {
        self.events.push(e);
        self
    }
}

pub enum Input<'a> {
    /// CONNECT's reply arrived: SUCCESS (carrying the negotiated max
    /// packet) or UNAUTHORIZED.
    ConnectReply { packet: &'a Packet, bundle: FileBundle },
    /// CONTINUE arrived for a non-final chunk just sent; `next_chunk` is
    /// `None` only when the driver has no more file bytes to send (the
    /// chunk already queued was the last one — the driver marks it final
    /// instead of routing it through this input).
    Continue { next_chunk_len: u64, is_final: bool },
    /// SUCCESS arrived acknowledging the final PUT.
    FinalAck,
    /// The connection closed or the send was cancelled locally.
    ClosedBeforeFinal,
}

pub fn step(state: State, input: Input<'_>) -> (State, StepOutput) {
    match (state, input) {
        (State::AwaitingAccept, Input::ConnectReply { packet, bundle }) => {
            if packet.opcode.masked() == Opcode::UNAUTHORIZED.masked() {
                return (
                    State::Refused,
                    StepOutput::default().event(ClientEvent::ConnectionRefused),
                );
            }
            let max_packet = packet.max_packet_param().unwrap_or(4096);
            (
                State::Sending(SendState {
                    bundle,
                    sent: 0,
                    max_packet,
                }),
                StepOutput::default().event(ClientEvent::ConnectionAccepted),
            )
        }
        (State::Sending(mut ss), Input::Continue { next_chunk_len, is_final }) => {
            ss.sent += next_chunk_len;
            let out = StepOutput::default().event(ClientEvent::Progress {
                sent: ss.sent,
                total: ss.bundle.size,
            });
            if is_final {
                (State::AwaitingFinalAck, out)
            } else {
                (State::Sending(ss), out)
            }
        }
        (State::AwaitingFinalAck, Input::FinalAck) => (
            State::Done,
            StepOutput::default().event(ClientEvent::Disconnected),
        ),
        (state, Input::ClosedBeforeFinal) if !state.is_terminal() => (
            State::Cancelled,
            StepOutput::default().event(ClientEvent::Failed {
                reason: "connection closed before transfer completed".into(),
            }),
        ),
        (state, _) => (state, StepOutput::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructors;

    fn bundle() -> FileBundle {
        FileBundle {
            path: "/tmp/f.txt".into(),
            name: "f.txt".into(),
            size: 13,
        }
    }

    #[test]
    fn success_reply_transitions_to_sending() {
        let reply = constructors::connect_success(4096, "host-b");
        let (state, out) = step(
            State::AwaitingAccept,
            Input::ConnectReply {
                packet: &reply,
                bundle: bundle(),
            },
        );
        match state {
            State::Sending(ss) => assert_eq!(ss.max_packet, 4096),
            other => panic!("expected Sending, got {:?}", other),
        }
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e, ClientEvent::ConnectionAccepted)));
    }

    #[test]
    fn unauthorized_reply_refuses() {
        let reply = constructors::unauthorized();
        let (state, out) = step(
            State::AwaitingAccept,
            Input::ConnectReply {
                packet: &reply,
                bundle: bundle(),
            },
        );
        assert_eq!(state, State::Refused);
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e, ClientEvent::ConnectionRefused)));
    }

    #[test]
    fn continue_advances_sent_count_until_final() {
        let ss = SendState {
            bundle: bundle(),
            sent: 0,
            max_packet: 4096,
        };
        let (state, _) = step(
            State::Sending(ss),
            Input::Continue {
                next_chunk_len: 7,
                is_final: false,
            },
        );
        let ss = match state {
            State::Sending(ss) => ss,
            other => panic!("expected Sending, got {:?}", other),
        };
        assert_eq!(ss.sent, 7);

        let (state, _) = step(
            State::Sending(ss),
            Input::Continue {
                next_chunk_len: 6,
                is_final: true,
            },
        );
        assert_eq!(state, State::AwaitingFinalAck);
    }

    #[test]
    fn final_ack_completes_send() {
        let (state, out) = step(State::AwaitingFinalAck, Input::FinalAck);
        assert_eq!(state, State::Done);
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e, ClientEvent::Disconnected)));
    }

    #[test]
    fn closed_mid_send_cancels() {
        let ss = SendState {
            bundle: bundle(),
            sent: 5,
            max_packet: 4096,
        };
        let (state, out) = step(State::Sending(ss), Input::ClosedBeforeFinal);
        assert_eq!(state, State::Cancelled);
        assert!(out.events.iter().any(|e| matches!(e, ClientEvent::Failed { .. })));
    }
}
