//! Client-side send driver (§4.4): opens a connection, negotiates, then
//! streams a file as chunked PUTs acknowledged by CONTINUE/SUCCESS.

use std::fs::File;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};

use log::{debug, info};
use parking_lot::Mutex;

use crate::constructors;
use crate::error::{GlError, ProtocolError, Result};
use crate::events::{ClientCallbacks, ClientEvent};
use crate::filebundle::FileBundle;
use crate::fsm::client::{expected_opcodes, step, Input, State};
use crate::packet::{max_chunk_len, Packet};
use crate::socket;

/// Send `bundle` to `peer_addr`, blocking the calling thread for the
/// session's duration. `preferred_max_packet` is this client's advertised
/// capacity for the CONNECT parameter; the actually negotiated max comes
/// back from the server's SUCCESS reply.
pub fn send_file(
    peer_addr: SocketAddr,
    bundle: FileBundle,
    preferred_max_packet: u16,
    hostname: &str,
    callbacks: &ClientCallbacks,
    active_stream: &Mutex<Option<TcpStream>>,
) -> Result<()> {
    callbacks.emit(ClientEvent::Started);

    let mut stream = socket::setup_tcp_client(peer_addr)?;
    *active_stream.lock() = Some(
        stream
            .try_clone()
            .map_err(|e| GlError::io("tracking active connection", e))?,
    );

    let outcome = drive(&mut stream, bundle, preferred_max_packet, hostname, callbacks);

    socket::shutdown_both(&stream);
    *active_stream.lock() = None;
    callbacks.emit(ClientEvent::Stopped);
    outcome
}

fn drive(
    stream: &mut TcpStream,
    bundle: FileBundle,
    preferred_max_packet: u16,
    hostname: &str,
    callbacks: &ClientCallbacks,
) -> Result<()> {
    let connect = constructors::connect(&bundle.name, bundle.size, preferred_max_packet, hostname);
    stream
        .write_all(&connect.encode())
        .map_err(|e| GlError::io("sending CONNECT", e))?;

    let mut state = State::AwaitingAccept;

    let reply = match Packet::decode(stream, expected_opcodes(&state)) {
        Ok(p) => p,
        Err(ProtocolError::ShortRead { .. }) => {
            debug!("connection closed before CONNECT was acknowledged");
            let (_, out) = step(state, Input::ClosedBeforeFinal);
            for event in out.events {
                callbacks.emit(event);
            }
            return Ok(());
        }
        Err(e) => return Err(GlError::Protocol(e)),
    };
    let (new_state, out) = step(
        state,
        Input::ConnectReply {
            packet: &reply,
            bundle: bundle.clone(),
        },
    );
    state = new_state;
    for event in out.events {
        callbacks.emit(event);
    }

    if matches!(state, State::Refused) {
        return Ok(());
    }

    let max_packet = match &state {
        State::Sending(ss) => ss.max_packet,
        _ => preferred_max_packet,
    };
    let chunk_len = max_chunk_len(max_packet).max(1);

    let mut source = File::open(&bundle.path).map_err(|e| GlError::io("opening source file", e))?;
    let mut remaining = bundle.size;

    while !state.is_terminal() {
        let to_read = chunk_len.min(remaining as usize);
        let mut chunk = vec![0u8; to_read];
        source
            .read_exact(&mut chunk)
            .map_err(|e| GlError::io("reading source file", e))?;
        remaining -= to_read as u64;
        let is_final = remaining == 0;

        let put = constructors::put(&chunk, is_final);
        stream
            .write_all(&put.encode())
            .map_err(|e| GlError::io("sending PUT", e))?;

        // Record the chunk as sent before reading the ack: this moves
        // `Sending` -> `AwaitingFinalAck` on the last chunk so the
        // subsequent SUCCESS is read with the right expected-opcode set.
        let (new_state, out) = step(
            state,
            Input::Continue {
                next_chunk_len: to_read as u64,
                is_final,
            },
        );
        state = new_state;
        for event in out.events {
            callbacks.emit(event);
        }

        let expected = expected_opcodes(&state);
        let ack = match Packet::decode(stream, expected) {
            Ok(p) => p,
            Err(ProtocolError::ShortRead { .. }) => {
                debug!("connection closed before the transfer's final acknowledgement");
                let (new_state, out) = step(state, Input::ClosedBeforeFinal);
                state = new_state;
                for event in out.events {
                    callbacks.emit(event);
                }
                break;
            }
            Err(e) => return Err(GlError::Protocol(e)),
        };
        let _ = ack;

        if is_final {
            let (new_state, out) = step(state, Input::FinalAck);
            state = new_state;
            for event in out.events {
                callbacks.emit(event);
            }
        }
    }

    if let State::Done = state {
        callbacks.emit(ClientEvent::Succeeded { bundle });
    }

    info!("send to {} finished", stream.peer_addr().map(|a| a.to_string()).unwrap_or_default());
    Ok(())
}
