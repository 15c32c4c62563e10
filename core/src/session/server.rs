//! Server-side connection driver (§4.3): reads packets off an accepted
//! `TcpStream`, resolves the filesystem-touching bits `fsm::server::step`
//! can't (consent, download path, file I/O), and executes whatever the FSM
//! hands back.

use std::fs::File;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;

use log::{debug, info, warn};

use crate::error::{GlError, ProtocolError, Result};
use crate::events::{ConnectionRequest, ServerCallbacks, ServerEvent};
use crate::filebundle::{resolve_download_path, FileBundle};
use crate::fsm::server::{expected_opcodes, step, Input, State};
use crate::packet::Packet;
use crate::socket;

/// Drive one accepted connection to completion (a terminal FSM state or an
/// I/O error), then shut the socket down and emit the closed event. Per §5,
/// a server instance handles at most one connection at a time — this
/// function blocks the calling (accept-loop) thread for the session's
/// duration.
pub fn serve_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    downloads_dir: &Path,
    local_max_packet: u16,
    callbacks: &ServerCallbacks,
) -> Result<()> {
    callbacks.emit(ServerEvent::Accepted { peer_addr });

    let outcome = drive(&mut stream, peer_addr, downloads_dir, local_max_packet, callbacks);

    socket::shutdown_both(&stream);
    callbacks.emit(ServerEvent::Closed { peer_addr });
    outcome
}

fn drive(
    stream: &mut TcpStream,
    peer_addr: SocketAddr,
    downloads_dir: &Path,
    local_max_packet: u16,
    callbacks: &ServerCallbacks,
) -> Result<()> {
    let mut state = State::Created;
    let mut file: Option<File> = None;

    while !state.is_terminal() {
        let expected = expected_opcodes(&state);
        let packet = match Packet::decode(stream, expected) {
            Ok(p) => p,
            Err(ProtocolError::ShortRead { .. }) => {
                debug!("connection from {} closed before a final packet", peer_addr);
                let (new_state, out) = step(state, Input::ClosedBeforeFinal);
                state = new_state;
                for event in out.events {
                    callbacks.emit(event);
                }
                break;
            }
            Err(ProtocolError::UnexpectedOpcode { opcode }) => {
                // §4.3: drop the rogue packet, stay put, keep looping.
                warn!(
                    "opcode 0x{:02x} not legal in current state from {}, dropping",
                    opcode, peer_addr
                );
                continue;
            }
            Err(e) => return Err(GlError::Protocol(e)),
        };

        state = match state {
            State::Created => {
                let filename = packet.name().unwrap_or_default();
                let size = packet.length().unwrap_or(0);
                let hostname = packet.hostname().unwrap_or_default();
                let request = ConnectionRequest {
                    peer_name: hostname,
                    peer_addr,
                    filename,
                    size,
                };
                let consent = callbacks.decide(&request);
                let negotiated_max = local_max_packet.min(
                    packet
                        .max_packet_param()
                        .unwrap_or(local_max_packet),
                );
                let (new_state, out) = step(
                    State::Created,
                    Input::Connect {
                        packet: &packet,
                        consent,
                        negotiated_max,
                    },
                );
                write_packets(stream, &out.packets)?;
                for event in out.events {
                    callbacks.emit(event);
                }
                new_state
            }
            State::RecvFiles(ref recv_state) => {
                let resolved_bundle = if recv_state.bundle.is_none() {
                    let name = packet.name().unwrap_or_else(|| "download".to_string());
                    let size = packet.length().unwrap_or(0);
                    let dest = resolve_download_path(downloads_dir, &name);
                    let created = File::create(&dest)
                        .map_err(|e| GlError::io(format!("creating {}", dest.display()), e))?;
                    file = Some(created);
                    Some(FileBundle::from_incoming(name, size, dest))
                } else {
                    None
                };

                if let Some(body) = &packet.body {
                    if let Some(f) = file.as_mut() {
                        f.write_all(&body.data)
                            .map_err(|e| GlError::io("writing download chunk", e))?;
                    }
                }

                let (new_state, out) = step(
                    State::RecvFiles(recv_state.clone()),
                    Input::Put {
                        packet: &packet,
                        resolved_bundle,
                    },
                );
                write_packets(stream, &out.packets)?;
                for event in out.events {
                    callbacks.emit(event);
                }
                new_state
            }
            other => other,
        };
    }

    info!("connection from {} finished in state {:?}", peer_addr, state);
    Ok(())
}

fn write_packets(stream: &mut TcpStream, packets: &[Packet]) -> Result<()> {
    for packet in packets {
        let bytes = packet.encode();
        stream
            .write_all(&bytes)
            .map_err(|e| GlError::io("writing reply packet", e))?;
    }
    Ok(())
}
