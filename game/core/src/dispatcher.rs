//! Opcode -> handler table (§4.13/Design Notes "Variant/opcode dispatch"). Runs on the IO
//! worker that owns the connection: decodes the payload, enforces the client/server direction
//! discipline, and either answers locally (ping/pong, heartbeat, disconnect) or posts an
//! `Action` closure to the game thread for anything that touches `World`/`PlayerRegistry`.

use flux::logging::{warn, Logger};
use neutronium::action::ActionQueue;
use neutronium::net::Connection;
use neutronium::wire::codec::Reader;
use neutronium::wire::opcode::{Direction, Opcode};
use neutronium::wire::packet;
use neutronium::world::{PlayerRegistry, World};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::effects::{Effect, EffectSink};
use crate::movement::{authorize_move, authorize_turn, MoveError};
use crate::GameSettings;

#[derive(Debug, Eq, PartialEq)]
pub enum ProtocolError {
    WrongDirection(u8),
    PayloadUnderflow,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::WrongDirection(op) => write!(f, "opcode {:#04x} arrived from the wrong direction", op),
            ProtocolError::PayloadUnderflow => write!(f, "payload too short for its opcode"),
        }
    }
}

impl Error for ProtocolError {}

/// Dispatches one already-framed payload (opcode byte included) from a `Live` connection.
/// `queue` receives any action that needs game-thread state; `corrections` collects any
/// facing/position resync that a rejected action needs to send back to this specific client
/// (see `corrections` module doc). This function itself never touches `World`/`PlayerRegistry`.
pub fn dispatch_live(
    conn: &Arc<Connection>,
    payload: &[u8],
    queue: &ActionQueue,
    corrections: &Arc<EffectSink>,
    settings: &GameSettings,
    logger: &Logger,
) -> Result<(), ProtocolError> {
    let mut reader = Reader::new(payload);
    let opcode_byte = reader.u8().map_err(|_| ProtocolError::PayloadUnderflow)?;
    let opcode = Opcode::from_u8(opcode_byte);

    if let Some(Direction::ServerToClient) = opcode.direction() {
        return Err(ProtocolError::WrongDirection(opcode_byte));
    }

    match opcode {
        Opcode::MoveRequest => {
            let req = packet::decode_move_request(&mut reader).map_err(|_| ProtocolError::PayloadUnderflow)?;
            let conn_id = conn.id;
            let move_cooldown = settings.move_cooldown;
            let corrections = corrections.clone();
            queue.push(Box::new(move |world: &mut World, registry: &mut PlayerRegistry| {
                apply_move(world, registry, &corrections, conn_id, req.direction, req.facing, move_cooldown);
            }));
        }
        Opcode::TurnRequest => {
            let direction = packet::decode_turn_request(&mut reader).map_err(|_| ProtocolError::PayloadUnderflow)?;
            let conn_id = conn.id;
            let turn_cooldown = settings.turn_cooldown;
            queue.push(Box::new(move |_world: &mut World, registry: &mut PlayerRegistry| {
                if let Some(pid) = registry.player_id_for_connection(conn_id) {
                    if let Some(player) = registry.get_mut(pid) {
                        if authorize_turn(player, direction, Instant::now(), turn_cooldown).is_ok() {
                            registry.mark_dirty(pid);
                        }
                    }
                }
            }));
        }
        Opcode::ClientPingRequest => {
            let ts = packet::decode_timestamp(&mut reader).map_err(|_| ProtocolError::PayloadUnderflow)?;
            conn.enqueue(packet::server_pong_response(ts));
        }
        Opcode::ClientPongResponse => {
            let ts = packet::decode_timestamp(&mut reader).map_err(|_| ProtocolError::PayloadUnderflow)?;
            conn.record_pong(ts);
        }
        Opcode::HeartbeatRequest => {
            conn.enqueue(packet::heartbeat_response());
        }
        Opcode::DisconnectRequest => {
            conn.enqueue(packet::disconnect_acknowledged());
            if conn.begin_disconnect() {
                conn.close_socket();
                corrections.push(conn.id, Effect::Departed { reason: None });
            }
        }
        Opcode::Reserved(op) => {
            warn!(logger, "dispatch no-op for reserved opcode"; "opcode" => op, "connection_id" => conn.id.get());
        }
        _ => {
            // Every remaining client->server opcode is HandshakeRequest, which only ever
            // arrives pre-Live and is handled by the handshake path, not here.
        }
    }

    Ok(())
}

/// Runs `authorize_move` against the live player owned by `conn_id`. `WrongFacing` and `Blocked`
/// each resync the client with a correction packet (`Facing_Correction` / `Position_Correction`);
/// `InvalidDirection` and `OnCooldown` are silent per §7.
fn apply_move(
    world: &mut World,
    registry: &mut PlayerRegistry,
    corrections: &EffectSink,
    conn_id: neutronium::identity::ConnectionId,
    direction: u8,
    client_facing: u8,
    move_cooldown: std::time::Duration,
) {
    let Some(pid) = registry.player_id_for_connection(conn_id) else { return };
    let Some(player) = registry.get_mut(pid) else { return };

    match authorize_move(player, direction, client_facing, world, Instant::now(), move_cooldown) {
        Ok(()) => {
            let (x, y) = (player.x, player.y);
            world.update_player_position(pid, x, y);
            registry.mark_dirty(pid);
        }
        Err(MoveError::WrongFacing) => {
            corrections.push(conn_id, Effect::FacingCorrection(player.facing.as_u8()));
        }
        Err(MoveError::Blocked) => {
            corrections.push(
                conn_id,
                Effect::PositionCorrection {
                    x: player.x,
                    y: player.y,
                    facing: player.facing.as_u8(),
                },
            );
        }
        Err(MoveError::InvalidDirection) | Err(MoveError::OnCooldown) => {}
    }
}
