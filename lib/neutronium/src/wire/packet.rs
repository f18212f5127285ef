//! Typed packet builders (server → client) and decoders (client → server) on top of the raw
//! `Writer`/`Reader` cursors. Each function here is the single place that knows one opcode's
//! field layout, so the payload-size table and the dispatcher can't drift apart.

use super::codec::{CodecResult, Reader, Writer};
use super::opcode::Opcode;

/// Maximum number of player snapshots in one `BatchPlayerSpatial` packet; `count` is a u8 on
/// the wire.
pub const MAX_BATCH_ENTRIES: usize = 255;

/// One player's position/facing snapshot as carried in a `BatchPlayerSpatial` packet.
#[derive(Debug, Clone, Copy)]
pub struct PlayerSnapshot {
    pub player_id: u64,
    pub x: u16,
    pub y: u16,
    pub facing: u8,
}

pub fn handshake_accepted(server_version: u16, server_magic: u32) -> Vec<u8> {
    Writer::new(Opcode::HANDSHAKE_ACCEPTED)
        .u16(server_version)
        .u32(server_magic)
        .finish_frame()
}

pub fn handshake_rejected(reason_code: u8, reason: &str) -> Vec<u8> {
    Writer::new(Opcode::HANDSHAKE_REJECTED)
        .u8(reason_code)
        .string_short(reason)
        .finish_frame()
}

pub fn welcome(player_id: u32, x: u16, y: u16, facing: u8) -> Vec<u8> {
    Writer::new(Opcode::WELCOME)
        .u32(player_id)
        .u16(x)
        .u16(y)
        .u8(facing)
        .finish_frame()
}

pub fn position_correction(x: u16, y: u16, facing: u8) -> Vec<u8> {
    Writer::new(Opcode::POSITION_CORRECTION)
        .u16(x)
        .u16(y)
        .u8(facing)
        .finish_frame()
}

pub fn facing_correction(facing: u8) -> Vec<u8> {
    Writer::new(Opcode::FACING_CORRECTION).u8(facing).finish_frame()
}

/// Splits `entries` into one or more `BatchPlayerSpatial` packets of at most
/// `MAX_BATCH_ENTRIES` snapshots each. Returns an empty vec for an empty slice — callers
/// should not enqueue anything for a viewer with nothing dirty this tick.
pub fn batch_player_spatial(entries: &[PlayerSnapshot]) -> Vec<Vec<u8>> {
    entries
        .chunks(MAX_BATCH_ENTRIES)
        .map(|chunk| {
            let mut w = Writer::new(Opcode::BATCH_PLAYER_SPATIAL);
            w.u8(chunk.len() as u8);
            for snap in chunk {
                w.u64(snap.player_id).u16(snap.x).u16(snap.y).u8(snap.facing);
            }
            w.finish_frame()
        })
        .collect()
}

pub fn left_game(player_id: u32) -> Vec<u8> {
    Writer::new(Opcode::LEFT_GAME).u32(player_id).finish_frame()
}

/// Server-initiated ping, opcode `0xF8`.
pub fn server_ping_request(ts: u32) -> Vec<u8> {
    Writer::new(Opcode::SERVER_PING_REQUEST).u32(ts).finish_frame()
}

/// Reply to a client-initiated ping (`0xF6`), opcode `0xF7`.
pub fn server_pong_response(ts: u32) -> Vec<u8> {
    Writer::new(Opcode::SERVER_PONG_RESPONSE).u32(ts).finish_frame()
}

pub fn heartbeat_response() -> Vec<u8> {
    Writer::new(Opcode::HEARTBEAT_RESPONSE).finish_frame()
}

pub fn disconnect_acknowledged() -> Vec<u8> {
    Writer::new(Opcode::DISCONNECT_ACKNOWLEDGED).finish_frame()
}

pub fn kick_notification(reason: &str) -> Vec<u8> {
    Writer::new(Opcode::KICK_NOTIFICATION)
        .string_short(reason)
        .finish_frame()
}

/// Decoded `HandshakeRequest` body: `version: u16`, `client_magic: u32`.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeRequest {
    pub version: u16,
    pub client_magic: u32,
}

pub fn decode_handshake_request(body: &mut Reader<'_>) -> CodecResult<HandshakeRequest> {
    Ok(HandshakeRequest {
        version: body.u16()?,
        client_magic: body.u32()?,
    })
}

/// Decoded `MoveRequest` body: `direction: u8`, `facing: u8`.
#[derive(Debug, Clone, Copy)]
pub struct MoveRequest {
    pub direction: u8,
    pub facing: u8,
}

pub fn decode_move_request(body: &mut Reader<'_>) -> CodecResult<MoveRequest> {
    Ok(MoveRequest {
        direction: body.u8()?,
        facing: body.u8()?,
    })
}

/// Decoded `TurnRequest` body: `direction: u8`.
pub fn decode_turn_request(body: &mut Reader<'_>) -> CodecResult<u8> {
    body.u8()
}

/// Client ping (`0xF6`) / pong (`0xF9`) bodies are both a bare `ts: u32`.
pub fn decode_timestamp(body: &mut Reader<'_>) -> CodecResult<u32> {
    body.u32()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::codec::decode_header;

    #[test]
    fn welcome_round_trips() {
        let frame = welcome(42, 5, 7, 2);
        let size = decode_header(frame[0..4].try_into().unwrap()).unwrap();
        let mut r = Reader::new(&frame[4..4 + size as usize]);
        assert_eq!(r.u8().unwrap(), Opcode::WELCOME);
        assert_eq!(r.u32().unwrap(), 42);
        assert_eq!(r.u16().unwrap(), 5);
        assert_eq!(r.u16().unwrap(), 7);
        assert_eq!(r.u8().unwrap(), 2);
    }

    #[test]
    fn batch_player_spatial_splits_on_255() {
        let entries: Vec<PlayerSnapshot> = (0..300)
            .map(|i| PlayerSnapshot {
                player_id: i as u64,
                x: 0,
                y: 0,
                facing: 0,
            })
            .collect();
        let packets = batch_player_spatial(&entries);
        assert_eq!(packets.len(), 2);

        let size0 = decode_header(packets[0][0..4].try_into().unwrap()).unwrap();
        let mut r0 = Reader::new(&packets[0][4..4 + size0 as usize]);
        assert_eq!(r0.u8().unwrap(), Opcode::BATCH_PLAYER_SPATIAL);
        assert_eq!(r0.u8().unwrap(), 255);

        let size1 = decode_header(packets[1][0..4].try_into().unwrap()).unwrap();
        let mut r1 = Reader::new(&packets[1][4..4 + size1 as usize]);
        let _opcode = r1.u8().unwrap();
        assert_eq!(r1.u8().unwrap(), 45);
    }

    #[test]
    fn empty_batch_produces_no_packets() {
        assert!(batch_player_spatial(&[]).is_empty());
    }

    #[test]
    fn decode_handshake_request_reads_both_fields() {
        let mut w = Writer::new(Opcode::HANDSHAKE_REQUEST);
        w.u16(1).u32(0x4459_4557);
        let frame = w.finish_frame();
        let size = decode_header(frame[0..4].try_into().unwrap()).unwrap();
        let mut r = Reader::new(&frame[4..4 + size as usize]);
        let _opcode = r.u8().unwrap();
        let req = decode_handshake_request(&mut r).unwrap();
        assert_eq!(req.version, 1);
        assert_eq!(req.client_magic, 0x4459_4557);
    }
}
