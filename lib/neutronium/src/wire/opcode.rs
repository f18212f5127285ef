//! The opcode catalogue and the client/server direction discipline the dispatcher enforces.
//!
//! Every opcode the core core knows about is named here so `Opcode::classify` can never drift
//! from the payload-size table in `wire::packet` the way a bare `match` sprinkled across the
//! dispatcher would.

/// Direction an opcode is legal to arrive from. A frame classified the wrong way for its
/// origin is a Protocol error (see `GameError`/dispatcher).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Opcode {
    HandshakeRequest,
    HandshakeAccepted,
    HandshakeRejected,
    MoveRequest,
    TurnRequest,
    Welcome,
    PositionCorrection,
    FacingCorrection,
    BatchPlayerSpatial,
    LeftGame,
    ClientPingRequest,
    ServerPongResponse,
    ServerPingRequest,
    ClientPongResponse,
    HeartbeatRequest,
    HeartbeatResponse,
    DisconnectRequest,
    DisconnectAcknowledged,
    KickNotification,
    /// Any opcode the core does not give a handler body to. Still well-formed on the wire and
    /// still subject to framing/protocol checks; dispatch is a no-op.
    Reserved(u8),
}

impl Opcode {
    pub const HANDSHAKE_REQUEST: u8 = 0x00;
    pub const HANDSHAKE_ACCEPTED: u8 = 0xF0;
    pub const HANDSHAKE_REJECTED: u8 = 0xF1;
    pub const MOVE_REQUEST: u8 = 0x01;
    pub const TURN_REQUEST: u8 = 0x02;
    pub const WELCOME: u8 = 0x10;
    pub const POSITION_CORRECTION: u8 = 0x11;
    pub const FACING_CORRECTION: u8 = 0x12;
    pub const BATCH_PLAYER_SPATIAL: u8 = 0x25;
    pub const LEFT_GAME: u8 = 0x26;
    pub const CLIENT_PING_REQUEST: u8 = 0xF6;
    pub const SERVER_PONG_RESPONSE: u8 = 0xF7;
    pub const SERVER_PING_REQUEST: u8 = 0xF8;
    pub const CLIENT_PONG_RESPONSE: u8 = 0xF9;
    pub const HEARTBEAT_REQUEST: u8 = 0xFA;
    pub const HEARTBEAT_RESPONSE: u8 = 0xFB;
    pub const DISCONNECT_REQUEST: u8 = 0xFE;
    pub const DISCONNECT_ACKNOWLEDGED: u8 = 0xFF;
    pub const KICK_NOTIFICATION: u8 = 0xF2;

    #[inline]
    pub fn from_u8(byte: u8) -> Opcode {
        match byte {
            Self::HANDSHAKE_REQUEST => Opcode::HandshakeRequest,
            Self::HANDSHAKE_ACCEPTED => Opcode::HandshakeAccepted,
            Self::HANDSHAKE_REJECTED => Opcode::HandshakeRejected,
            Self::MOVE_REQUEST => Opcode::MoveRequest,
            Self::TURN_REQUEST => Opcode::TurnRequest,
            Self::WELCOME => Opcode::Welcome,
            Self::POSITION_CORRECTION => Opcode::PositionCorrection,
            Self::FACING_CORRECTION => Opcode::FacingCorrection,
            Self::BATCH_PLAYER_SPATIAL => Opcode::BatchPlayerSpatial,
            Self::LEFT_GAME => Opcode::LeftGame,
            Self::CLIENT_PING_REQUEST => Opcode::ClientPingRequest,
            Self::SERVER_PONG_RESPONSE => Opcode::ServerPongResponse,
            Self::SERVER_PING_REQUEST => Opcode::ServerPingRequest,
            Self::CLIENT_PONG_RESPONSE => Opcode::ClientPongResponse,
            Self::HEARTBEAT_REQUEST => Opcode::HeartbeatRequest,
            Self::HEARTBEAT_RESPONSE => Opcode::HeartbeatResponse,
            Self::DISCONNECT_REQUEST => Opcode::DisconnectRequest,
            Self::DISCONNECT_ACKNOWLEDGED => Opcode::DisconnectAcknowledged,
            Self::KICK_NOTIFICATION => Opcode::KickNotification,
            other => Opcode::Reserved(other),
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::HandshakeRequest => Self::HANDSHAKE_REQUEST,
            Opcode::HandshakeAccepted => Self::HANDSHAKE_ACCEPTED,
            Opcode::HandshakeRejected => Self::HANDSHAKE_REJECTED,
            Opcode::MoveRequest => Self::MOVE_REQUEST,
            Opcode::TurnRequest => Self::TURN_REQUEST,
            Opcode::Welcome => Self::WELCOME,
            Opcode::PositionCorrection => Self::POSITION_CORRECTION,
            Opcode::FacingCorrection => Self::FACING_CORRECTION,
            Opcode::BatchPlayerSpatial => Self::BATCH_PLAYER_SPATIAL,
            Opcode::LeftGame => Self::LEFT_GAME,
            Opcode::ClientPingRequest => Self::CLIENT_PING_REQUEST,
            Opcode::ServerPongResponse => Self::SERVER_PONG_RESPONSE,
            Opcode::ServerPingRequest => Self::SERVER_PING_REQUEST,
            Opcode::ClientPongResponse => Self::CLIENT_PONG_RESPONSE,
            Opcode::HeartbeatRequest => Self::HEARTBEAT_REQUEST,
            Opcode::HeartbeatResponse => Self::HEARTBEAT_RESPONSE,
            Opcode::DisconnectRequest => Self::DISCONNECT_REQUEST,
            Opcode::DisconnectAcknowledged => Self::DISCONNECT_ACKNOWLEDGED,
            Opcode::KickNotification => Self::KICK_NOTIFICATION,
            Opcode::Reserved(byte) => byte,
        }
    }

    /// The direction this opcode is legal to arrive from. `Reserved` opcodes are accepted from
    /// either direction since the core has no handler body to police them against.
    #[inline]
    pub fn direction(self) -> Option<Direction> {
        use Direction::*;
        match self {
            Opcode::HandshakeRequest
            | Opcode::MoveRequest
            | Opcode::TurnRequest
            | Opcode::ClientPingRequest
            | Opcode::ClientPongResponse
            | Opcode::HeartbeatRequest
            | Opcode::DisconnectRequest => Some(ClientToServer),

            Opcode::HandshakeAccepted
            | Opcode::HandshakeRejected
            | Opcode::Welcome
            | Opcode::PositionCorrection
            | Opcode::FacingCorrection
            | Opcode::BatchPlayerSpatial
            | Opcode::LeftGame
            | Opcode::ServerPongResponse
            | Opcode::ServerPingRequest
            | Opcode::HeartbeatResponse
            | Opcode::DisconnectAcknowledged
            | Opcode::KickNotification => Some(ServerToClient),

            Opcode::Reserved(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_named_opcode() {
        let bytes = [
            Opcode::HANDSHAKE_REQUEST,
            Opcode::HANDSHAKE_ACCEPTED,
            Opcode::HANDSHAKE_REJECTED,
            Opcode::MOVE_REQUEST,
            Opcode::TURN_REQUEST,
            Opcode::WELCOME,
            Opcode::POSITION_CORRECTION,
            Opcode::FACING_CORRECTION,
            Opcode::BATCH_PLAYER_SPATIAL,
            Opcode::LEFT_GAME,
            Opcode::CLIENT_PING_REQUEST,
            Opcode::SERVER_PONG_RESPONSE,
            Opcode::SERVER_PING_REQUEST,
            Opcode::CLIENT_PONG_RESPONSE,
            Opcode::HEARTBEAT_REQUEST,
            Opcode::HEARTBEAT_RESPONSE,
            Opcode::DISCONNECT_REQUEST,
            Opcode::DISCONNECT_ACKNOWLEDGED,
            Opcode::KICK_NOTIFICATION,
        ];
        for byte in bytes {
            assert_eq!(Opcode::from_u8(byte).as_u8(), byte);
        }
    }

    #[test]
    fn unknown_opcode_is_reserved_and_directionless() {
        let op = Opcode::from_u8(0x77);
        assert_eq!(op, Opcode::Reserved(0x77));
        assert_eq!(op.direction(), None);
    }

    #[test]
    fn move_request_is_client_to_server_only() {
        assert_eq!(Opcode::MoveRequest.direction(), Some(Direction::ClientToServer));
    }

    #[test]
    fn welcome_is_server_to_client_only() {
        assert_eq!(Opcode::Welcome.direction(), Some(Direction::ServerToClient));
    }
}
