//! Player entities and their registry: lifecycle, connection<->player mapping, and the
//! per-tick dirty set. Game-thread only.

use crate::identity::{ConnectionId, PlayerId};
use hashbrown::{HashMap, HashSet};
use rand::RngCore;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum Facing {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Facing {
    pub fn from_u8(v: u8) -> Option<Facing> {
        match v {
            0 => Some(Facing::North),
            1 => Some(Facing::East),
            2 => Some(Facing::South),
            3 => Some(Facing::West),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// `(dx, dy)` under the server's pinned North=+y convention (§4.12 / §9 open question).
    pub fn delta(self) -> (i16, i16) {
        match self {
            Facing::North => (0, 1),
            Facing::East => (1, 0),
            Facing::South => (0, -1),
            Facing::West => (-1, 0),
        }
    }
}

pub struct Player {
    pub player_id: PlayerId,
    pub connection_id: ConnectionId,
    pub x: i16,
    pub y: i16,
    pub facing: Facing,
    pub last_move_at: Option<std::time::Instant>,
    pub last_turn_at: Option<std::time::Instant>,
}

#[derive(Debug, Eq, PartialEq)]
pub enum LoginError {
    DuplicateLogin,
}

/// How many high-entropy RNG draws `generate_player_id` tries before falling back to the
/// sequential generator. A collision surviving this many draws means the registry is dense
/// enough that relying on entropy alone risks the birthday problem.
const RNG_COLLISION_RETRIES: u32 = 8;

#[derive(Default)]
pub struct PlayerRegistry {
    players: HashMap<PlayerId, Player>,
    conn_to_player: HashMap<ConnectionId, PlayerId>,
    player_to_conn: HashMap<PlayerId, ConnectionId>,
    dirty: HashSet<PlayerId>,
    next_sequential_id: u64,
}

impl PlayerRegistry {
    pub fn new() -> PlayerRegistry {
        PlayerRegistry::default()
    }

    /// Server-generated 64-bit id: high-entropy RNG with retry-on-collision. If the RNG keeps
    /// colliding past `RNG_COLLISION_RETRIES` draws, falls back to a monotonic sequential
    /// generator so registration can't spin forever against the birthday problem (§4.8).
    fn generate_player_id(&mut self) -> PlayerId {
        let mut rng = rand::thread_rng();
        for _ in 0..RNG_COLLISION_RETRIES {
            let candidate = PlayerId::new(rng.next_u64());
            if !self.players.contains_key(&candidate) {
                return candidate;
            }
        }
        self.next_sequential_player_id()
    }

    fn next_sequential_player_id(&mut self) -> PlayerId {
        loop {
            self.next_sequential_id = self.next_sequential_id.wrapping_add(1);
            let candidate = PlayerId::new(self.next_sequential_id);
            if !self.players.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn create_player(
        &mut self,
        connection_id: ConnectionId,
        x: i16,
        y: i16,
        facing: Facing,
    ) -> Result<PlayerId, LoginError> {
        if self.conn_to_player.contains_key(&connection_id) {
            return Err(LoginError::DuplicateLogin);
        }
        let player_id = self.generate_player_id();
        self.players.insert(
            player_id,
            Player {
                player_id,
                connection_id,
                x,
                y,
                facing,
                last_move_at: None,
                last_turn_at: None,
            },
        );
        self.conn_to_player.insert(connection_id, player_id);
        self.player_to_conn.insert(player_id, connection_id);
        Ok(player_id)
    }

    pub fn remove_by_player_id(&mut self, player_id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&player_id)?;
        self.conn_to_player.remove(&player.connection_id);
        self.player_to_conn.remove(&player_id);
        self.dirty.remove(&player_id);
        Some(player)
    }

    pub fn remove_by_connection_id(&mut self, connection_id: ConnectionId) -> Option<Player> {
        let player_id = self.conn_to_player.get(&connection_id).copied()?;
        self.remove_by_player_id(player_id)
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.get(&player_id)
    }

    pub fn get_mut(&mut self, player_id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&player_id)
    }

    pub fn player_id_for_connection(&self, connection_id: ConnectionId) -> Option<PlayerId> {
        self.conn_to_player.get(&connection_id).copied()
    }

    pub fn connection_id_for_player(&self, player_id: PlayerId) -> Option<ConnectionId> {
        self.player_to_conn.get(&player_id).copied()
    }

    pub fn mark_dirty(&mut self, player_id: PlayerId) {
        self.dirty.insert(player_id);
    }

    /// Returns and clears the dirty set, atomically within the caller's (single, game-thread)
    /// point of view.
    pub fn consume_dirty(&mut self) -> HashSet<PlayerId> {
        std::mem::take(&mut self.dirty)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_player_rejects_second_login_on_same_connection() {
        let mut reg = PlayerRegistry::new();
        let conn = ConnectionId::new(1);
        assert!(reg.create_player(conn, 0, 0, Facing::South).is_ok());
        assert_eq!(
            reg.create_player(conn, 0, 0, Facing::South),
            Err(LoginError::DuplicateLogin)
        );
    }

    #[test]
    fn id_maps_stay_mutual_inverses_after_removal() {
        let mut reg = PlayerRegistry::new();
        let conn = ConnectionId::new(5);
        let pid = reg.create_player(conn, 1, 1, Facing::North).unwrap();
        assert_eq!(reg.connection_id_for_player(pid), Some(conn));
        assert_eq!(reg.player_id_for_connection(conn), Some(pid));

        reg.remove_by_connection_id(conn);
        assert_eq!(reg.connection_id_for_player(pid), None);
        assert_eq!(reg.player_id_for_connection(conn), None);
    }

    #[test]
    fn dirty_set_is_consumed_exactly_once() {
        let mut reg = PlayerRegistry::new();
        let conn = ConnectionId::new(1);
        let pid = reg.create_player(conn, 0, 0, Facing::South).unwrap();
        reg.mark_dirty(pid);
        let dirty = reg.consume_dirty();
        assert!(dirty.contains(&pid));
        assert!(reg.consume_dirty().is_empty());
    }

    #[test]
    fn facing_delta_matches_north_plus_y_convention() {
        assert_eq!(Facing::North.delta(), (0, 1));
        assert_eq!(Facing::South.delta(), (0, -1));
    }

    #[test]
    fn sequential_fallback_skips_ids_already_in_use() {
        let mut reg = PlayerRegistry::new();
        reg.players.insert(
            PlayerId::new(1),
            Player {
                player_id: PlayerId::new(1),
                connection_id: ConnectionId::new(99),
                x: 0,
                y: 0,
                facing: Facing::South,
                last_move_at: None,
                last_turn_at: None,
            },
        );
        reg.next_sequential_id = 0;
        assert_eq!(reg.next_sequential_player_id(), PlayerId::new(2));
    }
}
