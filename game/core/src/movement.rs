//! Movement and turn authorization (§4.12): cooldowns, facing agreement, and collision against
//! the tile map. Runs entirely on the game thread as part of an `Action`.

use neutronium::world::{Facing, Player, World};
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Eq, PartialEq)]
pub enum MoveError {
    InvalidDirection,
    OnCooldown,
    WrongFacing,
    Blocked,
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveError::InvalidDirection => write!(f, "direction byte out of range"),
            MoveError::OnCooldown => write!(f, "move requested before cooldown elapsed"),
            MoveError::WrongFacing => write!(f, "requested direction does not match current facing"),
            MoveError::Blocked => write!(f, "target tile is out of bounds or blocking"),
        }
    }
}

impl Error for MoveError {}

/// `true` iff the move actually changed `(x, y)` — callers use this to decide whether to mark
/// the player dirty and update the spatial index.
pub fn authorize_move(
    player: &mut Player,
    direction: u8,
    client_facing: u8,
    world: &World,
    now: Instant,
    move_cooldown: Duration,
) -> Result<(), MoveError> {
    let direction = Facing::from_u8(direction).ok_or(MoveError::InvalidDirection)?;
    let client_facing = Facing::from_u8(client_facing).ok_or(MoveError::InvalidDirection)?;

    if let Some(last) = player.last_move_at {
        if now.duration_since(last) < move_cooldown {
            return Err(MoveError::OnCooldown);
        }
    }

    if direction != player.facing || client_facing != player.facing {
        return Err(MoveError::WrongFacing);
    }

    let (dx, dy) = direction.delta();
    let (tx, ty) = (player.x + dx, player.y + dy);

    if !world.tile_is_walkable(tx, ty) {
        return Err(MoveError::Blocked);
    }

    player.x = tx;
    player.y = ty;
    player.last_move_at = Some(now);
    Ok(())
}

pub fn authorize_turn(
    player: &mut Player,
    direction: u8,
    now: Instant,
    turn_cooldown: Duration,
) -> Result<(), MoveError> {
    let direction = Facing::from_u8(direction).ok_or(MoveError::InvalidDirection)?;

    if direction == player.facing {
        return Err(MoveError::InvalidDirection);
    }

    if let Some(last) = player.last_turn_at {
        if now.duration_since(last) < turn_cooldown {
            return Err(MoveError::OnCooldown);
        }
    }

    player.facing = direction;
    player.last_turn_at = Some(now);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use neutronium::identity::ConnectionId;
    use neutronium::world::PlayerRegistry;

    fn fresh_player(world: &World, registry: &mut PlayerRegistry) -> neutronium::identity::PlayerId {
        let conn = ConnectionId::new(1);
        let (x, y) = neutronium::world::default_spawn(&world.tiles);
        registry.create_player(conn, x, y, Facing::South).unwrap()
    }

    #[test]
    fn move_succeeds_when_facing_matches_and_tile_is_open() {
        let world = World::new(32, 32);
        let mut registry = PlayerRegistry::new();
        let pid = fresh_player(&world, &mut registry);
        let player = registry.get_mut(pid).unwrap();
        let (sx, sy) = (player.x, player.y);

        let south = Facing::South.as_u8();
        authorize_move(player, south, south, &world, Instant::now(), Duration::from_millis(330)).unwrap();
        assert_eq!((player.x, player.y), (sx, sy - 1));
    }

    #[test]
    fn move_rejects_before_cooldown_elapses() {
        let world = World::new(32, 32);
        let mut registry = PlayerRegistry::new();
        let pid = fresh_player(&world, &mut registry);
        let player = registry.get_mut(pid).unwrap();
        let south = Facing::South.as_u8();
        let now = Instant::now();
        authorize_move(player, south, south, &world, now, Duration::from_millis(330)).unwrap();
        let result = authorize_move(player, south, south, &world, now, Duration::from_millis(330));
        assert_eq!(result, Err(MoveError::OnCooldown));
    }

    #[test]
    fn move_rejects_mismatched_facing_without_mutating_state() {
        let world = World::new(32, 32);
        let mut registry = PlayerRegistry::new();
        let pid = fresh_player(&world, &mut registry);
        let player = registry.get_mut(pid).unwrap();
        let (sx, sy) = (player.x, player.y);

        let result = authorize_move(player, Facing::East.as_u8(), Facing::East.as_u8(), &world, Instant::now(), Duration::from_millis(330));
        assert_eq!(result, Err(MoveError::WrongFacing));
        assert_eq!((player.x, player.y), (sx, sy));
        assert_eq!(player.facing, Facing::South);
    }

    #[test]
    fn move_into_border_wall_is_blocked() {
        let world = World::new(8, 8);
        let mut registry = PlayerRegistry::new();
        let conn = ConnectionId::new(1);
        let pid = registry.create_player(conn, 1, 1, Facing::West).unwrap();
        let player = registry.get_mut(pid).unwrap();

        let west = Facing::West.as_u8();
        let result = authorize_move(player, west, west, &world, Instant::now(), Duration::from_millis(330));
        assert_eq!(result, Err(MoveError::Blocked));
        assert_eq!((player.x, player.y), (1, 1));
    }

    #[test]
    fn turn_updates_facing_and_respects_cooldown() {
        let mut registry = PlayerRegistry::new();
        let conn = ConnectionId::new(1);
        let pid = registry.create_player(conn, 5, 5, Facing::South).unwrap();
        let player = registry.get_mut(pid).unwrap();
        let now = Instant::now();

        authorize_turn(player, Facing::East.as_u8(), now, Duration::from_millis(200)).unwrap();
        assert_eq!(player.facing, Facing::East);

        let result = authorize_turn(player, Facing::North.as_u8(), now, Duration::from_millis(200));
        assert_eq!(result, Err(MoveError::OnCooldown));
    }
}
