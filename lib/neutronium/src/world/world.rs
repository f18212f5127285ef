//! Combines `TileMap`, `SpatialIndex`, and `VisibilityTracker` into the single authoritative
//! world the game loop operates on. Game-thread only.

use super::player::{Facing, PlayerRegistry};
use super::spatial::SpatialIndex;
use super::tilemap::TileMap;
use super::visibility::VisibilityTracker;
use crate::identity::PlayerId;
use hashbrown::HashSet;

/// Chebyshev view radius in tiles; the rectangular metric used throughout (§4.9).
pub const VIEW_RANGE: i16 = 10;

/// Spatial-index cell size, chosen near the view diameter so a range query touches ~9 cells.
const SPATIAL_CELL_SIZE: i16 = 21;

pub struct World {
    pub tiles: TileMap,
    spatial: SpatialIndex,
    pub visibility: VisibilityTracker,
}

impl World {
    pub fn new(width: i16, height: i16) -> World {
        let mut tiles = TileMap::new(width, height);
        tiles.create_border();
        World {
            tiles,
            spatial: SpatialIndex::new(SPATIAL_CELL_SIZE),
            visibility: VisibilityTracker::new(),
        }
    }

    pub fn add_player(&mut self, id: PlayerId, x: i16, y: i16) {
        self.spatial.add(id, x, y);
    }

    pub fn remove_player(&mut self, id: PlayerId) {
        self.spatial.remove(id);
        self.visibility.remove_player(id);
    }

    /// Returns `true` iff the player's spatial cell changed, mirroring `SpatialIndex::update`.
    pub fn update_player_position(&mut self, id: PlayerId, x: i16, y: i16) -> bool {
        self.spatial.update(id, x, y)
    }

    #[inline]
    pub fn chebyshev_in_range(x1: i16, y1: i16, x2: i16, y2: i16, range: i16) -> bool {
        (x1 - x2).unsigned_abs().max((y1 - y2).unsigned_abs()) as i16 <= range
    }

    #[inline]
    pub fn is_in_view(&self, x1: i16, y1: i16, x2: i16, y2: i16) -> bool {
        Self::chebyshev_in_range(x1, y1, x2, y2, VIEW_RANGE)
    }

    /// Every player (other than at the exact same point necessarily; callers exclude self by
    /// id) within `range` of `(x, y)`, using the spatial index's coarse cell filter followed by
    /// an exact Chebyshev test.
    pub fn players_in_range(
        &self,
        registry: &PlayerRegistry,
        x: i16,
        y: i16,
        range: i16,
    ) -> Vec<PlayerId> {
        self.spatial
            .nearby_ids(x, y, range)
            .into_iter()
            .filter(|&id| {
                registry
                    .get(id)
                    .map(|p| Self::chebyshev_in_range(p.x, p.y, x, y, range))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn player_ids_in_range(&self, registry: &PlayerRegistry, x: i16, y: i16) -> Vec<PlayerId> {
        self.players_in_range(registry, x, y, VIEW_RANGE)
    }

    pub fn can_see(&self, registry: &PlayerRegistry, a: PlayerId, b: PlayerId) -> bool {
        match (registry.get(a), registry.get(b)) {
            (Some(pa), Some(pb)) => self.is_in_view(pa.x, pa.y, pb.x, pb.y),
            _ => false,
        }
    }

    pub fn player_set_excluding(&self, ids: Vec<PlayerId>, exclude: PlayerId) -> HashSet<PlayerId> {
        ids.into_iter().filter(|&id| id != exclude).collect()
    }

    #[inline]
    pub fn tile_is_walkable(&self, x: i16, y: i16) -> bool {
        self.tiles.in_bounds(x, y) && !self.tiles.is_blocking(x, y)
    }
}

/// Spawn point for newly logged-in players: the map origin `(0, 0)`, nudged onto a walkable tile
/// if the origin happens to be blocking (e.g. sits on the border wall for a tiny map).
pub fn default_spawn(tiles: &TileMap) -> (i16, i16) {
    if !tiles.is_blocking(0, 0) {
        return (0, 0);
    }
    for y in 0..tiles.height() {
        for x in 0..tiles.width() {
            if !tiles.is_blocking(x, y) {
                return (x, y);
            }
        }
    }
    (0, 0)
}
