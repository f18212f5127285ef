//! The authoritative world model: tile map, spatial index, visibility tracker, and player
//! registry. Every type here is documented "game-thread only" — see the root `DESIGN.md` for
//! why that's a debug-assertion discipline rather than a runtime lock.

pub mod player;
pub mod spatial;
pub mod tilemap;
pub mod visibility;
#[allow(clippy::module_inception)]
pub mod world;

pub use player::{Facing, LoginError, Player, PlayerRegistry};
pub use spatial::SpatialIndex;
pub use tilemap::{TileKind, TileMap, TileSnapshot};
pub use visibility::{VisibilityDiff, VisibilityTracker};
pub use world::{default_spawn, World, VIEW_RANGE};
