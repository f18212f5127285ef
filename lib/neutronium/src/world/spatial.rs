//! Grid-cell hash over player positions for O(K) neighborhood queries. Game-thread only — every
//! public method debug-asserts it is being called from the thread that created the index.

use crate::identity::PlayerId;
use hashbrown::{HashMap, HashSet};

#[cfg(debug_assertions)]
use std::cell::Cell;
#[cfg(debug_assertions)]
use std::thread::ThreadId;

type CellKey = (i32, i32);

pub struct SpatialIndex {
    cell_size: i16,
    cells: HashMap<CellKey, HashSet<PlayerId>>,
    entity_cell: HashMap<PlayerId, CellKey>,
    #[cfg(debug_assertions)]
    owner: Cell<Option<ThreadId>>,
}

impl SpatialIndex {
    pub fn new(cell_size: i16) -> SpatialIndex {
        SpatialIndex {
            cell_size,
            cells: HashMap::new(),
            entity_cell: HashMap::new(),
            #[cfg(debug_assertions)]
            owner: Cell::new(None),
        }
    }

    #[cfg(debug_assertions)]
    fn assert_owner_thread(&self) {
        let current = std::thread::current().id();
        match self.owner.get() {
            None => self.owner.set(Some(current)),
            Some(id) => debug_assert_eq!(id, current, "SpatialIndex touched from a second thread"),
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn assert_owner_thread(&self) {}

    #[inline]
    fn cell_key(&self, x: i16, y: i16) -> CellKey {
        (
            x.div_euclid(self.cell_size) as i32,
            y.div_euclid(self.cell_size) as i32,
        )
    }

    pub fn add(&mut self, id: PlayerId, x: i16, y: i16) {
        self.assert_owner_thread();
        let key = self.cell_key(x, y);
        self.cells.entry(key).or_default().insert(id);
        self.entity_cell.insert(id, key);
    }

    pub fn remove(&mut self, id: PlayerId) {
        self.assert_owner_thread();
        if let Some(key) = self.entity_cell.remove(&id) {
            if let Some(set) = self.cells.get_mut(&key) {
                set.remove(&id);
                if set.is_empty() {
                    self.cells.remove(&key);
                }
            }
        }
    }

    /// Moves `id` to `(x, y)`. Returns `true` iff the cell actually changed (the common
    /// intra-cell move is a no-op on the cell maps).
    pub fn update(&mut self, id: PlayerId, x: i16, y: i16) -> bool {
        self.assert_owner_thread();
        let new_key = self.cell_key(x, y);
        match self.entity_cell.get(&id) {
            Some(&old_key) if old_key == new_key => false,
            _ => {
                self.remove(id);
                self.add(id, x, y);
                true
            }
        }
    }

    /// All entities in cells that could plausibly contain a point within `range` tiles of
    /// `(x, y)`. This is a coarse filter over whole cells — callers apply the exact Chebyshev
    /// test themselves (see `World::players_in_range`).
    pub fn nearby_ids(&self, x: i16, y: i16, range: i16) -> Vec<PlayerId> {
        self.assert_owner_thread();
        let cell_radius = (range as f64 / self.cell_size as f64).ceil() as i32 + 1;
        let (cx, cy) = self.cell_key(x, y);
        let mut out = Vec::new();
        for dy in -cell_radius..=cell_radius {
            for dx in -cell_radius..=cell_radius {
                if let Some(set) = self.cells.get(&(cx + dx, cy + dy)) {
                    out.extend(set.iter().copied());
                }
            }
        }
        out
    }

    /// True iff some entity other than `exclude` already occupies the exact tile `(x, y)`.
    pub fn is_player_at(&self, x: i16, y: i16, exclude: PlayerId, positions: impl Fn(PlayerId) -> (i16, i16)) -> bool {
        self.assert_owner_thread();
        let key = self.cell_key(x, y);
        match self.cells.get(&key) {
            Some(set) => set.iter().any(|&id| {
                if id == exclude {
                    return false;
                }
                positions(id) == (x, y)
            }),
            None => false,
        }
    }
}
