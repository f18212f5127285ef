//! Immutable-shape 2D grid of tile kinds with a parallel blocking bitmap. Game-thread only.

/// Kind of terrain a tile holds. `Void` is the sentinel returned for any out-of-bounds read and
/// is always blocking.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TileKind {
    Floor,
    Wall,
    Water,
    Void,
}

impl TileKind {
    #[inline]
    fn is_blocking(self) -> bool {
        matches!(self, TileKind::Wall | TileKind::Water | TileKind::Void)
    }
}

/// One tile in a client-facing dump: position plus kind.
#[derive(Debug, Clone, Copy)]
pub struct TileSnapshot {
    pub x: i16,
    pub y: i16,
    pub kind: TileKind,
}

pub struct TileMap {
    width: i16,
    height: i16,
    tiles: Vec<TileKind>,
    blocking: Vec<bool>,
}

impl TileMap {
    /// Builds a `width` x `height` map filled with `Floor`, surrounded by nothing special —
    /// callers typically follow up with `create_border`.
    pub fn new(width: i16, height: i16) -> TileMap {
        let count = width as usize * height as usize;
        let mut map = TileMap {
            width,
            height,
            tiles: vec![TileKind::Floor; count],
            blocking: vec![false; count],
        };
        map.recalculate_blocking();
        map
    }

    #[inline]
    pub fn width(&self) -> i16 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> i16 {
        self.height
    }

    #[inline]
    pub fn in_bounds(&self, x: i16, y: i16) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    #[inline]
    fn index(&self, x: i16, y: i16) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Returns `Void` (blocking) for any out-of-bounds coordinate.
    pub fn get(&self, x: i16, y: i16) -> TileKind {
        if !self.in_bounds(x, y) {
            return TileKind::Void;
        }
        self.tiles[self.index(x, y)]
    }

    /// Out-of-bounds writes are silently ignored: the map's shape is fixed after construction.
    pub fn set(&mut self, x: i16, y: i16, kind: TileKind) {
        if !self.in_bounds(x, y) {
            return;
        }
        let idx = self.index(x, y);
        self.tiles[idx] = kind;
        self.blocking[idx] = kind.is_blocking();
    }

    /// True iff `(x, y)` is out of bounds or its tile is blocking.
    pub fn is_blocking(&self, x: i16, y: i16) -> bool {
        if !self.in_bounds(x, y) {
            return true;
        }
        self.blocking[self.index(x, y)]
    }

    pub fn fill_region(&mut self, x0: i16, y0: i16, x1: i16, y1: i16, kind: TileKind) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.set(x, y, kind);
            }
        }
    }

    /// Walls the outermost ring of the map.
    pub fn create_border(&mut self) {
        for x in 0..self.width {
            self.set(x, 0, TileKind::Wall);
            self.set(x, self.height - 1, TileKind::Wall);
        }
        for y in 0..self.height {
            self.set(0, y, TileKind::Wall);
            self.set(self.width - 1, y, TileKind::Wall);
        }
    }

    /// Recomputes `blocking` from `tiles`, discarding any manual overrides applied via `set`
    /// directly on the blocking array (there is no such direct setter today, but this keeps the
    /// derivation explicit and testable as its own step, per §4.5).
    pub fn recalculate_blocking(&mut self) {
        for (slot, kind) in self.blocking.iter_mut().zip(self.tiles.iter()) {
            *slot = kind.is_blocking();
        }
    }

    pub fn full_dump(&self) -> Vec<TileSnapshot> {
        self.region(0, 0, self.width - 1, self.height - 1)
    }

    pub fn region(&self, x0: i16, y0: i16, x1: i16, y1: i16) -> Vec<TileSnapshot> {
        let mut out = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                out.push(TileSnapshot {
                    x,
                    y,
                    kind: self.get(x, y),
                });
            }
        }
        out
    }

    /// A `(2r+1)^2` square of tiles centered on `(cx, cy)`, clamped to the map's own bounds
    /// (out-of-bounds cells still appear as `Void` since `get` handles that uniformly).
    pub fn view_centered(&self, cx: i16, cy: i16, radius: i16) -> Vec<TileSnapshot> {
        self.region(cx - radius, cy - radius, cx + radius, cy + radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_reads_as_void_and_blocking() {
        let map = TileMap::new(4, 4);
        assert_eq!(map.get(-1, 0), TileKind::Void);
        assert!(map.is_blocking(-1, 0));
        assert!(map.is_blocking(4, 0));
    }

    #[test]
    fn border_walls_are_blocking_interior_is_not() {
        let mut map = TileMap::new(5, 5);
        map.create_border();
        assert!(map.is_blocking(0, 0));
        assert!(map.is_blocking(4, 4));
        assert!(!map.is_blocking(2, 2));
    }

    #[test]
    fn set_updates_blocking_immediately() {
        let mut map = TileMap::new(3, 3);
        assert!(!map.is_blocking(1, 1));
        map.set(1, 1, TileKind::Wall);
        assert!(map.is_blocking(1, 1));
    }

    #[test]
    fn view_centered_yields_square_of_expected_size() {
        let map = TileMap::new(20, 20);
        let view = map.view_centered(10, 10, 2);
        assert_eq!(view.len(), 25);
    }
}
