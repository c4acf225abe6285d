//! Grid, tile and coordinate types.

use serde::{Deserialize, Serialize};

use crate::game::{BuildingId, BuildingType, KingdomId};

/// A coordinate on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    /// X coordinate (column).
    pub x: u16,
    /// Y coordinate (row).
    pub y: u16,
}

/// Orthogonal offsets: up, down, left, right.
const ORTHOGONAL: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// All eight surrounding offsets.
const SURROUNDING: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl Coord {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Offset this coordinate, returning `None` when the result leaves a
    /// `size × size` grid.
    #[must_use]
    #[inline]
    pub fn offset(self, dx: i32, dy: i32, size: u16) -> Option<Coord> {
        let x = i32::from(self.x) + dx;
        let y = i32::from(self.y) + dy;
        let limit = i32::from(size);
        if (0..limit).contains(&x) && (0..limit).contains(&y) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some(Coord::new(x as u16, y as u16))
        } else {
            None
        }
    }

    /// Get orthogonally adjacent coordinates (up, down, left, right).
    ///
    /// Returns a fixed-size array and count to avoid heap allocation.
    /// The array contains valid coordinates in indices 0..count.
    #[must_use]
    #[inline]
    pub fn adjacent(&self, size: u16) -> ([Coord; 4], u8) {
        let mut result = [Coord::new(0, 0); 4];
        let mut count = 0u8;
        for (dx, dy) in ORTHOGONAL {
            if let Some(c) = self.offset(dx, dy, size) {
                result[usize::from(count)] = c;
                count += 1;
            }
        }
        (result, count)
    }

    /// Get the up to eight surrounding coordinates, diagonals included.
    ///
    /// Same layout as [`Coord::adjacent`]: valid entries are in 0..count.
    #[must_use]
    #[inline]
    pub fn surrounding(&self, size: u16) -> ([Coord; 8], u8) {
        let mut result = [Coord::new(0, 0); 8];
        let mut count = 0u8;
        for (dx, dy) in SURROUNDING {
            if let Some(c) = self.offset(dx, dy, size) {
                result[usize::from(count)] = c;
                count += 1;
            }
        }
        (result, count)
    }

    /// Euclidean distance to another coordinate.
    #[must_use]
    pub fn distance(&self, other: Coord) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }

    /// Chebyshev distance (king moves) to another coordinate.
    #[must_use]
    pub fn chebyshev(&self, other: Coord) -> u16 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Whether the other coordinate is one of the eight surrounding tiles.
    #[must_use]
    pub fn touches(&self, other: Coord) -> bool {
        self.chebyshev(other) == 1
    }

    /// One greedy step toward `target`: move along both axes at once,
    /// like a Bresenham walk with unit steps.
    #[must_use]
    pub fn step_toward(&self, target: Coord) -> Coord {
        let step = |from: u16, to: u16| match from.cmp(&to) {
            std::cmp::Ordering::Less => from + 1,
            std::cmp::Ordering::Greater => from - 1,
            std::cmp::Ordering::Equal => from,
        };
        Coord::new(step(self.x, target.x), step(self.y, target.y))
    }

    /// One greedy step away from `threat`, clamped to the grid.
    #[must_use]
    pub fn step_away(&self, threat: Coord, size: u16) -> Coord {
        let dir = |from: u16, other: u16| match from.cmp(&other) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Equal => 0,
        };
        self.offset(dir(self.x, threat.x), dir(self.y, threat.y), size)
            .unwrap_or(*self)
    }
}

/// Terrain on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    /// Ordinary grassland.
    Grass,
    /// Arid ground. Same rules as grass; kept for the render feed.
    Desert,
}

/// A harvestable resource node sitting on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Yields wood.
    Tree,
    /// Yields stone.
    Stone,
    /// Yields food.
    Berry,
}

/// Building reference stored on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileBuilding {
    /// Registry id of the building.
    pub id: BuildingId,
    /// Kind of building, mirrored from the registry.
    pub kind: BuildingType,
}

/// A single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Terrain type.
    pub terrain: Terrain,
    /// Resource node on the tile, if any.
    pub resource: Option<Resource>,
    /// Building on the tile, if any.
    pub building: Option<TileBuilding>,
    /// Whether the tile is a wall. Implies `building.kind == Wall`.
    pub is_wall: bool,
    /// Kingdom owning the tile.
    pub territory: Option<KingdomId>,
    /// Whether the tile is a kingdom capital.
    pub is_capital: bool,
}

impl Tile {
    /// Create an empty tile with the given terrain.
    #[must_use]
    pub const fn new(terrain: Terrain) -> Self {
        Self {
            terrain,
            resource: None,
            building: None,
            is_wall: false,
            territory: None,
            is_capital: false,
        }
    }

    /// Create an empty grass tile.
    #[must_use]
    pub const fn grass() -> Self {
        Self::new(Terrain::Grass)
    }

    /// Whether nothing stands on the tile (no building, wall or resource).
    #[must_use]
    pub const fn is_clear(&self) -> bool {
        self.building.is_none() && self.resource.is_none() && !self.is_wall
    }

    /// Whether this tile is a wall owned by `kingdom`.
    #[must_use]
    pub fn is_wall_of(&self, kingdom: KingdomId) -> bool {
        self.is_wall && self.territory == Some(kingdom)
    }

    /// Whether a unit of `kingdom` may stand on this tile.
    ///
    /// Foreign walls and buildings block; a kingdom's own walls act as gates.
    #[must_use]
    pub fn passable_for(&self, kingdom: KingdomId) -> bool {
        if self.is_wall {
            return self.territory == Some(kingdom);
        }
        self.building.is_none()
    }
}

/// The square grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    /// Side length in tiles.
    size: u16,
    /// Tiles stored in row-major order.
    tiles: Vec<Tile>,
}

impl Map {
    /// Create a new grid filled with grass tiles.
    ///
    /// Returns `None` if size is zero.
    #[must_use]
    pub fn new(size: u16) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let count = usize::from(size) * usize::from(size);
        Some(Self {
            size,
            tiles: vec![Tile::grass(); count],
        })
    }

    /// Side length of the grid.
    #[must_use]
    pub const fn size(&self) -> u16 {
        self.size
    }

    /// Centre tile of the grid.
    #[must_use]
    pub const fn center(&self) -> Coord {
        Coord::new(self.size / 2, self.size / 2)
    }

    /// Raw tiles in row-major order.
    #[must_use]
    #[inline]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Check if a coordinate is within the grid.
    #[must_use]
    pub const fn in_bounds(&self, coord: Coord) -> bool {
        coord.x < self.size && coord.y < self.size
    }

    /// Whether a coordinate lies on the outer ring of the grid.
    #[must_use]
    pub const fn is_edge(&self, coord: Coord) -> bool {
        coord.x == 0 || coord.y == 0 || coord.x + 1 == self.size || coord.y + 1 == self.size
    }

    /// Convert signed coordinates into a checked [`Coord`].
    #[must_use]
    pub fn checked_coord(&self, x: i32, y: i32) -> Option<Coord> {
        Coord::new(0, 0).offset(x, y, self.size)
    }

    /// Index of a coordinate in the row-major tile vector.
    #[must_use]
    #[inline]
    pub fn index(&self, coord: Coord) -> Option<usize> {
        if self.in_bounds(coord) {
            Some(usize::from(coord.y) * usize::from(self.size) + usize::from(coord.x))
        } else {
            None
        }
    }

    /// Coordinate for a row-major index.
    #[must_use]
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn coord_at(&self, idx: usize) -> Coord {
        let size = usize::from(self.size);
        Coord::new((idx % size) as u16, (idx / size) as u16)
    }

    /// Get a reference to the tile at the given coordinate.
    #[must_use]
    pub fn get(&self, coord: Coord) -> Option<&Tile> {
        self.index(coord).map(|idx| &self.tiles[idx])
    }

    /// Get a mutable reference to the tile at the given coordinate.
    #[must_use]
    pub fn get_mut(&mut self, coord: Coord) -> Option<&mut Tile> {
        self.index(coord).map(|idx| &mut self.tiles[idx])
    }

    /// Set the tile at the given coordinate.
    ///
    /// Returns `false` if the coordinate is out of bounds.
    pub fn set(&mut self, coord: Coord, tile: Tile) -> bool {
        if let Some(idx) = self.index(coord) {
            self.tiles[idx] = tile;
            true
        } else {
            false
        }
    }

    /// Iterate over all coordinates and tiles.
    pub fn iter(&self) -> impl Iterator<Item = (Coord, &Tile)> {
        self.tiles
            .iter()
            .enumerate()
            .map(|(idx, tile)| (self.coord_at(idx), tile))
    }

    /// All tiles claimed by a kingdom.
    pub fn tiles_owned_by(&self, kingdom: KingdomId) -> impl Iterator<Item = (Coord, &Tile)> {
        self.iter()
            .filter(move |(_, tile)| tile.territory == Some(kingdom))
    }

    /// Count territory tiles (walls included) claimed by a kingdom.
    #[must_use]
    pub fn count_territory(&self, kingdom: KingdomId) -> usize {
        self.tiles_owned_by(kingdom).count()
    }

    /// Whether any of the eight surrounding tiles belongs to `kingdom`.
    #[must_use]
    pub fn touches_territory(&self, coord: Coord, kingdom: KingdomId) -> bool {
        let (around, count) = coord.surrounding(self.size);
        around[..usize::from(count)]
            .iter()
            .any(|c| self.get(*c).is_some_and(|t| t.territory == Some(kingdom)))
    }

    /// Whether any of the eight surrounding tiles is a wall of `kingdom`.
    #[must_use]
    pub fn touches_wall_of(&self, coord: Coord, kingdom: KingdomId) -> bool {
        let (around, count) = coord.surrounding(self.size);
        around[..usize::from(count)]
            .iter()
            .any(|c| self.get(*c).is_some_and(|t| t.is_wall_of(kingdom)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_adjacent() {
        let coord = Coord::new(5, 5);
        let (adj, count) = coord.adjacent(10);
        let adj_slice = &adj[..usize::from(count)];
        assert_eq!(count, 4);
        assert!(adj_slice.contains(&Coord::new(5, 4))); // up
        assert!(adj_slice.contains(&Coord::new(5, 6))); // down
        assert!(adj_slice.contains(&Coord::new(4, 5))); // left
        assert!(adj_slice.contains(&Coord::new(6, 5))); // right
    }

    #[test]
    fn test_coord_adjacent_corner() {
        let coord = Coord::new(0, 0);
        let (adj, count) = coord.adjacent(10);
        let adj_slice = &adj[..usize::from(count)];
        assert_eq!(count, 2);
        assert!(adj_slice.contains(&Coord::new(0, 1)));
        assert!(adj_slice.contains(&Coord::new(1, 0)));
    }

    #[test]
    fn test_coord_surrounding() {
        assert_eq!(Coord::new(5, 5).surrounding(10).1, 8);
        assert_eq!(Coord::new(0, 0).surrounding(10).1, 3);
        assert_eq!(Coord::new(9, 5).surrounding(10).1, 5);
    }

    #[test]
    fn test_step_toward_and_away() {
        let from = Coord::new(5, 5);
        assert_eq!(from.step_toward(Coord::new(9, 5)), Coord::new(6, 5));
        assert_eq!(from.step_toward(Coord::new(2, 1)), Coord::new(4, 4));
        assert_eq!(from.step_toward(from), from);
        assert_eq!(from.step_away(Coord::new(7, 5), 10), Coord::new(4, 5));
        assert_eq!(Coord::new(0, 0).step_away(Coord::new(1, 1), 10), Coord::new(0, 0));
    }

    #[test]
    fn test_distances() {
        let a = Coord::new(0, 0);
        let b = Coord::new(3, 4);
        assert!((a.distance(b) - 5.0).abs() < 1e-9);
        assert_eq!(a.chebyshev(b), 4);
        assert!(Coord::new(2, 2).touches(Coord::new(3, 3)));
        assert!(!Coord::new(2, 2).touches(Coord::new(2, 2)));
    }

    #[test]
    fn test_map_zero_size() {
        assert!(Map::new(0).is_none());
    }

    #[test]
    fn test_map_get_set() {
        let mut map = Map::new(10).unwrap();
        let coord = Coord::new(5, 5);
        assert_eq!(map.get(coord).unwrap().terrain, Terrain::Grass);

        let mut tile = Tile::new(Terrain::Desert);
        tile.resource = Some(Resource::Stone);
        assert!(map.set(coord, tile));
        assert_eq!(map.get(coord).unwrap().resource, Some(Resource::Stone));
        assert!(!map.set(Coord::new(10, 0), tile));
    }

    #[test]
    fn test_map_bounds_and_edges() {
        let map = Map::new(10).unwrap();
        assert!(map.in_bounds(Coord::new(9, 9)));
        assert!(!map.in_bounds(Coord::new(10, 0)));
        assert!(map.is_edge(Coord::new(0, 4)));
        assert!(map.is_edge(Coord::new(9, 4)));
        assert!(!map.is_edge(Coord::new(4, 4)));
        assert_eq!(map.checked_coord(-1, 3), None);
        assert_eq!(map.checked_coord(3, 3), Some(Coord::new(3, 3)));
    }

    #[test]
    fn test_index_roundtrip() {
        let map = Map::new(7).unwrap();
        let coord = Coord::new(3, 5);
        let idx = map.index(coord).unwrap();
        assert_eq!(map.coord_at(idx), coord);
    }

    #[test]
    fn test_passable_for() {
        let mut tile = Tile::grass();
        assert!(tile.passable_for(1));
        tile.is_wall = true;
        tile.territory = Some(1);
        assert!(tile.passable_for(1));
        assert!(!tile.passable_for(2));
    }
}
