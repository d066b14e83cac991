//! Grid levels
//!
//! One `Level` per magnification: cell size in degrees, the absolute cell
//! rectangle covering the dataset bounding box, a packed 2-bit state per cell
//! and the ground tiles built for coast cells.

use rustc_hash::FxHashMap;

use crate::geometry::{GeoBox, GeoCoord};
use crate::tile::{GroundTile, TileCoord, CELL_CORNERS};

/// Absolute cell coordinate on the world grid of a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
}

impl Pixel {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Pixel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Classification of a cell
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Unknown = 0,
    Land = 1,
    Water = 2,
    Coast = 3,
}

impl State {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(State::Unknown),
            1 => Some(State::Land),
            2 => Some(State::Water),
            3 => Some(State::Coast),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            State::Unknown => "unknown",
            State::Land => "land",
            State::Water => "water",
            State::Coast => "coast",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Packed 2-bit-per-cell state bitmap over a cell rectangle, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMap {
    x_start: u32,
    y_start: u32,
    x_count: u32,
    y_count: u32,
    bits: Vec<u8>,
}

impl StateMap {
    pub fn new(x_start: u32, y_start: u32, x_count: u32, y_count: u32) -> Self {
        let cells = x_count as usize * y_count as usize;
        Self {
            x_start,
            y_start,
            x_count,
            y_count,
            bits: vec![0u8; cells.div_ceil(4)],
        }
    }

    pub fn contains(&self, cell: Pixel) -> bool {
        cell.x >= self.x_start
            && cell.y >= self.y_start
            && cell.x - self.x_start < self.x_count
            && cell.y - self.y_start < self.y_count
    }

    fn slot(&self, cell: Pixel) -> (usize, u32) {
        let id = (cell.y - self.y_start) as usize * self.x_count as usize
            + (cell.x - self.x_start) as usize;
        (id / 4, 2 * (id % 4) as u32)
    }

    /// State of a cell, `Unknown` outside the rectangle
    pub fn get(&self, cell: Pixel) -> State {
        if !self.contains(cell) {
            return State::Unknown;
        }
        let (byte, shift) = self.slot(cell);
        match (self.bits[byte] >> shift) & 0x03 {
            1 => State::Land,
            2 => State::Water,
            3 => State::Coast,
            _ => State::Unknown,
        }
    }

    fn set(&mut self, cell: Pixel, state: State) {
        let (byte, shift) = self.slot(cell);
        self.bits[byte] = (self.bits[byte] & !(0x03 << shift)) | (state.as_u8() << shift);
    }

    /// Write `state` only if the cell is inside and still unknown
    pub fn promote(&mut self, cell: Pixel, state: State) -> bool {
        if state == State::Unknown || !self.contains(cell) || self.get(cell) != State::Unknown {
            return false;
        }
        self.set(cell, state);
        true
    }
}

/// Cell extent and border geometry.
///
/// Border points are the corners in clockwise order starting top-left; border
/// `i` is the edge from corner `i` to corner `(i + 1) % 4`: 0 top, 1 right,
/// 2 bottom, 3 left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBoundaries {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub border_points: [GeoCoord; 4],
}

impl CellBoundaries {
    pub fn new(level: &Level, cell: Pixel) -> Self {
        let lon_min = cell.x as f64 * level.cell_width - 180.0;
        let lon_max = (cell.x + 1) as f64 * level.cell_width - 180.0;
        let lat_min = cell.y as f64 * level.cell_height - 90.0;
        let lat_max = (cell.y + 1) as f64 * level.cell_height - 90.0;

        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            border_points: [
                GeoCoord::new(lat_max, lon_min),
                GeoCoord::new(lat_max, lon_max),
                GeoCoord::new(lat_min, lon_max),
                GeoCoord::new(lat_min, lon_min),
            ],
        }
    }

    /// Endpoints of border `index`
    pub fn border(&self, index: usize) -> (GeoCoord, GeoCoord) {
        (self.border_points[index], self.border_points[(index + 1) % 4])
    }

    /// Fixed-point corner at the start of border `index`
    pub fn border_coord(index: usize) -> TileCoord {
        CELL_CORNERS[index % 4]
    }
}

/// One magnification level of the water index
#[derive(Debug, Clone)]
pub struct Level {
    pub magnification: u32,
    pub cell_width: f64,
    pub cell_height: f64,
    pub cell_x_start: u32,
    pub cell_x_end: u32,
    pub cell_y_start: u32,
    pub cell_y_end: u32,
    pub cell_x_count: u32,
    pub cell_y_count: u32,
    /// State written for every cell when the level carries no cell data
    pub default_state: State,
    pub has_cell_data: bool,
    pub cell_tiles: FxHashMap<Pixel, Vec<GroundTile>>,
    states: StateMap,
}

impl Level {
    pub fn new(magnification: u32, bbox: &GeoBox) -> Self {
        let cells_per_axis = 1u32 << magnification;
        let cell_width = 360.0 / cells_per_axis as f64;
        let cell_height = 180.0 / cells_per_axis as f64;
        let last = cells_per_axis - 1;

        let to_cell =
            |value: f64, size: f64| -> u32 { ((value / size).floor().max(0.0) as u32).min(last) };

        let cell_x_start = to_cell(bbox.min_lon + 180.0, cell_width);
        let cell_x_end = to_cell(bbox.max_lon + 180.0, cell_width);
        let cell_y_start = to_cell(bbox.min_lat + 90.0, cell_height);
        let cell_y_end = to_cell(bbox.max_lat + 90.0, cell_height);
        let cell_x_count = cell_x_end - cell_x_start + 1;
        let cell_y_count = cell_y_end - cell_y_start + 1;

        Self {
            magnification,
            cell_width,
            cell_height,
            cell_x_start,
            cell_x_end,
            cell_y_start,
            cell_y_end,
            cell_x_count,
            cell_y_count,
            default_state: State::Unknown,
            has_cell_data: false,
            cell_tiles: FxHashMap::default(),
            states: StateMap::new(cell_x_start, cell_y_start, cell_x_count, cell_y_count),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cell_x_count as usize * self.cell_y_count as usize
    }

    pub fn contains(&self, cell: Pixel) -> bool {
        self.states.contains(cell)
    }

    /// Signed variant for neighbour arithmetic
    pub fn contains_xy(&self, x: i64, y: i64) -> bool {
        x >= self.cell_x_start as i64
            && x <= self.cell_x_end as i64
            && y >= self.cell_y_start as i64
            && y <= self.cell_y_end as i64
    }

    pub fn state(&self, cell: Pixel) -> State {
        self.states.get(cell)
    }

    /// Set a cell that is still unknown; returns whether it changed
    pub fn promote(&mut self, cell: Pixel, state: State) -> bool {
        self.states.promote(cell, state)
    }

    /// Frozen copy of the current states
    pub fn snapshot(&self) -> StateMap {
        self.states.clone()
    }

    /// Absolute cell index of a coordinate, may lie outside the level rectangle
    pub fn cell_index(&self, point: GeoCoord) -> (i64, i64) {
        (
            ((point.lon + 180.0) / self.cell_width).floor() as i64,
            ((point.lat + 90.0) / self.cell_height).floor() as i64,
        )
    }

    pub fn boundaries(&self, cell: Pixel) -> CellBoundaries {
        CellBoundaries::new(self, cell)
    }

    /// All cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = Pixel> + '_ {
        (self.cell_y_start..=self.cell_y_end)
            .flat_map(move |y| (self.cell_x_start..=self.cell_x_end).map(move |x| Pixel::new(x, y)))
    }

    /// Cell counts indexed by state value
    pub fn state_counts(&self) -> [usize; 4] {
        let mut counts = [0usize; 4];
        for cell in self.cells() {
            counts[self.state(cell).as_u8() as usize] += 1;
        }
        counts
    }

    /// Derive `default_state` and `has_cell_data` from the classified grid
    pub fn finish(&mut self) {
        self.default_state = self.state(Pixel::new(self.cell_x_start, self.cell_y_start));
        self.has_cell_data = !self.cell_tiles.is_empty()
            || self.cells().any(|cell| self.state(cell) != self.default_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> GeoBox {
        GeoBox::new(GeoCoord::new(-90.0, -180.0), GeoCoord::new(90.0, 180.0))
    }

    #[test]
    fn test_level_geometry() {
        let level = Level::new(2, &world());
        assert_eq!(level.cell_width, 90.0);
        assert_eq!(level.cell_height, 45.0);
        assert_eq!((level.cell_x_start, level.cell_x_end), (0, 3));
        assert_eq!((level.cell_y_start, level.cell_y_end), (0, 3));
        assert_eq!(level.cell_count(), 16);
    }

    #[test]
    fn test_level_rectangle_from_bbox() {
        let bbox = GeoBox::new(GeoCoord::new(0.5, 0.5), GeoCoord::new(2.5, 1.5));
        let level = Level::new(8, &bbox);
        let w = level.cell_width;
        assert_eq!(level.cell_x_start, ((0.5 + 180.0) / w).floor() as u32);
        assert_eq!(level.cell_x_end, ((1.5 + 180.0) / w).floor() as u32);
        assert!(level.contains(Pixel::new(level.cell_x_start, level.cell_y_start)));
        assert!(!level.contains(Pixel::new(level.cell_x_end + 1, level.cell_y_start)));
    }

    #[test]
    fn test_promote_is_monotonic() {
        let mut level = Level::new(2, &world());
        let cell = Pixel::new(1, 2);

        assert!(level.promote(cell, State::Coast));
        assert!(!level.promote(cell, State::Water), "coast must never be replaced");
        assert_eq!(level.state(cell), State::Coast);
        assert!(!level.promote(Pixel::new(9, 9), State::Land), "outside cells are ignored");
    }

    #[test]
    fn test_packing_keeps_neighbours() {
        let mut level = Level::new(3, &world());
        let cells: Vec<Pixel> = level.cells().take(9).collect();
        let states = [State::Land, State::Water, State::Coast];
        for (i, cell) in cells.iter().enumerate() {
            level.promote(*cell, states[i % 3]);
        }
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(level.state(*cell), states[i % 3]);
        }
        assert_eq!(level.state(Pixel::new(1, 1)), State::Unknown);
    }

    #[test]
    fn test_cell_boundaries_clockwise() {
        let level = Level::new(1, &world());
        let b = level.boundaries(Pixel::new(1, 1));
        assert_eq!(b.border_points[0], GeoCoord::new(90.0, 0.0));
        assert_eq!(b.border_points[1], GeoCoord::new(90.0, 180.0));
        assert_eq!(b.border_points[2], GeoCoord::new(0.0, 180.0));
        assert_eq!(b.border_points[3], GeoCoord::new(0.0, 0.0));
        assert_eq!(b.border(3), (GeoCoord::new(0.0, 0.0), GeoCoord::new(90.0, 0.0)));
    }

    #[test]
    fn test_finish_uniform_level() {
        let mut level = Level::new(2, &world());
        for cell in level.cells().collect::<Vec<_>>() {
            level.promote(cell, State::Water);
        }
        level.finish();
        assert_eq!(level.default_state, State::Water);
        assert!(!level.has_cell_data);

        let mut mixed = Level::new(2, &world());
        mixed.promote(Pixel::new(3, 3), State::Land);
        mixed.finish();
        assert_eq!(mixed.default_state, State::Unknown);
        assert!(mixed.has_cell_data);
    }
}
