//! Ground tiles: typed polygons in fixed-point cell-local coordinates

use crate::geometry::GeoCoord;

/// Largest cell-local coordinate value (12 bits)
pub const CELL_MAX: u16 = 4095;

/// Flag bit marking a coastline edge in the serialized x word
pub const COAST_FLAG: u16 = 0x8000;

/// Kind of ground a tile paints
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileType {
    Unknown = 0,
    Land = 1,
    Water = 2,
    Coast = 3,
}

impl TileType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TileType::Unknown),
            1 => Some(TileType::Land),
            2 => Some(TileType::Water),
            3 => Some(TileType::Coast),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Vertex of a ground tile. `coast` is set when the edge to the next vertex
/// follows a coastline rather than the cell border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u16,
    pub y: u16,
    pub coast: bool,
}

impl TileCoord {
    pub const fn new(x: u16, y: u16, coast: bool) -> Self {
        Self { x, y, coast }
    }

    /// Same position, coast flag ignored
    pub fn same_position(&self, other: &TileCoord) -> bool {
        self.x == other.x && self.y == other.y
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroundTile {
    pub tile_type: TileType,
    pub coords: Vec<TileCoord>,
}

impl GroundTile {
    pub fn new(tile_type: TileType) -> Self {
        Self {
            tile_type,
            coords: Vec::new(),
        }
    }

    /// Tile covering the whole cell
    pub fn full_cell(tile_type: TileType) -> Self {
        Self {
            tile_type,
            coords: CELL_CORNERS.to_vec(),
        }
    }
}

/// Cell corners in border order: top-left, top-right, bottom-right, bottom-left
pub const CELL_CORNERS: [TileCoord; 4] = [
    TileCoord::new(0, CELL_MAX, false),
    TileCoord::new(CELL_MAX, CELL_MAX, false),
    TileCoord::new(CELL_MAX, 0, false),
    TileCoord::new(0, 0, false),
];

/// Map a geographic position into cell-local fixed point, clamped to the cell
pub fn transform(
    point: GeoCoord,
    cell_min_lat: f64,
    cell_min_lon: f64,
    cell_width: f64,
    cell_height: f64,
    coast: bool,
) -> TileCoord {
    let scale = |value: f64| -> u16 {
        let scaled = (value * CELL_MAX as f64 + 0.5).floor();
        scaled.clamp(0.0, CELL_MAX as f64) as u16
    };

    TileCoord {
        x: scale((point.lon - cell_min_lon) / cell_width),
        y: scale((point.lat - cell_min_lat) / cell_height),
        coast,
    }
}
