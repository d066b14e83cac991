//! Cell state passes
//!
//! Every pass only promotes cells that are still `Unknown`, so the passes are
//! monotonic: coast marking, environment inference from ground tiles,
//! land assumption from typed ways, water flood fill, water base under
//! islands and land interval fill.

use log::{debug, trace};

use crate::geometry::Area;
use crate::level::{CellBoundaries, Level, Pixel, State};
use crate::resolver::{path_cells, LevelCoastlines};
use crate::source::TypedWay;
use crate::tile::{GroundTile, TileCoord, TileType, CELL_MAX};

/// Mark every cell touched by a coastline as coast
pub fn mark_coast_cells(level: &mut Level, data: &LevelCoastlines) -> usize {
    let mut marked = 0;
    for coastline in &data.coastlines {
        for cell in path_cells(level, &coastline.points, coastline.is_area) {
            if level.promote(cell, State::Coast) {
                trace!("Coastline {} marks {} as coast", coastline.id, cell);
                marked += 1;
            }
        }
    }
    debug!("Level {}: {} coast cell(s)", level.magnification, marked);
    marked
}

fn tile_state(tile: &GroundTile) -> State {
    match tile.tile_type {
        TileType::Land => State::Land,
        TileType::Water => State::Water,
        TileType::Unknown | TileType::Coast => State::Unknown,
    }
}

fn is_edge(from: &TileCoord, to: &TileCoord, a: (u16, u16), b: (u16, u16)) -> bool {
    (from.x, from.y) == a && (to.x, to.y) == b
}

/// Side states implied by tiles running along a complete cell side:
/// top, right, bottom, left
fn side_states(tiles: &[GroundTile]) -> [State; 4] {
    let mut sides = [State::Unknown; 4];
    let edges = [
        ((0, CELL_MAX), (CELL_MAX, CELL_MAX)),
        ((CELL_MAX, CELL_MAX), (CELL_MAX, 0)),
        ((CELL_MAX, 0), (0, 0)),
        ((0, 0), (0, CELL_MAX)),
    ];

    for tile in tiles {
        let state = tile_state(tile);
        for pair in tile.coords.windows(2) {
            for (side, (a, b)) in edges.iter().enumerate() {
                if sides[side] == State::Unknown && is_edge(&pair[0], &pair[1], *a, *b) {
                    sides[side] = state;
                }
            }
        }
    }

    sides
}

const SIDE_OFFSETS: [(i64, i64); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

fn neighbour(level: &Level, cell: Pixel, offset: (i64, i64)) -> Option<Pixel> {
    let x = cell.x as i64 + offset.0;
    let y = cell.y as i64 + offset.1;
    if level.contains_xy(x, y) {
        Some(Pixel::new(x as u32, y as u32))
    } else {
        None
    }
}

fn sorted_tile_cells(level: &Level) -> Vec<Pixel> {
    let mut cells: Vec<Pixel> = level.cell_tiles.keys().copied().collect();
    cells.sort_by_key(|cell| (cell.y, cell.x));
    cells
}

/// Give unknown neighbours of tiled cells the state of a tile that fills the
/// whole shared side
pub fn calculate_coast_environment(level: &mut Level) -> usize {
    let mut assigned = 0;

    for cell in sorted_tile_cells(level) {
        let sides = match level.cell_tiles.get(&cell) {
            Some(tiles) => side_states(tiles),
            None => continue,
        };

        for (side, offset) in SIDE_OFFSETS.iter().enumerate() {
            if sides[side] == State::Unknown {
                continue;
            }
            if let Some(next) = neighbour(level, cell, *offset) {
                if level.promote(next, sides[side]) {
                    trace!("Assume {} next to coast cell {}: {}", sides[side], cell, next);
                    assigned += 1;
                }
            }
        }
    }

    debug!("Level {}: {} cell(s) set from coast environment", level.magnification, assigned);
    assigned
}

/// Cells crossed by ways whose presence implies dry land become land
pub fn assume_land(level: &mut Level, ways: &[TypedWay]) -> usize {
    let mut assumed = 0;
    for way in ways.iter().filter(|way| way.implies_land()) {
        for cell in path_cells(level, &way.points, false) {
            if level.promote(cell, State::Land) {
                trace!("Way of type {} defines {} as land", way.type_name, cell);
                assumed += 1;
            }
        }
    }
    debug!("Level {}: {} cell(s) assumed land", level.magnification, assumed);
    assumed
}

const NEIGHBOURHOOD: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Spread water into unknown neighbours (diagonals included) for a fixed
/// number of passes. Each pass reads the states as they were before it.
/// With data polygons, water cells with no corner inside any polygon do not
/// spread.
pub fn fill_water(level: &mut Level, iterations: usize, data_polygons: &[Area]) -> usize {
    let cells: Vec<Pixel> = level.cells().collect();
    let mut filled = 0;

    for iteration in 1..=iterations {
        let before = level.snapshot();
        let mut changed = 0;

        for cell in &cells {
            if before.get(*cell) != State::Water {
                continue;
            }

            if !data_polygons.is_empty() {
                let corners = CellBoundaries::new(level, *cell).border_points;
                if !data_polygons.iter().any(|polygon| polygon.covers_any(&corners)) {
                    continue;
                }
            }

            for offset in NEIGHBOURHOOD {
                let Some(next) = neighbour(level, *cell, offset) else {
                    continue;
                };
                if before.get(next) == State::Unknown && level.promote(next, State::Water) {
                    changed += 1;
                }
            }
        }

        trace!("Water fill pass {}: {} cell(s)", iteration, changed);
        filled += changed;
        if changed == 0 {
            break;
        }
    }

    debug!("Level {}: {} cell(s) filled with water", level.magnification, filled);
    filled
}

fn contains_position(tiles: &[GroundTile], coord: &TileCoord) -> bool {
    tiles.iter().flat_map(|t| t.coords.iter()).any(|c| c.same_position(coord))
}

/// Prepend a full water tile to tiled cells next to water when their tiles
/// do not reach both corners of the side facing the water
pub fn fill_water_around_islands(level: &mut Level) -> usize {
    // Corner indexes of the side facing each neighbour: top, right, bottom, left
    const SIDE_CORNERS: [(usize, usize); 4] = [(0, 1), (1, 2), (2, 3), (3, 0)];
    let mut based = 0;

    for cell in sorted_tile_cells(level) {
        let needs_base = match level.cell_tiles.get(&cell) {
            Some(tiles) => SIDE_OFFSETS.iter().zip(SIDE_CORNERS).any(|(offset, (c1, c2))| {
                let water_side = neighbour(level, cell, *offset)
                    .map(|next| level.state(next) == State::Water)
                    .unwrap_or(false);
                water_side
                    && (!contains_position(tiles, &CellBoundaries::border_coord(c1))
                        || !contains_position(tiles, &CellBoundaries::border_coord(c2)))
            }),
            None => false,
        };

        if needs_base {
            if let Some(tiles) = level.cell_tiles.get_mut(&cell) {
                trace!("Water base below islands in {}", cell);
                tiles.insert(0, GroundTile::full_cell(TileType::Water));
                based += 1;
            }
        }
    }

    debug!("Level {}: {} water base tile(s)", level.magnification, based);
    based
}

fn fill_line(level: &mut Level, line: &[Pixel]) -> usize {
    let mut filled = 0;
    let mut i = 0;

    while i < line.len() {
        if level.state(line[i]) != State::Land {
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < line.len() && level.state(line[end]) == State::Unknown {
            end += 1;
        }

        if end > start
            && end < line.len()
            && matches!(level.state(line[end]), State::Land | State::Coast)
        {
            for cell in &line[start..end] {
                if level.promote(*cell, State::Land) {
                    filled += 1;
                }
            }
        }

        i = end.max(i + 1);
    }

    filled
}

/// Unknown runs that start after land and end at land or coast, scanned per
/// row and per column, become land; repeated until nothing changes
pub fn fill_land(level: &mut Level) -> usize {
    let rows: Vec<Vec<Pixel>> = (level.cell_y_start..=level.cell_y_end)
        .map(|y| (level.cell_x_start..=level.cell_x_end).map(|x| Pixel::new(x, y)).collect())
        .collect();
    let columns: Vec<Vec<Pixel>> = (level.cell_x_start..=level.cell_x_end)
        .map(|x| (level.cell_y_start..=level.cell_y_end).map(|y| Pixel::new(x, y)).collect())
        .collect();

    let mut total = 0;
    loop {
        let mut changed = 0;
        for line in rows.iter().chain(columns.iter()) {
            changed += fill_line(level, line);
        }
        total += changed;
        if changed == 0 {
            break;
        }
    }

    debug!("Level {}: {} cell(s) filled with land", level.magnification, total);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeoBox, GeoCoord};

    /// 9 x 9 level at magnification 4 starting at the south-west corner
    fn grid() -> Level {
        let level = Level::new(
            4,
            &GeoBox::new(GeoCoord::new(-90.0, -180.0), GeoCoord::new(-90.0, -180.0)),
        );
        let w = level.cell_width;
        let h = level.cell_height;
        Level::new(
            4,
            &GeoBox::new(
                GeoCoord::new(-90.0, -180.0),
                GeoCoord::new(-90.0 + 8.5 * h, -180.0 + 8.5 * w),
            ),
        )
    }

    fn set(level: &mut Level, x: u32, y: u32, state: State) {
        assert!(level.promote(Pixel::new(x, y), state));
    }

    #[test]
    fn test_fill_land_between_land_and_coast() {
        let mut level = grid();
        set(&mut level, 0, 0, State::Land);
        set(&mut level, 5, 0, State::Coast);

        fill_land(&mut level);
        for x in 1..5 {
            assert_eq!(level.state(Pixel::new(x, 0)), State::Land);
        }
        assert_eq!(level.state(Pixel::new(6, 0)), State::Unknown, "open run stays unknown");
    }

    #[test]
    fn test_fill_land_needs_land_start() {
        let mut level = grid();
        set(&mut level, 0, 0, State::Coast);
        set(&mut level, 5, 0, State::Coast);

        fill_land(&mut level);
        assert_eq!(level.state(Pixel::new(2, 0)), State::Unknown);
    }

    #[test]
    fn test_fill_land_reaches_fixed_point() {
        let mut level = grid();
        // Land column on the left, coast column on the right, coast in row 8
        for y in 0..9 {
            set(&mut level, 0, y, State::Land);
            set(&mut level, 8, y, State::Coast);
        }
        fill_land(&mut level);
        assert!(level.cells().all(|cell| level.state(cell) != State::Unknown));
    }

    #[test]
    fn test_fill_water_ring_per_iteration() {
        let mut once = grid();
        set(&mut once, 4, 4, State::Water);
        fill_water(&mut once, 1, &[]);

        let ring = |level: &Level, r: i64| -> Vec<State> {
            level
                .cells()
                .filter(|c| {
                    let dx = (c.x as i64 - 4).abs();
                    let dy = (c.y as i64 - 4).abs();
                    dx.max(dy) == r
                })
                .map(|c| level.state(c))
                .collect()
        };

        assert!(ring(&once, 1).iter().all(|s| *s == State::Water));
        assert!(ring(&once, 2).iter().all(|s| *s == State::Unknown));
    }

    #[test]
    fn test_fill_water_respects_data_polygon() {
        let mut level = grid();
        set(&mut level, 4, 4, State::Water);
        let far_away = Area::new(&[
            GeoCoord::new(50.0, 50.0),
            GeoCoord::new(50.0, 60.0),
            GeoCoord::new(60.0, 60.0),
        ]);

        assert_eq!(fill_water(&mut level, 5, &[far_away]), 0);
    }

    #[test]
    fn test_fill_water_stops_past_data_polygon_edge() {
        let mut level = grid();
        let w = level.cell_width;
        let h = level.cell_height;
        set(&mut level, 0, 4, State::Water);

        // Western half: columns 0 to 3 and the left half of column 4
        let edge = -180.0 + 4.5 * w;
        let top = -90.0 + 9.5 * h;
        let west = Area::new(&[
            GeoCoord::new(-91.0, -181.0),
            GeoCoord::new(-91.0, edge),
            GeoCoord::new(top, edge),
            GeoCoord::new(top, -181.0),
        ]);

        assert_eq!(fill_water(&mut level, 20, &[west]), 9 * 6 - 1);
        for cell in level.cells() {
            let expected = if cell.x <= 5 { State::Water } else { State::Unknown };
            assert_eq!(level.state(cell), expected, "cell {cell}");
        }
    }

    #[test]
    fn test_environment_from_full_side() {
        let mut level = grid();
        let cell = Pixel::new(4, 4);
        set(&mut level, 4, 4, State::Coast);

        let mut south_land = GroundTile::new(TileType::Land);
        south_land.coords = vec![
            TileCoord::new(0, 2048, true),
            TileCoord::new(CELL_MAX, 2048, false),
            TileCoord::new(CELL_MAX, 0, false),
            TileCoord::new(0, 0, false),
            TileCoord::new(0, 2048, false),
        ];
        level.cell_tiles.insert(cell, vec![south_land]);

        calculate_coast_environment(&mut level);
        assert_eq!(level.state(Pixel::new(4, 3)), State::Land, "bottom side is fully land");
        assert_eq!(level.state(Pixel::new(4, 5)), State::Unknown);
        assert_eq!(level.state(Pixel::new(5, 4)), State::Unknown, "right side only half covered");
    }

    #[test]
    fn test_water_base_under_island() {
        let mut level = grid();
        set(&mut level, 4, 4, State::Coast);
        set(&mut level, 4, 3, State::Water);

        let mut island = GroundTile::new(TileType::Land);
        island.coords = vec![
            TileCoord::new(1000, 1000, true),
            TileCoord::new(2000, 1000, true),
            TileCoord::new(1500, 2000, true),
        ];
        level.cell_tiles.insert(Pixel::new(4, 4), vec![island]);

        assert_eq!(fill_water_around_islands(&mut level), 1);
        let tiles = &level.cell_tiles[&Pixel::new(4, 4)];
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].tile_type, TileType::Water);
        assert_eq!(tiles[0].coords.len(), 4);
    }

    #[test]
    fn test_assume_land_skips_bridges() {
        let mut level = grid();
        let w = level.cell_width;
        let h = level.cell_height;
        let points = vec![
            GeoCoord::new(-90.0 + 0.5 * h, -180.0 + 0.5 * w),
            GeoCoord::new(-90.0 + 0.5 * h, -180.0 + 2.5 * w),
        ];
        let road = TypedWay {
            type_name: "highway".into(),
            ignore_sea_land: false,
            tunnel: false,
            bridge: false,
            points: points.clone(),
        };
        let bridge = TypedWay {
            bridge: true,
            points: points.iter().map(|p| GeoCoord::new(p.lat + 2.0 * h, p.lon)).collect(),
            ..road.clone()
        };

        assert_eq!(assume_land(&mut level, &[road, bridge]), 3);
        assert_eq!(level.state(Pixel::new(1, 0)), State::Land);
        assert_eq!(level.state(Pixel::new(1, 2)), State::Unknown);
    }
}
