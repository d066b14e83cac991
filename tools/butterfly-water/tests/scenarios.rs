//! End-to-end classification and tiling scenarios

use butterfly_water::classify::{
    assume_land, calculate_coast_environment, fill_land, fill_water, fill_water_around_islands,
    mark_coast_cells,
};
use butterfly_water::coast::{Coast, CoastState};
use butterfly_water::generator::PreparedCoastlines;
use butterfly_water::ground::{build_crossing_tiles, build_ring_tiles};
use butterfly_water::level::StateMap;
use butterfly_water::resolver::coastline_data;
use butterfly_water::source::{NodeRecord, RawCoastline, TypedWay};
use butterfly_water::tile::CELL_MAX;
use butterfly_water::{
    CellData, Dataset, GeoBox, GeoCoord, Level, Pixel, State, TileType, WaterIndexConfig,
    WaterIndexGenerator, WaterIndexReader,
};
use tempfile::tempdir;

fn c(lat: f64, lon: f64) -> GeoCoord {
    GeoCoord::new(lat, lon)
}

fn config(min_mag: u32, max_mag: u32) -> WaterIndexConfig {
    WaterIndexConfig {
        min_mag,
        max_mag,
        min_area_pixel_size: 0.0,
        simplify_tolerance_px: 0.0,
        parallel_levels: false,
        ..Default::default()
    }
}

fn nodes(points: &[(i64, f64, f64)]) -> Vec<NodeRecord> {
    points.iter().map(|&(id, lat, lon)| NodeRecord { id, lat, lon }).collect()
}

/// Pentagon island inside cell (4,4) of magnification 3
fn island_dataset() -> Dataset {
    Dataset {
        bounding_box: GeoBox::new(c(-30.0, -50.0), c(50.0, 80.0)),
        nodes: nodes(&[
            (1, 5.0, 10.0),
            (2, 5.0, 30.0),
            (3, 10.0, 35.0),
            (4, 15.0, 20.0),
            (5, 10.0, 5.0),
        ]),
        coastlines: vec![RawCoastline {
            id: 1,
            is_area: true,
            nodes: vec![1, 2, 3, 4, 5, 1],
        }],
        data_polygons: Vec::new(),
        ways: Vec::new(),
    }
}

/// Eastbound shore at latitude -20 through cells (1,1) and (2,1) of
/// magnification 2; land to the north, water to the south. No point lies on a
/// cell border at magnifications 1 to 4.
fn shore_dataset() -> Dataset {
    Dataset {
        bounding_box: GeoBox::new(c(-80.0, -89.0), c(40.0, 89.0)),
        nodes: nodes(&[(1, -20.0, -130.0), (2, -20.0, -50.0), (3, -20.0, 130.0)]),
        coastlines: vec![RawCoastline {
            id: 7,
            is_area: false,
            nodes: vec![1, 2, 3],
        }],
        data_polygons: Vec::new(),
        ways: Vec::new(),
    }
}

fn has_corner(coords: &[butterfly_water::TileCoord], x: u16, y: u16) -> bool {
    coords.iter().any(|c| c.x == x && c.y == y)
}

fn cross(o: (i64, i64), a: (i64, i64), b: (i64, i64)) -> i64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Closed or open ring of a tile must not have two edges crossing each other
fn assert_simple_polygon(tile: &butterfly_water::GroundTile) {
    let mut points: Vec<(i64, i64)> =
        tile.coords.iter().map(|c| (c.x as i64, c.y as i64)).collect();
    if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) {
        if first != last {
            points.push(first);
        }
    }
    let edges: Vec<((i64, i64), (i64, i64))> = points.windows(2).map(|e| (e[0], e[1])).collect();

    for (i, &(p1, p2)) in edges.iter().enumerate() {
        for &(q1, q2) in &edges[i + 1..] {
            let straddles_q = cross(p1, p2, q1).signum() * cross(p1, p2, q2).signum() < 0;
            let straddles_p = cross(q1, q2, p1).signum() * cross(q1, q2, p2).signum() < 0;
            assert!(
                !(straddles_q && straddles_p),
                "edges {p1:?}-{p2:?} and {q1:?}-{q2:?} cross"
            );
        }
    }
}

#[test]
fn ring_inside_one_cell_becomes_single_land_tile() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("water.idx");
    let generator = WaterIndexGenerator::new(config(3, 3)).unwrap();
    let report = generator.generate(&island_dataset(), &path).unwrap();

    assert_eq!(report.levels[0].coast_cells, 1);
    assert_eq!(report.levels[0].tiles, 1);

    let mut reader = WaterIndexReader::open(&path).unwrap();
    match reader.cell(3, 4, 4).unwrap() {
        CellData::Tiles(tiles) => {
            assert_eq!(tiles.len(), 1);
            assert_eq!(tiles[0].tile_type, TileType::Land);
            assert_eq!(tiles[0].coords.len(), 5, "one vertex per ring point");
            assert!(tiles[0].coords.iter().all(|c| c.coast));
        }
        other => panic!("Expected tiles for the island cell, got {other:?}"),
    }
    assert_eq!(reader.cell(3, 3, 4).unwrap(), CellData::State(State::Unknown));
}

#[test]
fn shore_crossing_border_paints_both_sides() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("water.idx");
    let generator = WaterIndexGenerator::new(config(2, 2)).unwrap();
    let report = generator.generate(&shore_dataset(), &path).unwrap();
    assert_eq!(report.skipped_cells(), 0);

    let mut reader = WaterIndexReader::open(&path).unwrap();
    for x in [1, 2] {
        let data = reader.cell(2, x, 1).unwrap();
        let tiles = data.tiles();
        assert_eq!(tiles.len(), 2, "one tile per side in cell ({x},1)");

        let land = tiles.iter().find(|t| t.tile_type == TileType::Land).unwrap();
        assert!(
            has_corner(&land.coords, 0, CELL_MAX) && has_corner(&land.coords, CELL_MAX, CELL_MAX)
        );
        let water = tiles.iter().find(|t| t.tile_type == TileType::Water).unwrap();
        assert!(has_corner(&water.coords, 0, 0) && has_corner(&water.coords, CELL_MAX, 0));

        for tile in tiles {
            let first = tile.coords.first().unwrap();
            let last = tile.coords.last().unwrap();
            assert!(first.same_position(last), "walked tiles are closed");
            assert!(tile.coords.iter().all(|c| c.x <= CELL_MAX && c.y <= CELL_MAX));
            assert_simple_polygon(tile);
        }

        assert_eq!(
            reader.cell(2, x, 0).unwrap(),
            CellData::State(State::Water),
            "south of the shore"
        );
        assert_eq!(
            reader.cell(2, x, 2).unwrap(),
            CellData::State(State::Land),
            "north of the shore"
        );
    }
}

#[test]
fn written_index_matches_built_levels() {
    let dataset = shore_dataset();
    let dir = tempdir().unwrap();
    let path = dir.path().join("water.idx");
    let generator = WaterIndexGenerator::new(config(1, 3)).unwrap();
    generator.generate(&dataset, &path).unwrap();

    let lookup = dataset.node_lookup();
    let prepared = PreparedCoastlines::load(&dataset, &lookup).unwrap();
    let mut reader = WaterIndexReader::open(&path).unwrap();

    for mag in 1..=3 {
        let build =
            generator.build_level(mag, &dataset.bounding_box, &prepared, &[], &dataset.ways);
        for cell in build.level.cells() {
            let data = reader.cell(mag, cell.x, cell.y).unwrap();
            let expected = build.level.cell_tiles.get(&cell).cloned().unwrap_or_default();
            assert_eq!(data.tiles(), expected.as_slice(), "tiles of {cell} at level {mag}");
            if build.level.has_cell_data {
                assert_eq!(data.state(), build.level.state(cell), "state of {cell} at level {mag}");
            } else {
                assert_eq!(data.state(), build.level.default_state);
            }
        }
    }
}

/// 9 x 9 cells at magnification 4 from the south-west corner of the world
fn grid() -> Level {
    Level::new(4, &GeoBox::new(c(-90.0, -180.0), c(-90.0 + 8.5 * 11.25, -180.0 + 8.5 * 22.5)))
}

fn ring_distance(cell: Pixel) -> i64 {
    (cell.x as i64 - 4).abs().max((cell.y as i64 - 4).abs())
}

fn seeded_grid() -> Level {
    let mut level = grid();
    level.promote(Pixel::new(4, 4), State::Water);
    for cell in level.cells().collect::<Vec<_>>() {
        if ring_distance(cell) == 4 {
            level.promote(cell, State::Land);
        }
    }
    level
}

#[test]
fn flood_fill_reaches_land_ring_after_three_passes() {
    let mut level = seeded_grid();
    fill_water(&mut level, 3, &[]);
    for cell in level.cells() {
        let expected = if ring_distance(cell) == 4 { State::Land } else { State::Water };
        assert_eq!(level.state(cell), expected, "cell {cell}");
    }

    let mut once = seeded_grid();
    fill_water(&mut once, 1, &[]);
    for cell in once.cells() {
        let expected = match ring_distance(cell) {
            0 | 1 => State::Water,
            4 => State::Land,
            _ => State::Unknown,
        };
        assert_eq!(once.state(cell), expected, "cell {cell} after one pass");
    }
}

fn way(id: i64, points: Vec<GeoCoord>) -> Coast {
    Coast {
        id,
        is_area: false,
        front_node_id: id as u64 * 10,
        back_node_id: id as u64 * 10 + 1,
        points,
        left: CoastState::Land,
        right: CoastState::Water,
    }
}

#[test]
fn tripoint_joins_two_coastlines_into_one_tile() {
    let level = Level::new(2, &GeoBox::new(c(-44.0, -89.0), c(-1.0, 89.0)));
    let tripoint = c(-30.0, -45.0);
    let coasts = [
        way(1, vec![c(-22.5, -135.0), tripoint]),
        way(2, vec![tripoint, c(22.5, -45.0)]),
    ];
    let data = coastline_data(&level, &coasts, &config(2, 2));

    let build = build_crossing_tiles(&level, &data, 1000);
    assert_eq!(build.skipped_cells, 0);
    let tiles = &build.cell_tiles[&Pixel::new(1, 1)];
    tiles.iter().for_each(assert_simple_polygon);
    let land = tiles.iter().find(|t| t.tile_type == TileType::Land).unwrap();
    assert_eq!(land.coords.len(), 5);
    assert!(
        land.coords[0].coast && land.coords[1].coast,
        "land tile follows both coastlines up to the tripoint"
    );
}

/// Coastline at latitude -10 cut by a data polygon spanning latitude -30 to 30
/// and longitude -60 to 60
fn data_polygon_dataset() -> Dataset {
    Dataset {
        bounding_box: GeoBox::new(c(-80.0, -170.0), c(80.0, 170.0)),
        nodes: nodes(&[
            (1, -10.0, -130.0),
            (2, -10.0, -120.0),
            (3, -10.0, 130.0),
            (20, -30.0, -60.0),
            (21, -30.0, 60.0),
            (22, 30.0, 60.0),
            (23, 30.0, -60.0),
        ]),
        coastlines: vec![RawCoastline {
            id: 1,
            is_area: false,
            nodes: vec![1, 2, 3],
        }],
        data_polygons: vec![RawCoastline {
            id: 2,
            is_area: true,
            nodes: vec![20, 21, 22, 23, 20],
        }],
        ways: Vec::new(),
    }
}

#[test]
fn data_polygon_cut_gives_walkable_cells() {
    let dataset = data_polygon_dataset();
    let lookup = dataset.node_lookup();
    let prepared = PreparedCoastlines::load(&dataset, &lookup).unwrap();
    assert_eq!(prepared.coastlines.len(), 3, "coastline piece plus two data polygon arcs");

    let dir = tempdir().unwrap();
    let path = dir.path().join("water.idx");
    let generator = WaterIndexGenerator::new(config(2, 2)).unwrap();
    let report = generator.generate(&dataset, &path).unwrap();
    assert_eq!(report.data_polygons, 1);
    assert_eq!(report.skipped_cells(), 0);
    assert_eq!(report.levels[0].coast_cells, 4);

    let mut reader = WaterIndexReader::open(&path).unwrap();
    // Cells holding the tripoints are split three ways
    for (x, y, count) in [(1, 1, 3), (2, 1, 3), (1, 2, 2), (2, 2, 2)] {
        let data = reader.cell(2, x, y).unwrap();
        let tiles = data.tiles();
        assert_eq!(tiles.len(), count, "tiles of ({x},{y})");
        tiles.iter().for_each(assert_simple_polygon);
        assert!(tiles.iter().any(|t| t.tile_type == TileType::Land));
        assert!(tiles.iter().any(|t| t.tile_type == TileType::Unknown), "outside the data polygon");
    }

    for x in [1, 2] {
        let water = reader.cell(2, x, 1).unwrap();
        assert!(water.tiles().iter().any(|t| t.tile_type == TileType::Water));
    }
}

#[test]
fn missing_tripoint_partner_skips_cell() {
    let level = Level::new(2, &GeoBox::new(c(-44.0, -89.0), c(-1.0, 89.0)));
    let coasts = [way(1, vec![c(-22.5, -135.0), c(-30.0, -45.0)])];
    let data = coastline_data(&level, &coasts, &config(2, 2));

    for steps in [1, 1000] {
        let build = build_crossing_tiles(&level, &data, steps);
        assert_eq!(build.skipped_cells, 1);
        assert!(build.cell_tiles.is_empty());
    }
}

fn assert_monotonic(before: &StateMap, after: &StateMap, level: &Level, pass: &str) {
    for cell in level.cells() {
        let old = before.get(cell);
        if old != State::Unknown {
            assert_eq!(after.get(cell), old, "{pass} changed {cell}");
        }
    }
}

/// No row or column keeps a run of unknown cells between land and land/coast
fn assert_land_covered(level: &Level) {
    let rows = (level.cell_y_start..=level.cell_y_end).map(|y| {
        (level.cell_x_start..=level.cell_x_end)
            .map(|x| Pixel::new(x, y))
            .collect::<Vec<_>>()
    });
    let columns = (level.cell_x_start..=level.cell_x_end).map(|x| {
        (level.cell_y_start..=level.cell_y_end)
            .map(|y| Pixel::new(x, y))
            .collect::<Vec<_>>()
    });

    for line in rows.chain(columns) {
        let states: Vec<State> = line.iter().map(|cell| level.state(*cell)).collect();
        for start in 0..states.len() {
            if states[start] != State::Land {
                continue;
            }
            let end = (start + 1..states.len())
                .find(|i| states[*i] != State::Unknown)
                .unwrap_or(states.len());
            if end > start + 1 && end < states.len() {
                assert!(
                    !matches!(states[end], State::Land | State::Coast),
                    "unknown run between {} and {}",
                    line[start],
                    line[end]
                );
            }
        }
    }
}

#[test]
fn passes_never_overwrite_classified_cells() {
    let mut dataset = shore_dataset();
    dataset.nodes.extend(nodes(&[
        (10, 20.0, -70.0),
        (11, 20.0, -50.0),
        (12, 30.0, -60.0),
    ]));
    dataset.coastlines.push(RawCoastline {
        id: 8,
        is_area: true,
        nodes: vec![10, 11, 12, 10],
    });
    dataset.ways.push(TypedWay {
        type_name: "highway".into(),
        ignore_sea_land: false,
        tunnel: false,
        bridge: false,
        points: vec![c(30.0, -80.0), c(30.0, 80.0)],
    });

    let cfg = config(3, 4);
    let lookup = dataset.node_lookup();
    let prepared = PreparedCoastlines::load(&dataset, &lookup).unwrap();

    for mag in 3..=4 {
        let mut level = Level::new(mag, &dataset.bounding_box);
        let data = coastline_data(&level, &prepared.coastlines, &cfg);
        let mut before = level.snapshot();

        mark_coast_cells(&mut level, &data);
        assert_monotonic(&before, &level.snapshot(), &level, "mark coast");
        before = level.snapshot();

        let mut build = build_crossing_tiles(&level, &data, cfg.max_walk_steps);
        build_ring_tiles(&level, &data, &mut build.cell_tiles);
        level.cell_tiles = build.cell_tiles;

        calculate_coast_environment(&mut level);
        assert_monotonic(&before, &level.snapshot(), &level, "coast environment");
        before = level.snapshot();

        assume_land(&mut level, &dataset.ways);
        assert_monotonic(&before, &level.snapshot(), &level, "assume land");
        before = level.snapshot();

        fill_water(&mut level, cfg.fill_water_iterations, &[]);
        fill_water_around_islands(&mut level);
        assert_monotonic(&before, &level.snapshot(), &level, "fill water");
        before = level.snapshot();

        fill_land(&mut level);
        assert_monotonic(&before, &level.snapshot(), &level, "fill land");
        assert_land_covered(&level);
    }
}
