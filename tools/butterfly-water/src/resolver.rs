//! Coastline to cell resolution
//!
//! For one level every coastline is projected, filtered and thinned, then
//! each of its segments is intersected with the borders of all cells spanned
//! by the segment. Crossings are recorded per cell with a direction relative
//! to the walk along the coastline.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::coast::{Coast, CoastState};
use crate::config::WaterIndexConfig;
use crate::geometry::{
    distance_square, line_intersection, lines_intersect, segment_count, GeoBox, GeoCoord,
};
use crate::level::{CellBoundaries, Level, Pixel};
use crate::projection::MercatorProjection;

/// How the coastline passes a cell border
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    Touch,
}

/// Coastline crossing of a cell border
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Index into `LevelCoastlines::coastlines`
    pub coastline: usize,
    /// Index of the segment start point on the coastline
    pub prev_index: usize,
    pub point: GeoCoord,
    /// Squared distance from the segment start
    pub distance_square: f64,
    pub direction: Direction,
    /// 0 top, 1 right, 2 bottom, 3 left
    pub border_index: usize,
}

/// A coastline prepared for one level
#[derive(Debug, Clone)]
pub struct CoastlineData {
    pub id: i64,
    pub is_area: bool,
    pub left: CoastState,
    pub right: CoastState,
    /// Thinned points; areas do not repeat the first point
    pub points: Vec<GeoCoord>,
    pub is_completely_in_cell: bool,
    /// The single cell holding the coastline, when completely in one
    pub cell: Option<Pixel>,
    pub cell_intersections: FxHashMap<Pixel, Vec<Intersection>>,
}

/// All coastlines of one level plus per-cell indexes
#[derive(Debug, Clone, Default)]
pub struct LevelCoastlines {
    pub coastlines: Vec<CoastlineData>,
    /// Cells crossed by coastlines, value lists coastline indexes in order
    pub cell_coastlines: FxHashMap<Pixel, Vec<usize>>,
    /// Cells holding complete coastlines
    pub cell_covered_coastlines: FxHashMap<Pixel, Vec<usize>>,
}

fn cell_span(level: &Level, a: GeoCoord, b: GeoCoord) -> ((i64, i64), (i64, i64)) {
    (level.cell_index(a), level.cell_index(b))
}

fn span_cells(c1: (i64, i64), c2: (i64, i64)) -> impl Iterator<Item = (i64, i64)> {
    let (x_min, x_max) = (c1.0.min(c2.0), c1.0.max(c2.0));
    let (y_min, y_max) = (c1.1.min(c2.1), c1.1.max(c2.1));
    (x_min..=x_max).flat_map(move |x| (y_min..=y_max).map(move |y| (x, y)))
}

fn to_pixel(x: i64, y: i64) -> Option<Pixel> {
    if x < 0 || y < 0 || x > u32::MAX as i64 || y > u32::MAX as i64 {
        return None;
    }
    Some(Pixel::new(x as u32, y as u32))
}

/// Cells touched by segment a-b: the start cell plus every spanned cell
/// whose border the segment intersects
pub fn segment_cells(level: &Level, a: GeoCoord, b: GeoCoord, cells: &mut FxHashSet<Pixel>) {
    let (c1, c2) = cell_span(level, a, b);

    if let Some(start) = to_pixel(c1.0, c1.1) {
        cells.insert(start);
    }
    if c1 == c2 {
        return;
    }

    for (x, y) in span_cells(c1, c2) {
        let Some(cell) = to_pixel(x, y) else {
            continue;
        };
        if cells.contains(&cell) {
            continue;
        }
        let boundaries = CellBoundaries::new(level, cell);
        if (0..4).any(|border| {
            let (p1, p2) = boundaries.border(border);
            lines_intersect(a, b, p1, p2)
        }) {
            cells.insert(cell);
        }
    }
}

/// Cells touched by a path, closing segment included for rings
pub fn path_cells(level: &Level, points: &[GeoCoord], closed: bool) -> FxHashSet<Pixel> {
    let mut cells = FxHashSet::default();
    let count = segment_count(points.len(), closed);
    for index in 0..count {
        segment_cells(level, points[index], points[(index + 1) % points.len()], &mut cells);
    }
    cells
}

/// Border crossings of every segment of a path, grouped by cell.
/// Cells outside the level are ignored.
pub fn cell_intersections(
    level: &Level,
    points: &[GeoCoord],
    closed: bool,
    coastline: usize,
) -> FxHashMap<Pixel, Vec<Intersection>> {
    let mut result: FxHashMap<Pixel, Vec<Intersection>> = FxHashMap::default();
    let count = segment_count(points.len(), closed);

    for p in 0..count {
        let a = points[p];
        let b = points[(p + 1) % points.len()];
        let (c1, c2) = cell_span(level, a, b);
        if c1 == c2 {
            continue;
        }

        for (x, y) in span_cells(c1, c2) {
            if !level.contains_xy(x, y) {
                continue;
            }
            let Some(cell) = to_pixel(x, y) else {
                continue;
            };
            let boundaries = CellBoundaries::new(level, cell);

            // First crossing found, then a second one on a later border
            let mut found: Vec<Intersection> = Vec::with_capacity(2);
            for border in 0..4 {
                if found.len() == 2 {
                    break;
                }
                let (p1, p2) = boundaries.border(border);
                if let Some(point) = line_intersection(a, b, p1, p2) {
                    found.push(Intersection {
                        coastline,
                        prev_index: p,
                        point,
                        distance_square: distance_square(a, point),
                        direction: Direction::Touch,
                        border_index: border,
                    });
                }
            }

            let is_start = (x, y) == c1;
            let is_end = (x, y) == c2;

            match found.len() {
                1 => {
                    found[0].direction = if is_start {
                        Direction::Out
                    } else if is_end {
                        Direction::In
                    } else {
                        Direction::Touch
                    };
                }
                2 => {
                    if found[0].distance_square > found[1].distance_square {
                        found.swap(0, 1);
                    }
                    found[0].direction = Direction::In;
                    found[1].direction = Direction::Out;
                }
                _ => continue,
            }

            result.entry(cell).or_default().extend(found);
        }
    }

    result
}

/// Project, filter and resolve all coastlines for a level
pub fn coastline_data(
    level: &Level,
    coastlines: &[Coast],
    config: &WaterIndexConfig,
) -> LevelCoastlines {
    let projection = MercatorProjection::new(level.magnification);
    let mut data = LevelCoastlines::default();
    let mut dropped_areas = 0usize;

    for coast in coastlines {
        if coast.is_area {
            let (width, height) = projection.pixel_extent(&coast.points);
            if width <= config.min_area_pixel_size || height <= config.min_area_pixel_size {
                dropped_areas += 1;
                continue;
            }
        }

        let points = projection.thin(&coast.points, config.simplify_tolerance_px);
        if (coast.is_area && points.len() < 3) || points.len() < 2 {
            dropped_areas += usize::from(coast.is_area);
            continue;
        }

        let index = data.coastlines.len();
        let mut record = CoastlineData {
            id: coast.id,
            is_area: coast.is_area,
            left: coast.left,
            right: coast.right,
            points,
            is_completely_in_cell: false,
            cell: None,
            cell_intersections: FxHashMap::default(),
        };

        let single_cell = GeoBox::from_points(&coast.points).and_then(|bbox| {
            let min = level.cell_index(bbox.min_coord());
            let max = level.cell_index(bbox.max_coord());
            if min == max {
                Some(min)
            } else {
                None
            }
        });

        match single_cell {
            Some((x, y)) => {
                record.is_completely_in_cell = true;
                record.cell = to_pixel(x, y);
                if let Some(cell) = record.cell.filter(|cell| level.contains(*cell)) {
                    data.cell_covered_coastlines.entry(cell).or_default().push(index);
                }
            }
            None => {
                record.cell_intersections =
                    cell_intersections(level, &record.points, record.is_area, index);
                for cell in record.cell_intersections.keys() {
                    data.cell_coastlines.entry(*cell).or_default().push(index);
                }
            }
        }

        data.coastlines.push(record);
    }

    debug!(
        "Level {}: {} coastline(s), {} small area(s) dropped, {} crossed cell(s)",
        level.magnification,
        data.coastlines.len(),
        dropped_areas,
        data.cell_coastlines.len()
    );

    data
}
