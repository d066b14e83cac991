//! Ground tile construction
//!
//! For each cell crossed by coastlines the border crossings are sorted
//! clockwise and walked: along a coastline from a crossing to its sibling,
//! then clockwise along the cell border to the next crossing, until the
//! polygon closes. Coastlines ending inside the cell are spliced at shared
//! endpoints (tripoints). Rings lying completely inside a cell become tiles
//! on their own.

use log::{error, trace};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::coast::CoastState;
use crate::geometry::GeoCoord;
use crate::level::{CellBoundaries, Level, Pixel};
use crate::resolver::{Direction, Intersection, LevelCoastlines};
use crate::tile::{transform, GroundTile, TileCoord, TileType};

/// Why the boundary walk of a cell was abandoned
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalkError {
    #[error("no sibling crossing for area coastline {coastline} at {point}")]
    NoSibling { coastline: i64, point: GeoCoord },

    #[error("no coastline continues coastline {coastline} at tripoint {point}")]
    NoTripoint { coastline: i64, point: GeoCoord },

    #[error("walk exceeded {0} steps")]
    TooManySteps(usize),
}

/// Tiles of one level plus the number of cells that could not be walked
#[derive(Debug, Default)]
pub struct TileBuild {
    pub cell_tiles: FxHashMap<Pixel, Vec<GroundTile>>,
    pub skipped_cells: usize,
}

fn tile_type(state: CoastState) -> TileType {
    match state {
        CoastState::Land => TileType::Land,
        CoastState::Water => TileType::Water,
        CoastState::Unknown | CoastState::Undefined => TileType::Unknown,
    }
}

/// Is `b` clockwise after `a` on border `border`
fn is_left_on_same_border(border: usize, a: GeoCoord, b: GeoCoord) -> bool {
    match border {
        0 => b.lon >= a.lon,
        1 => b.lat <= a.lat,
        2 => b.lon <= a.lon,
        _ => b.lat >= a.lat,
    }
}

/// Clockwise order around the cell starting at the top-left corner
fn clockwise_order(a: &Intersection, b: &Intersection) -> std::cmp::Ordering {
    a.border_index.cmp(&b.border_index).then_with(|| match a.border_index {
        0 => a.point.lon.total_cmp(&b.point.lon),
        1 => b.point.lat.total_cmp(&a.point.lat),
        2 => b.point.lon.total_cmp(&a.point.lon),
        _ => a.point.lat.total_cmp(&b.point.lat),
    })
}

/// Position of an intersection along its coastline
fn path_key(intersection: &Intersection) -> (usize, f64) {
    (intersection.prev_index, intersection.distance_square)
}

fn key_cmp(a: (usize, f64), b: (usize, f64)) -> std::cmp::Ordering {
    a.0.cmp(&b.0).then(a.1.total_cmp(&b.1))
}

/// Append a vertex, merging it into the previous one at the same position
fn push_coord(tile: &mut GroundTile, coord: TileCoord) {
    if let Some(last) = tile.coords.last_mut() {
        if last.same_position(&coord) {
            last.coast = coord.coast;
            return;
        }
    }
    tile.coords.push(coord);
}

struct Splice {
    path_end: Intersection,
    start_next: Intersection,
    end_next: usize,
}

struct CellWalker<'a> {
    level: &'a Level,
    boundaries: CellBoundaries,
    data: &'a LevelCoastlines,
    /// Crossings of all coastlines in clockwise order, touches excluded
    intersections: Vec<Intersection>,
    max_steps: usize,
}

impl<'a> CellWalker<'a> {
    fn new(
        level: &'a Level,
        cell: Pixel,
        data: &'a LevelCoastlines,
        coastlines: &[usize],
        max_steps: usize,
    ) -> Self {
        let mut intersections: Vec<Intersection> = coastlines
            .iter()
            .filter_map(|index| data.coastlines[*index].cell_intersections.get(&cell))
            .flatten()
            .filter(|intersection| intersection.direction != Direction::Touch)
            .copied()
            .collect();
        intersections.sort_by(clockwise_order);

        Self {
            level,
            boundaries: level.boundaries(cell),
            data,
            intersections,
            max_steps,
        }
    }

    fn transform(&self, point: GeoCoord, coast: bool) -> TileCoord {
        transform(
            point,
            self.boundaries.lat_min,
            self.boundaries.lon_min,
            self.level.cell_width,
            self.level.cell_height,
            coast,
        )
    }

    fn walk_all(&self) -> Result<Vec<GroundTile>, WalkError> {
        let mut visited = vec![false; self.intersections.len()];
        let mut tiles = Vec::new();

        for start in 0..self.intersections.len() {
            if visited[start] {
                continue;
            }
            let intersection = &self.intersections[start];
            let coastline = &self.data.coastlines[intersection.coastline];
            let state = match intersection.direction {
                Direction::In => coastline.right,
                _ => coastline.left,
            };

            let mut tile = GroundTile::new(tile_type(state));
            self.walk_boundary(&mut tile, start, &mut visited)?;
            tiles.push(tile);
        }

        Ok(tiles)
    }

    /// Nearest crossing of the same coastline in the opposite direction:
    /// forward along the path for `In`, backward for `Out`. Areas wrap.
    fn find_sibling(&self, index: usize) -> Option<usize> {
        let current = &self.intersections[index];
        let wanted = match current.direction {
            Direction::In => Direction::Out,
            _ => Direction::In,
        };
        let is_area = self.data.coastlines[current.coastline].is_area;
        let here = path_key(current);

        let candidates = || {
            self.intersections
                .iter()
                .enumerate()
                .filter(move |(_, i)| i.coastline == current.coastline && i.direction == wanted)
                .map(|(n, i)| (n, path_key(i)))
        };

        let found = if current.direction == Direction::In {
            candidates()
                .filter(|(_, key)| key_cmp(*key, here).is_ge())
                .min_by(|a, b| key_cmp(a.1, b.1))
        } else {
            candidates()
                .filter(|(_, key)| key_cmp(*key, here).is_le())
                .max_by(|a, b| key_cmp(a.1, b.1))
        };

        if found.is_some() || !is_area {
            return found.map(|(n, _)| n);
        }

        let wrapped = if current.direction == Direction::In {
            candidates().min_by(|a, b| key_cmp(a.1, b.1))
        } else {
            candidates().max_by(|a, b| key_cmp(a.1, b.1))
        };
        wrapped.map(|(n, _)| n)
    }

    /// Continue across the shared endpoint of two coastline ways
    fn find_tripoint(&self, start: usize) -> Result<Splice, WalkError> {
        let path_start = &self.intersections[start];
        let coastline = &self.data.coastlines[path_start.coastline];
        let tripoint = match path_start.direction {
            Direction::In => coastline.points[coastline.points.len() - 1],
            _ => coastline.points[0],
        };
        let count = self.intersections.len();

        let mut best: Option<(usize, usize)> = None;
        for (i, intersection) in self.intersections.iter().enumerate() {
            let other = &self.data.coastlines[intersection.coastline];
            if intersection.coastline == path_start.coastline || other.is_area {
                continue;
            }
            let endpoint = match intersection.direction {
                Direction::In => other.points[other.points.len() - 1],
                _ => other.points[0],
            };
            if endpoint != tripoint {
                continue;
            }
            // nearest counter-clockwise from the start
            let distance = if i > start { count - (i - start) } else { start - i };
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        let Some((mut end_next, _)) = best else {
            return Err(WalkError::NoTripoint {
                coastline: coastline.id,
                point: tripoint,
            });
        };

        let first = self.intersections[end_next];
        for (i, intersection) in self.intersections.iter().enumerate() {
            if intersection.coastline != first.coastline
                || intersection.direction != first.direction
            {
                continue;
            }
            let current = self.intersections[end_next].prev_index;
            let closer = match first.direction {
                Direction::In => intersection.prev_index > current,
                _ => intersection.prev_index < current,
            };
            if closer {
                end_next = i;
            }
        }

        let next = &self.intersections[end_next];
        let next_coastline = &self.data.coastlines[next.coastline];

        let synthetic = |on: &Intersection, len: usize| Intersection {
            coastline: on.coastline,
            prev_index: if on.direction == Direction::In { len - 1 } else { 0 },
            point: tripoint,
            distance_square: 0.0,
            direction: if on.direction == Direction::In {
                Direction::Out
            } else {
                Direction::In
            },
            border_index: 0,
        };

        Ok(Splice {
            path_end: synthetic(path_start, coastline.points.len()),
            start_next: synthetic(next, next_coastline.points.len()),
            end_next,
        })
    }

    /// Follow the coastline from `start` to `end`
    fn walk_path(&self, tile: &mut GroundTile, start: &Intersection, end: &Intersection) {
        if let Some(last) = tile.coords.last_mut() {
            last.coast = true;
        }

        let coastline = &self.data.coastlines[start.coastline];
        let points = &coastline.points;
        let n = points.len();
        let (a, b) = (start.prev_index, end.prev_index);

        match (start.direction, coastline.is_area) {
            (Direction::Out, true) => {
                if !(a == b && start.distance_square >= end.distance_square) {
                    let k = match (a + n - b) % n {
                        0 => n,
                        k => k,
                    };
                    for i in 0..k {
                        push_coord(tile, self.transform(points[(a + n - i) % n], true));
                    }
                }
            }
            (Direction::Out, false) => {
                for idx in (b + 1..=a).rev() {
                    push_coord(tile, self.transform(points[idx], true));
                }
            }
            (_, true) => {
                if !(a == b && start.distance_square <= end.distance_square) {
                    let k = match (b + n - a) % n {
                        0 => n,
                        k => k,
                    };
                    for i in 0..k {
                        push_coord(tile, self.transform(points[(a + 1 + i) % n], true));
                    }
                }
            }
            (_, false) => {
                for idx in a + 1..=b {
                    push_coord(tile, self.transform(points[idx], true));
                }
            }
        }

        push_coord(tile, self.transform(end.point, false));
    }

    /// Close the gap from `incoming` to `outgoing` clockwise along the border
    fn walk_border_cw(
        &self,
        tile: &mut GroundTile,
        incoming: &Intersection,
        outgoing: &Intersection,
    ) {
        if outgoing.border_index != incoming.border_index
            || !is_left_on_same_border(incoming.border_index, incoming.point, outgoing.point)
        {
            let mut corner = (incoming.border_index + 1) % 4;
            loop {
                push_coord(tile, CellBoundaries::border_coord(corner));
                if corner == outgoing.border_index {
                    break;
                }
                corner = (corner + 1) % 4;
            }
        }

        push_coord(tile, self.transform(outgoing.point, false));
    }

    fn walk_boundary(
        &self,
        tile: &mut GroundTile,
        start: usize,
        visited: &mut [bool],
    ) -> Result<(), WalkError> {
        tile.coords.push(self.transform(self.intersections[start].point, false));

        let count = self.intersections.len();
        let mut path_start = start;
        let mut step = 0usize;

        while step == 0 || path_start != start {
            step += 1;
            if step > self.max_steps {
                return Err(WalkError::TooManySteps(self.max_steps));
            }
            visited[path_start] = true;

            let from = self.intersections[path_start];
            let (walk_from, path_end) = match self.find_sibling(path_start) {
                Some(end) => (from, end),
                None => {
                    let coastline = &self.data.coastlines[from.coastline];
                    if coastline.is_area {
                        return Err(WalkError::NoSibling {
                            coastline: coastline.id,
                            point: from.point,
                        });
                    }
                    let splice = self.find_tripoint(path_start)?;
                    trace!("Tripoint at {}", splice.path_end.point);
                    self.walk_path(tile, &from, &splice.path_end);
                    (splice.start_next, splice.end_next)
                }
            };

            let end = self.intersections[path_end];
            self.walk_path(tile, &walk_from, &end);

            path_start = (path_end + 1) % count;
            self.walk_border_cw(tile, &end, &self.intersections[path_start]);
        }

        Ok(())
    }
}

/// Walk every cell crossed by coastlines. A cell whose walk fails keeps no
/// tiles and is counted as skipped.
pub fn build_crossing_tiles(
    level: &Level,
    data: &LevelCoastlines,
    max_walk_steps: usize,
) -> TileBuild {
    let mut build = TileBuild::default();

    let mut cells: Vec<(&Pixel, &Vec<usize>)> = data.cell_coastlines.iter().collect();
    cells.sort_by_key(|(cell, _)| (cell.y, cell.x));

    for (cell, coastlines) in cells {
        let walker = CellWalker::new(level, *cell, data, coastlines, max_walk_steps);
        match walker.walk_all() {
            Ok(tiles) => {
                if !tiles.is_empty() {
                    build.cell_tiles.entry(*cell).or_default().extend(tiles);
                }
            }
            Err(e) => {
                error!(
                    "Level {} cell {}: cannot walk around cell boundary: {}",
                    level.magnification, cell, e
                );
                build.skipped_cells += 1;
            }
        }
    }

    build
}

/// Tiles for closed coastlines lying completely inside one cell
pub fn build_ring_tiles(
    level: &Level,
    data: &LevelCoastlines,
    cell_tiles: &mut FxHashMap<Pixel, Vec<GroundTile>>,
) {
    let mut cells: Vec<(&Pixel, &Vec<usize>)> = data.cell_covered_coastlines.iter().collect();
    cells.sort_by_key(|(cell, _)| (cell.y, cell.x));

    for (cell, coastlines) in cells {
        let boundaries = level.boundaries(*cell);
        for index in coastlines {
            let coastline = &data.coastlines[*index];
            if !coastline.is_area || coastline.points.is_empty() {
                continue;
            }

            let tile_type = match coastline.left {
                CoastState::Unknown => TileType::Unknown,
                CoastState::Water => TileType::Water,
                _ => TileType::Land,
            };

            let mut tile = GroundTile::new(tile_type);
            tile.coords = coastline
                .points
                .iter()
                .map(|p| {
                    transform(
                        *p,
                        boundaries.lat_min,
                        boundaries.lon_min,
                        level.cell_width,
                        level.cell_height,
                        true,
                    )
                })
                .collect();

            trace!("Coastline {} completely in cell {}", coastline.id, cell);
            cell_tiles.entry(*cell).or_default().push(tile);
        }
    }
}
