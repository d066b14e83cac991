//! Coastline assembly
//!
//! Raw fragments are resolved to coordinates, way fragments sharing an
//! endpoint are merged into longer chains or closed rings, and when a data
//! polygon is present coastline ways are cut against it so that every piece of
//! the data boundary gets a land/water side.

use log::{error, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::geometry::{
    find_path_intersections, is_area_at_least_partly_in_area, is_clockwise, GeoCoord,
    PathIntersection,
};
use crate::source::{CoordLookup, RawCoastline};

/// What lies on one side of a directed coastline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoastState {
    Undefined,
    Unknown,
    Land,
    Water,
}

/// Id used for points created by cutting
pub const SYNTHETIC_NODE_ID: u64 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct Coast {
    pub id: i64,
    /// Closed ring; the closing point is not repeated
    pub is_area: bool,
    pub front_node_id: u64,
    pub back_node_id: u64,
    pub points: Vec<GeoCoord>,
    pub left: CoastState,
    pub right: CoastState,
}

/// Resolve raw fragments against the coordinate lookup.
///
/// All node ids are resolved in one batch. A record with an unresolvable node
/// is dropped with an error; a failing lookup aborts.
pub fn load_coasts(
    records: &[RawCoastline],
    lookup: &dyn CoordLookup,
    left: CoastState,
    right: CoastState,
) -> Result<Vec<Coast>> {
    let ids: FxHashSet<i64> = records.iter().flat_map(|r| r.nodes.iter().copied()).collect();
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();

    let resolved = lookup
        .resolve(&ids)
        .map_err(|e| Error::UnresolvedNodes(e.to_string()))?;

    let mut coasts = Vec::with_capacity(records.len());
    let mut way_count = 0usize;
    let mut area_count = 0usize;

    'records: for record in records {
        if record.nodes.is_empty() {
            warn!("Skipping coastline {} without nodes", record.id);
            continue;
        }

        let mut points = Vec::with_capacity(record.nodes.len());
        let mut serials = Vec::with_capacity(record.nodes.len());
        for node_id in &record.nodes {
            match resolved.get(node_id) {
                Some(node) => {
                    points.push(node.coord);
                    serials.push(node.serial);
                }
                None => {
                    error!("Cannot resolve node with id {} for coastline {}", node_id, record.id);
                    continue 'records;
                }
            }
        }

        let front_node_id = serials[0];
        let back_node_id = serials[serials.len() - 1];

        if record.is_area {
            if points.len() > 1 && front_node_id == back_node_id {
                points.pop();
            }
            area_count += 1;
        } else {
            way_count += 1;
        }

        coasts.push(Coast {
            id: record.id,
            is_area: record.is_area,
            front_node_id,
            back_node_id,
            points,
            left,
            right,
        });
    }

    info!("{} way coastline(s), {} area coastline(s)", way_count, area_count);
    Ok(coasts)
}

/// Chain way fragments whose back node is another fragment's front node.
///
/// Chains that close on themselves become areas; anything left with two
/// points or less is dropped.
pub fn merge_coastlines(coasts: Vec<Coast>) -> Vec<Coast> {
    let mut merged = Vec::new();
    let mut ways: Vec<Coast> = Vec::new();

    for coast in coasts {
        if coast.is_area {
            merged.push(coast);
        } else {
            ways.push(coast);
        }
    }

    let mut start_map: FxHashMap<u64, usize> = FxHashMap::default();
    for (index, way) in ways.iter().enumerate() {
        start_map.entry(way.front_node_id).or_insert(index);
    }

    let mut absorbed = vec![false; ways.len()];
    let mut changed = true;

    while changed {
        changed = false;

        for index in 0..ways.len() {
            if absorbed[index] {
                continue;
            }

            while ways[index].front_node_id != ways[index].back_node_id {
                let Some(&other) = start_map.get(&ways[index].back_node_id) else {
                    break;
                };
                if other == index || absorbed[other] {
                    break;
                }

                let tail = std::mem::take(&mut ways[other].points);
                ways[index].points.extend_from_slice(&tail[1..]);
                ways[index].back_node_id = ways[other].back_node_id;

                absorbed[other] = true;
                start_map.remove(&ways[other].front_node_id);
                changed = true;
            }
        }
    }

    let mut way_count = 0usize;
    let mut area_count = merged.len();

    for (index, mut way) in ways.into_iter().enumerate() {
        if absorbed[index] {
            continue;
        }

        if way.front_node_id == way.back_node_id {
            way.is_area = true;
            way.points.pop();
            area_count += 1;
        } else {
            way_count += 1;
        }

        if way.points.len() <= 2 {
            warn!("Dropping too short coastline with id {}", way.id);
            continue;
        }

        merged.push(way);
    }

    info!("{} way coastline(s), {} area coastline(s) after merge", way_count, area_count);
    merged
}

/// Points `start` (inclusive) to `end` (exclusive) of `src`, wrapping around.
/// Equal bounds give nothing unless `full_turn` asks for the whole ring.
fn cut_path(dst: &mut Vec<GeoCoord>, src: &[GeoCoord], start: usize, end: usize, full_turn: bool) {
    let len = src.len();
    let start = start % len;
    let end = end % len;

    if start > end || (start == end && full_turn) {
        dst.extend_from_slice(&src[start..]);
        dst.extend_from_slice(&src[..end]);
    } else {
        dst.extend_from_slice(&src[start..end]);
    }
}

fn by_a(i1: &PathIntersection, i2: &PathIntersection) -> std::cmp::Ordering {
    i1.a_index
        .cmp(&i2.a_index)
        .then(i1.a_distance_square.total_cmp(&i2.a_distance_square))
}

fn by_b(i1: &PathIntersection, i2: &PathIntersection) -> std::cmp::Ordering {
    i1.b_index
        .cmp(&i2.b_index)
        .then(i1.b_distance_square.total_cmp(&i2.b_distance_square))
}

fn alternates(intersections: &[PathIntersection]) -> bool {
    intersections
        .windows(2)
        .all(|pair| (pair[0].orientation > 0.0) != (pair[1].orientation > 0.0))
}

fn synthetic_coast(id: i64, points: Vec<GeoCoord>, left: CoastState, right: CoastState) -> Coast {
    Coast {
        id,
        is_area: false,
        front_node_id: SYNTHETIC_NODE_ID,
        back_node_id: SYNTHETIC_NODE_ID,
        points,
        left,
        right,
    }
}

/// Cut data polygons and coastline ways at their crossings
fn synthesize_segments(data_polygons: &[Coast], ways: &[Coast], out: &mut Vec<Coast>) {
    let mut way_intersections: Vec<Vec<PathIntersection>> = vec![Vec::new(); ways.len()];

    for polygon in data_polygons {
        let mut ring = polygon.points.clone();
        if is_clockwise(&ring) {
            ring.reverse();
        }

        let mut polygon_intersections = Vec::new();
        for (way_index, way) in ways.iter().enumerate() {
            let found = find_path_intersections(&ring, &way.points, true, false);
            polygon_intersections.extend_from_slice(&found);
            way_intersections[way_index].extend(found);
        }

        if polygon_intersections.is_empty() {
            out.push(Coast {
                points: ring,
                is_area: true,
                ..polygon.clone()
            });
            continue;
        }

        if polygon_intersections.len() % 2 != 0 {
            warn!(
                "Odd count of intersections ({}) for data polygon {}, skipping",
                polygon_intersections.len(),
                polygon.id
            );
            continue;
        }

        polygon_intersections.sort_by(by_a);
        let count = polygon_intersections.len();

        for ii in 0..count {
            let int1 = polygon_intersections[ii];
            let int2 = polygon_intersections[(ii + 1) % count];

            let wraps = ii + 1 == count;
            let full_turn = wraps
                && int1.a_index == int2.a_index
                && int2.a_distance_square <= int1.a_distance_square;

            let mut points = vec![int1.point];
            cut_path(&mut points, &ring, int1.a_index + 1, int2.a_index + 1, full_turn);
            points.push(int2.point);

            let left = if int1.orientation > 0.0 {
                CoastState::Water
            } else {
                CoastState::Land
            };
            out.push(synthetic_coast(polygon.id, points, left, polygon.right));
        }
    }

    for (way, mut intersections) in ways.iter().zip(way_intersections) {
        if intersections.is_empty() {
            continue;
        }
        if intersections.len() % 2 != 0 {
            warn!(
                "Odd count of intersections ({}) for coastline {}, skipping",
                intersections.len(),
                way.id
            );
            continue;
        }

        intersections.sort_by(by_b);
        if !alternates(&intersections) {
            warn!(
                "Coastline {} does not alternate entering and leaving the data polygon, skipping",
                way.id
            );
            continue;
        }

        for pair in intersections.windows(2) {
            let (int1, int2) = (pair[0], pair[1]);
            if int1.orientation < 0.0 {
                continue;
            }

            let mut points = vec![int1.point];
            cut_path(&mut points, &way.points, int1.b_index + 1, int2.b_index + 1, false);
            points.push(int2.point);

            out.push(synthetic_coast(way.id, points, way.left, way.right));
        }
    }
}

/// Replace coastline ways by their pieces inside the data polygons and turn
/// the data polygon boundaries into coastlines. Without data polygons the
/// coastlines are returned unchanged.
pub fn synthesize_coastlines(coastlines: Vec<Coast>, data_polygons: &[Coast]) -> Vec<Coast> {
    if data_polygons.is_empty() {
        return coastlines;
    }

    let (mut segments, ways): (Vec<Coast>, Vec<Coast>) =
        coastlines.into_iter().partition(|c| c.is_area);
    let areas_before = segments.len();

    synthesize_segments(data_polygons, &ways, &mut segments);

    let resolved_left: Vec<Option<CoastState>> = segments
        .iter()
        .enumerate()
        .map(|(index, coast)| {
            if coast.left != CoastState::Undefined || !coast.is_area {
                return None;
            }
            let wet = segments.iter().enumerate().any(|(other, test)| {
                other != index
                    && test.right == CoastState::Water
                    && is_area_at_least_partly_in_area(&test.points, &coast.points)
            });
            Some(if wet { CoastState::Water } else { CoastState::Land })
        })
        .collect();

    for (coast, left) in segments.iter_mut().zip(resolved_left) {
        if coast.right == CoastState::Undefined {
            coast.right = CoastState::Unknown;
        }
        if let Some(left) = left {
            coast.left = left;
        }
        if coast.left == CoastState::Undefined {
            coast.left = CoastState::Land;
        }
    }

    info!(
        "{} data polygon(s) and {} way coastline(s) synthesized into {} new coastline segment(s)",
        data_polygons.len(),
        ways.len(),
        segments.len() - areas_before
    );

    segments
}
