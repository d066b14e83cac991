//! Geographic primitives: coordinates, boxes, segment intersection and area containment

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::winding_order::{Winding, WindingOrder};
use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

/// WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoCoord {
    pub lat: f64,
    pub lon: f64,
}

impl GeoCoord {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// As a planar coordinate (x = lon, y = lat)
    pub fn to_coord(self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

impl std::fmt::Display for GeoCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.7},{:.7}", self.lat, self.lon)
    }
}

/// Squared planar distance in degrees, only used for ordering
pub fn distance_square(a: GeoCoord, b: GeoCoord) -> f64 {
    let dlat = a.lat - b.lat;
    let dlon = a.lon - b.lon;
    dlat * dlat + dlon * dlon
}

/// Axis-aligned geographic bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl GeoBox {
    pub fn new(a: GeoCoord, b: GeoCoord) -> Self {
        Self {
            min_lat: a.lat.min(b.lat),
            min_lon: a.lon.min(b.lon),
            max_lat: a.lat.max(b.lat),
            max_lon: a.lon.max(b.lon),
        }
    }

    /// Bounding box of a point list, `None` for an empty list
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GeoCoord>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bbox = Self::new(first, first);
        for p in iter {
            bbox.include(*p);
        }
        Some(bbox)
    }

    pub fn include(&mut self, p: GeoCoord) {
        self.min_lat = self.min_lat.min(p.lat);
        self.min_lon = self.min_lon.min(p.lon);
        self.max_lat = self.max_lat.max(p.lat);
        self.max_lon = self.max_lon.max(p.lon);
    }

    pub fn min_coord(&self) -> GeoCoord {
        GeoCoord::new(self.min_lat, self.min_lon)
    }

    pub fn max_coord(&self) -> GeoCoord {
        GeoCoord::new(self.max_lat, self.max_lon)
    }

    /// Closed-interval overlap test
    pub fn intersects(&self, other: &GeoBox) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }

    pub fn contains(&self, p: GeoCoord) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lon >= self.min_lon
            && p.lon <= self.max_lon
    }
}

/// Intersection of two segments with the parameters along both
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    pub point: GeoCoord,
    /// Position along segment a, 0.0 at a1 and 1.0 at a2
    pub ua: f64,
    /// Position along segment b, 0.0 at b1 and 1.0 at b2
    pub ub: f64,
}

/// Intersection of segment a1-a2 with segment b1-b2, endpoints included.
///
/// Shared endpoints are reported exactly. For collinear overlapping segments
/// the overlapping point closest to a1 is reported.
pub fn segment_intersection(
    a1: GeoCoord,
    a2: GeoCoord,
    b1: GeoCoord,
    b2: GeoCoord,
) -> Option<SegmentHit> {
    if a1 == b1 {
        return Some(SegmentHit { point: a1, ua: 0.0, ub: 0.0 });
    }
    if a1 == b2 {
        return Some(SegmentHit { point: a1, ua: 0.0, ub: 1.0 });
    }
    if a2 == b1 {
        return Some(SegmentHit { point: a2, ua: 1.0, ub: 0.0 });
    }
    if a2 == b2 {
        return Some(SegmentHit { point: a2, ua: 1.0, ub: 1.0 });
    }

    let denr = (b2.lat - b1.lat) * (a2.lon - a1.lon) - (b2.lon - b1.lon) * (a2.lat - a1.lat);
    let ua_numr = (b2.lon - b1.lon) * (a1.lat - b1.lat) - (b2.lat - b1.lat) * (a1.lon - b1.lon);
    let ub_numr = (a2.lon - a1.lon) * (a1.lat - b1.lat) - (a2.lat - a1.lat) * (a1.lon - b1.lon);

    if denr == 0.0 {
        if ua_numr == 0.0 && ub_numr == 0.0 {
            return collinear_overlap(a1, a2, b1, b2);
        }
        return None;
    }

    let ua = ua_numr / denr;
    let ub = ub_numr / denr;

    if (0.0..=1.0).contains(&ua) && (0.0..=1.0).contains(&ub) {
        let point = GeoCoord::new(a1.lat + ua * (a2.lat - a1.lat), a1.lon + ua * (a2.lon - a1.lon));
        Some(SegmentHit { point, ua, ub })
    } else {
        None
    }
}

fn collinear_overlap(a1: GeoCoord, a2: GeoCoord, b1: GeoCoord, b2: GeoCoord) -> Option<SegmentHit> {
    let a_box = GeoBox::new(a1, a2);
    let b_box = GeoBox::new(b1, b2);
    let a_len = distance_square(a1, a2).sqrt();
    let b_len = distance_square(b1, b2).sqrt();
    let along = |from: GeoCoord, p: GeoCoord, len: f64| {
        if len == 0.0 {
            0.0
        } else {
            distance_square(from, p).sqrt() / len
        }
    };

    if b_box.contains(a1) {
        return Some(SegmentHit { point: a1, ua: 0.0, ub: along(b1, a1, b_len) });
    }

    [b1, b2]
        .into_iter()
        .filter(|p| a_box.contains(*p))
        .map(|p| SegmentHit { point: p, ua: along(a1, p, a_len), ub: along(b1, p, b_len) })
        .min_by(|x, y| x.ua.total_cmp(&y.ua))
}

/// Intersection point of two segments, endpoints included
pub fn line_intersection(
    a1: GeoCoord,
    a2: GeoCoord,
    b1: GeoCoord,
    b2: GeoCoord,
) -> Option<GeoCoord> {
    segment_intersection(a1, a2, b1, b2).map(|hit| hit.point)
}

/// Does segment a1-a2 intersect segment b1-b2
pub fn lines_intersect(a1: GeoCoord, a2: GeoCoord, b1: GeoCoord, b2: GeoCoord) -> bool {
    segment_intersection(a1, a2, b1, b2).is_some()
}

/// Crossing between two paths
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathIntersection {
    pub point: GeoCoord,
    /// Sign of the cross product of a's and b's segment directions (x = lon, y = lat)
    pub orientation: f64,
    pub a_index: usize,
    pub b_index: usize,
    pub a_distance_square: f64,
    pub b_distance_square: f64,
}

/// Number of segments of a path, closing segment included for rings
pub fn segment_count(len: usize, closed: bool) -> usize {
    match len {
        0 | 1 => 0,
        _ if closed => len,
        _ => len - 1,
    }
}

/// All proper crossings between path a and path b.
///
/// Segments are treated as half open so a crossing at a shared vertex is
/// reported once, by the segment starting at that vertex. Touching without
/// crossing direction (parallel segments) is ignored.
pub fn find_path_intersections(
    a: &[GeoCoord],
    b: &[GeoCoord],
    a_closed: bool,
    b_closed: bool,
) -> Vec<PathIntersection> {
    let a_segments = segment_count(a.len(), a_closed);
    let b_segments = segment_count(b.len(), b_closed);
    let mut intersections = Vec::new();

    if a_segments == 0 || b_segments == 0 {
        return intersections;
    }

    let b_boxes: Vec<GeoBox> = (0..b_segments)
        .map(|j| GeoBox::new(b[j], b[(j + 1) % b.len()]))
        .collect();
    let b_box = match GeoBox::from_points(b) {
        Some(bbox) => bbox,
        None => return intersections,
    };

    for i in 0..a_segments {
        let a1 = a[i];
        let a2 = a[(i + 1) % a.len()];
        let a_box = GeoBox::new(a1, a2);
        if !a_box.intersects(&b_box) {
            continue;
        }
        let a_last = !a_closed && i + 1 == a_segments;

        for (j, segment_box) in b_boxes.iter().enumerate() {
            if !a_box.intersects(segment_box) {
                continue;
            }
            let b1 = b[j];
            let b2 = b[(j + 1) % b.len()];
            let b_last = !b_closed && j + 1 == b_segments;

            let Some(hit) = segment_intersection(a1, a2, b1, b2) else {
                continue;
            };
            if (hit.ua >= 1.0 && !a_last) || (hit.ub >= 1.0 && !b_last) {
                continue;
            }

            let orientation =
                (a2.lon - a1.lon) * (b2.lat - b1.lat) - (a2.lat - a1.lat) * (b2.lon - b1.lon);
            if orientation == 0.0 {
                continue;
            }

            intersections.push(PathIntersection {
                point: hit.point,
                orientation,
                a_index: i,
                b_index: j,
                a_distance_square: distance_square(a1, hit.point),
                b_distance_square: distance_square(b1, hit.point),
            });
        }
    }

    intersections
}

/// A closed ring prepared for repeated containment tests
#[derive(Debug, Clone)]
pub struct Area {
    polygon: Polygon<f64>,
}

impl Area {
    pub fn new(ring: &[GeoCoord]) -> Self {
        let exterior: LineString<f64> = ring.iter().map(|p| p.to_coord()).collect();
        Self {
            polygon: Polygon::new(exterior, vec![]),
        }
    }

    /// Point inside or on the boundary
    pub fn covers(&self, p: GeoCoord) -> bool {
        self.polygon.coordinate_position(&p.to_coord()) != CoordPos::Outside
    }

    /// True if at least one of the points is inside or on the boundary
    pub fn covers_any(&self, points: &[GeoCoord]) -> bool {
        points.iter().any(|p| self.covers(*p))
    }
}

/// True if at least one point of `a` lies in or on the ring `b`
pub fn is_area_at_least_partly_in_area(a: &[GeoCoord], b: &[GeoCoord]) -> bool {
    if b.len() < 3 {
        return false;
    }
    Area::new(b).covers_any(a)
}

/// True if the ring runs clockwise (x = lon, y = lat)
pub fn is_clockwise(ring: &[GeoCoord]) -> bool {
    let mut line: LineString<f64> = ring.iter().map(|p| p.to_coord()).collect();
    line.close();
    matches!(line.winding_order(), Some(WindingOrder::Clockwise))
}
