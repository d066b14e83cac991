//! Web Mercator projection per magnification, used to size and thin
//! coastlines for a level

use std::f64::consts::PI;

use crate::geometry::GeoCoord;

/// Latitude limit of the Web Mercator square
pub const MAX_LAT: f64 = 85.051_128_78;

/// Pixels per tile edge
pub const TILE_SIZE: f64 = 256.0;

#[derive(Debug, Clone, Copy)]
pub struct MercatorProjection {
    world_size: f64,
}

impl MercatorProjection {
    pub fn new(magnification: u32) -> Self {
        Self {
            world_size: TILE_SIZE * 2.0_f64.powi(magnification as i32),
        }
    }

    /// Pixel position of a coordinate, y grows southwards
    pub fn project(&self, point: GeoCoord) -> (f64, f64) {
        let lat = point.lat.clamp(-MAX_LAT, MAX_LAT);
        let x = (point.lon + 180.0) / 360.0 * self.world_size;
        let lat_rad = lat * PI / 180.0;
        let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * self.world_size;
        (x, y)
    }

    /// Width and height of the projected bounding box
    pub fn pixel_extent(&self, points: &[GeoCoord]) -> (f64, f64) {
        let mut iter = points.iter().map(|p| self.project(*p));
        let Some((x0, y0)) = iter.next() else {
            return (0.0, 0.0);
        };
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (x0, x0, y0, y0);
        for (x, y) in iter {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        (max_x - min_x, max_y - min_y)
    }

    /// Drop points closer than `tolerance` pixels to the last kept point.
    /// First and last points are always kept.
    pub fn thin(&self, points: &[GeoCoord], tolerance: f64) -> Vec<GeoCoord> {
        if tolerance <= 0.0 || points.len() <= 2 {
            return points.to_vec();
        }

        let tolerance_sq = tolerance * tolerance;
        let last_index = points.len() - 1;
        let mut kept = Vec::with_capacity(points.len());
        kept.push(points[0]);
        let mut last = self.project(points[0]);

        for point in &points[1..last_index] {
            let (x, y) = self.project(*point);
            let (dx, dy) = (x - last.0, y - last.1);
            if dx * dx + dy * dy >= tolerance_sq {
                kept.push(*point);
                last = (x, y);
            }
        }

        kept.push(points[last_index]);
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_origin_is_world_center() {
        let projection = MercatorProjection::new(0);
        let (x, y) = projection.project(GeoCoord::new(0.0, 0.0));
        assert!((x - 128.0).abs() < 1e-9);
        assert!((y - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_world_doubles_per_level() {
        let (x1, _) = MercatorProjection::new(1).project(GeoCoord::new(0.0, 180.0));
        let (x2, _) = MercatorProjection::new(2).project(GeoCoord::new(0.0, 180.0));
        assert!((x1 - 512.0).abs() < 1e-9);
        assert!((x2 - 1024.0).abs() < 1e-9);
    }

    #[test]
    fn test_thin_keeps_endpoints() {
        let projection = MercatorProjection::new(0);
        let points: Vec<GeoCoord> = (0..10).map(|i| GeoCoord::new(0.0, i as f64 * 0.001)).collect();
        let thinned = projection.thin(&points, 1.0);
        assert_eq!(thinned.len(), 2);
        assert_eq!(thinned[0], points[0]);
        assert_eq!(thinned[1], points[9]);

        assert_eq!(projection.thin(&points, 0.0).len(), 10, "zero tolerance disables thinning");
    }

    #[test]
    fn test_pixel_extent() {
        let projection = MercatorProjection::new(0);
        let (w, h) =
            projection.pixel_extent(&[GeoCoord::new(0.0, -90.0), GeoCoord::new(0.0, 90.0)]);
        assert!((w - 128.0).abs() < 1e-9);
        assert_eq!(h, 0.0);
    }
}
