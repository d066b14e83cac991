//! Water index generation
//!
//! Coastlines are loaded, merged and synthesized once. Every magnification
//! level is then classified and tiled on its own (optionally on the rayon
//! pool) and encoded into a buffered payload; the payloads are written to the
//! index file in ascending order at the end.

use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::Path;

use crate::classify::{
    assume_land, calculate_coast_environment, fill_land, fill_water, fill_water_around_islands,
    mark_coast_cells,
};
use crate::coast::{load_coasts, merge_coastlines, synthesize_coastlines, Coast, CoastState};
use crate::config::WaterIndexConfig;
use crate::error::{Error, Result};
use crate::formats::water_idx::{encode_level, write_index, LevelPayload};
use crate::geometry::{Area, GeoBox};
use crate::ground::{build_crossing_tiles, build_ring_tiles};
use crate::level::{Level, State};
use crate::resolver::coastline_data;
use crate::source::{CoordLookup, Dataset, TypedWay};

/// Default name of the produced index
pub const WATER_IDX: &str = "water.idx";

/// Outcome of one level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelReport {
    pub magnification: u32,
    pub cell_x_start: u32,
    pub cell_x_end: u32,
    pub cell_y_start: u32,
    pub cell_y_end: u32,
    pub unknown_cells: usize,
    pub land_cells: usize,
    pub water_cells: usize,
    pub coast_cells: usize,
    pub tiled_cells: usize,
    pub tiles: usize,
    /// Cells whose boundary walk failed
    pub skipped_cells: usize,
}

impl LevelReport {
    fn new(level: &Level, skipped_cells: usize) -> Self {
        let counts = level.state_counts();
        Self {
            magnification: level.magnification,
            cell_x_start: level.cell_x_start,
            cell_x_end: level.cell_x_end,
            cell_y_start: level.cell_y_start,
            cell_y_end: level.cell_y_end,
            unknown_cells: counts[State::Unknown.as_u8() as usize],
            land_cells: counts[State::Land.as_u8() as usize],
            water_cells: counts[State::Water.as_u8() as usize],
            coast_cells: counts[State::Coast.as_u8() as usize],
            tiled_cells: level.cell_tiles.len(),
            tiles: level.cell_tiles.values().map(Vec::len).sum(),
            skipped_cells,
        }
    }
}

/// Summary of a whole build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub coastlines: usize,
    pub data_polygons: usize,
    pub levels: Vec<LevelReport>,
}

impl BuildReport {
    pub fn skipped_cells(&self) -> usize {
        self.levels.iter().map(|l| l.skipped_cells).sum()
    }
}

/// Coastlines ready for per-level processing
#[derive(Debug, Clone, Default)]
pub struct PreparedCoastlines {
    pub coastlines: Vec<Coast>,
    pub data_polygons: Vec<Coast>,
}

impl PreparedCoastlines {
    /// Load, merge and synthesize the coastline and data polygon records
    pub fn load(dataset: &Dataset, lookup: &dyn CoordLookup) -> Result<Self> {
        let data_polygons = load_coasts(
            &dataset.data_polygons,
            lookup,
            CoastState::Undefined,
            CoastState::Unknown,
        )?;
        let coastlines = load_coasts(
            &dataset.coastlines,
            lookup,
            CoastState::Land,
            CoastState::Water,
        )?;
        let coastlines = merge_coastlines(coastlines);
        let coastlines = synthesize_coastlines(coastlines, &data_polygons);

        Ok(Self {
            coastlines,
            data_polygons,
        })
    }

    fn data_polygon_areas(&self) -> Vec<Area> {
        self.data_polygons
            .iter()
            .filter(|polygon| polygon.points.len() >= 3)
            .map(|polygon| Area::new(&polygon.points))
            .collect()
    }
}

/// A classified and tiled level
#[derive(Debug, Clone)]
pub struct LevelBuild {
    pub level: Level,
    pub report: LevelReport,
}

pub struct WaterIndexGenerator {
    config: WaterIndexConfig,
}

impl WaterIndexGenerator {
    pub fn new(config: WaterIndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Classify and tile one level
    pub fn build_level(
        &self,
        magnification: u32,
        bbox: &GeoBox,
        prepared: &PreparedCoastlines,
        data_polygon_areas: &[Area],
        ways: &[TypedWay],
    ) -> LevelBuild {
        let mut level = Level::new(magnification, bbox);
        let data = coastline_data(&level, &prepared.coastlines, &self.config);

        mark_coast_cells(&mut level, &data);

        let mut build = build_crossing_tiles(&level, &data, self.config.max_walk_steps);
        build_ring_tiles(&level, &data, &mut build.cell_tiles);
        level.cell_tiles = build.cell_tiles;

        calculate_coast_environment(&mut level);

        if self.config.assume_land {
            assume_land(&mut level, ways);
        }

        if !prepared.coastlines.is_empty() {
            fill_water(&mut level, self.config.fill_water_iterations, data_polygon_areas);
            fill_water_around_islands(&mut level);
        }

        fill_land(&mut level);
        level.finish();

        let report = LevelReport::new(&level, build.skipped_cells);
        info!(
            "Level {}: {} coast, {} land, {} water, {} unknown cells, {} tile(s) in {} cell(s)",
            magnification,
            report.coast_cells,
            report.land_cells,
            report.water_cells,
            report.unknown_cells,
            report.tiles,
            report.tiled_cells
        );
        if report.skipped_cells > 0 {
            warn!(
                "Level {}: {} cell(s) skipped, they stay without ground tiles",
                magnification, report.skipped_cells
            );
        }

        LevelBuild { level, report }
    }

    fn encode(
        &self,
        magnification: u32,
        dataset: &Dataset,
        prepared: &PreparedCoastlines,
        areas: &[Area],
    ) -> Result<(LevelPayload, LevelReport)> {
        let build = self.build_level(
            magnification,
            &dataset.bounding_box,
            prepared,
            areas,
            &dataset.ways,
        );
        let payload = encode_level(&build.level)?;
        Ok((payload, build.report))
    }

    /// Build every configured level from `dataset` and write the index to `output`
    pub fn generate<P: AsRef<Path>>(&self, dataset: &Dataset, output: P) -> Result<BuildReport> {
        let output = output.as_ref();
        check_output_dir(output)?;

        let lookup = dataset.node_lookup();
        let prepared = PreparedCoastlines::load(dataset, &lookup)?;
        let areas = prepared.data_polygon_areas();

        info!(
            "Building water index levels {}..={} from {} coastline(s), {} data polygon(s)",
            self.config.min_mag,
            self.config.max_mag,
            prepared.coastlines.len(),
            prepared.data_polygons.len()
        );

        let levels: Vec<u32> = self.config.levels().collect();
        let results: Vec<(LevelPayload, LevelReport)> = if self.config.parallel_levels {
            levels
                .into_par_iter()
                .map(|mag| self.encode(mag, dataset, &prepared, &areas))
                .collect::<Result<_>>()?
        } else {
            levels
                .into_iter()
                .map(|mag| self.encode(mag, dataset, &prepared, &areas))
                .collect::<Result<_>>()?
        };

        let (payloads, reports): (Vec<LevelPayload>, Vec<LevelReport>) =
            results.into_iter().unzip();
        for payload in &payloads {
            debug!(
                "Level {}: {} bytes, {} byte(s)/entry",
                payload.header.magnification,
                payload.body.len(),
                payload.header.offset_bytes
            );
        }

        write_index(output, self.config.min_mag, self.config.max_mag, &payloads)?;

        let report = BuildReport {
            coastlines: prepared.coastlines.len(),
            data_polygons: prepared.data_polygons.len(),
            levels: reports,
        };

        info!("✅ Water index written to {}", output.display());
        let skipped = report.skipped_cells();
        if skipped > 0 {
            warn!(
                "{skipped} cell(s) were skipped because of coastline anomalies, see errors above"
            );
        }

        Ok(report)
    }

    /// Load the dataset from `dataset_path` and build the index
    pub fn generate_from_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        dataset_path: P,
        output: Q,
    ) -> Result<BuildReport> {
        check_output_dir(output.as_ref())?;
        let dataset = Dataset::from_file(dataset_path)?;
        self.generate(&dataset, output)
    }
}

fn check_output_dir(output: &Path) -> Result<()> {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => Err(Error::MissingInput {
            what: "output directory",
            path: dir.to_path_buf(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeoCoord;
    use crate::level::Pixel;
    use crate::source::{NodeRecord, RawCoastline};
    use tempfile::tempdir;

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

    fn node(id: i64, lat: f64, lon: f64) -> NodeRecord {
        NodeRecord { id, lat, lon }
    }

    /// A square island of 10 degrees centred at (5, 5)
    fn island_dataset() -> Dataset {
        Dataset {
            bounding_box: GeoBox::new(GeoCoord::new(-20.0, -20.0), GeoCoord::new(30.0, 30.0)),
            nodes: vec![
                node(1, 0.0, 0.0),
                node(2, 0.0, 10.0),
                node(3, 10.0, 10.0),
                node(4, 10.0, 0.0),
            ],
            coastlines: vec![RawCoastline {
                id: 100,
                is_area: true,
                nodes: vec![1, 4, 3, 2, 1],
            }],
            data_polygons: Vec::new(),
            ways: Vec::new(),
        }
    }

    #[test]
    fn test_generator_rejects_bad_config() {
        let err = WaterIndexGenerator::new(config(5, 2)).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_empty_dataset_gives_uniform_levels() {
        let dataset = Dataset {
            bounding_box: GeoBox::new(GeoCoord::new(0.0, 0.0), GeoCoord::new(1.0, 1.0)),
            nodes: Vec::new(),
            coastlines: Vec::new(),
            data_polygons: Vec::new(),
            ways: Vec::new(),
        };
        let dir = tempdir().unwrap();
        let generator = WaterIndexGenerator::new(config(1, 3)).unwrap();
        let report = generator.generate(&dataset, dir.path().join(WATER_IDX)).unwrap();

        assert_eq!(report.levels.len(), 3);
        for level in &report.levels {
            assert_eq!(level.tiles, 0);
            assert_eq!(level.coast_cells, 0);
        }
        assert!(dir.path().join(WATER_IDX).exists());
    }

    #[test]
    fn test_island_is_coast_at_coarse_level() {
        let dataset = island_dataset();
        let generator = WaterIndexGenerator::new(config(2, 2)).unwrap();
        let lookup = dataset.node_lookup();
        let prepared = PreparedCoastlines::load(&dataset, &lookup).unwrap();
        assert_eq!(prepared.coastlines.len(), 1);

        let build = generator.build_level(2, &dataset.bounding_box, &prepared, &[], &dataset.ways);
        // The island lies in cell (2, 2) of the 4 x 4 grid
        let cell = Pixel::new(2, 2);
        assert_eq!(build.level.state(cell), State::Coast);
        let tiles = &build.level.cell_tiles[&cell];
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].coords.len(), 4);
        assert_eq!(build.report.skipped_cells, 0);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let dataset = island_dataset();
        let dir = tempdir().unwrap();

        let sequential = WaterIndexGenerator::new(config(1, 4)).unwrap();
        let a = sequential.generate(&dataset, dir.path().join("a.idx")).unwrap();

        let parallel = WaterIndexGenerator::new(WaterIndexConfig {
            parallel_levels: true,
            ..config(1, 4)
        })
        .unwrap();
        let b = parallel.generate(&dataset, dir.path().join("b.idx")).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            std::fs::read(dir.path().join("a.idx")).unwrap(),
            std::fs::read(dir.path().join("b.idx")).unwrap()
        );
    }

    #[test]
    fn test_missing_output_directory() {
        let generator = WaterIndexGenerator::new(config(1, 1)).unwrap();
        let err = generator
            .generate(&island_dataset(), "/nonexistent/dir/water.idx")
            .unwrap_err();
        assert!(matches!(err, Error::MissingInput { what: "output directory", .. }));
    }
}
