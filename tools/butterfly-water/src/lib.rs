//! # butterfly-water
//!
//! Builds a multi-level land/water/coast cell index from coastline data.
//! Each magnification level divides the world into a grid; every cell is
//! classified, cells crossed by coastlines get ground tiles (typed polygons in
//! cell-local fixed point) and the result is written to a compact
//! random-access `water.idx` file.

pub mod classify;
pub mod coast;
pub mod config;
pub mod error;
pub mod formats;
pub mod generator;
pub mod geometry;
pub mod ground;
pub mod level;
pub mod projection;
pub mod resolver;
pub mod source;
pub mod tile;

pub use config::WaterIndexConfig;
pub use error::{Error, Result};
pub use formats::{CellData, WaterIndexReader};
pub use generator::{BuildReport, LevelReport, WaterIndexGenerator};
pub use geometry::{GeoBox, GeoCoord};
pub use level::{Level, Pixel, State};
pub use source::Dataset;
pub use tile::{GroundTile, TileCoord, TileType};
