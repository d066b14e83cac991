//! Water index build configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Highest magnification the grid arithmetic supports (cell counts fit in u32)
pub const MAX_SUPPORTED_MAG: u32 = 20;

/// Parameters of a water index build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterIndexConfig {
    /// Lowest magnification level written
    pub min_mag: u32,
    /// Highest magnification level written
    pub max_mag: u32,
    /// Mark unknown cells crossed by land-implying ways as land
    pub assume_land: bool,
    /// Number of water flood fill passes
    pub fill_water_iterations: usize,
    /// Border steps after which a cell boundary walk is abandoned
    pub max_walk_steps: usize,
    /// Areas with a projected extent up to this many pixels are dropped per level
    pub min_area_pixel_size: f64,
    /// Projected distance below which consecutive points are merged (0 = off)
    pub simplify_tolerance_px: f64,
    /// Compute level payloads on the rayon pool
    pub parallel_levels: bool,
}

impl Default for WaterIndexConfig {
    fn default() -> Self {
        Self {
            min_mag: 1,
            max_mag: 14,
            assume_land: true,
            fill_water_iterations: 10,
            max_walk_steps: 1000,
            min_area_pixel_size: 4.0,
            simplify_tolerance_px: 1.0,
            parallel_levels: true,
        }
    }
}

impl WaterIndexConfig {
    /// Load configuration from a TOML file, missing keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingInput {
                what: "configuration file",
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_mag > self.max_mag {
            return Err(Error::Config(format!(
                "min_mag ({}) is greater than max_mag ({})",
                self.min_mag, self.max_mag
            )));
        }
        if self.max_mag > MAX_SUPPORTED_MAG {
            return Err(Error::Config(format!(
                "max_mag {} exceeds supported maximum {}",
                self.max_mag, MAX_SUPPORTED_MAG
            )));
        }
        if self.fill_water_iterations == 0 {
            return Err(Error::Config("fill_water_iterations must be at least 1".into()));
        }
        if self.max_walk_steps == 0 {
            return Err(Error::Config("max_walk_steps must be at least 1".into()));
        }
        if self.min_area_pixel_size < 0.0 || self.simplify_tolerance_px < 0.0 {
            return Err(Error::Config("pixel tolerances must not be negative".into()));
        }
        Ok(())
    }

    /// Magnification levels in ascending order
    pub fn levels(&self) -> impl Iterator<Item = u32> {
        self.min_mag..=self.max_mag
    }
}
