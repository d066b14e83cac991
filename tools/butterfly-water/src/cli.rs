//! Command-line definitions and handlers for the butterfly-water binary

use anyhow::{Context, Result};
use butterfly_water::{
    CellData, GeoBox, GeoCoord, WaterIndexConfig, WaterIndexGenerator, WaterIndexReader,
};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "butterfly-water")]
#[command(about = "Land/water/coast cell index generator for OpenStreetMap coastlines")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build water.idx from a JSON dataset
    Build {
        /// Dataset with bounding box, nodes, coastlines, data polygons and ways
        #[arg(long)]
        dataset: PathBuf,
        /// Output index file
        #[arg(long)]
        output: PathBuf,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Lowest magnification level
        #[arg(long)]
        min_mag: Option<u32>,
        /// Highest magnification level
        #[arg(long)]
        max_mag: Option<u32>,
        /// Skip the assume-land pass
        #[arg(long)]
        no_assume_land: bool,
    },
    /// Print the header and per-level summary of an index
    Inspect {
        /// Index file
        index: PathBuf,
    },
    /// Print cell states and tile counts for a bounding box
    Query {
        /// Index file
        index: PathBuf,
        /// Magnification level
        #[arg(long)]
        mag: u32,
        /// Bounding box (minLat,minLon,maxLat,maxLon)
        #[arg(long)]
        bbox: String,
    },
}

/// Parse "minLat,minLon,maxLat,maxLon"
pub fn parse_bbox(s: &str) -> Result<GeoBox> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        anyhow::bail!("Bounding box must be in format 'minLat,minLon,maxLat,maxLon'");
    }
    let mut values = [0.0f64; 4];
    for (value, part) in values.iter_mut().zip(&parts) {
        *value = part
            .trim()
            .parse::<f64>()
            .with_context(|| format!("Invalid bounding box value '{part}'"))?;
    }
    Ok(GeoBox::new(
        GeoCoord::new(values[0], values[1]),
        GeoCoord::new(values[2], values[3]),
    ))
}

/// Configuration file (or defaults) with command-line overrides applied
pub fn build_config(
    config: Option<&Path>,
    min_mag: Option<u32>,
    max_mag: Option<u32>,
    no_assume_land: bool,
) -> Result<WaterIndexConfig> {
    let mut cfg = match config {
        Some(path) => WaterIndexConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => WaterIndexConfig::default(),
    };
    if let Some(min_mag) = min_mag {
        cfg.min_mag = min_mag;
    }
    if let Some(max_mag) = max_mag {
        cfg.max_mag = max_mag;
    }
    if no_assume_land {
        cfg.assume_land = false;
    }
    cfg.validate()?;
    Ok(cfg)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build {
            dataset,
            output,
            config,
            min_mag,
            max_mag,
            no_assume_land,
        } => {
            let cfg = build_config(config.as_deref(), min_mag, max_mag, no_assume_land)?;
            let start = Instant::now();
            let generator = WaterIndexGenerator::new(cfg)?;
            let report = generator
                .generate_from_file(&dataset, &output)
                .with_context(|| format!("Failed to build {}", output.display()))?;
            info!(
                "Built {} level(s) from {} coastline(s) in {:.2}s",
                report.levels.len(),
                report.coastlines,
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Inspect { index } => {
            let reader = WaterIndexReader::open(&index)
                .with_context(|| format!("Failed to open {}", index.display()))?;
            println!("{}: levels {}..={}", index.display(), reader.min_mag(), reader.max_mag());
            for level in reader.levels() {
                println!(
                    "  level {:2}: x {}..={} y {}..={}, default {}, cell data {}, {} byte(s)/entry",
                    level.magnification,
                    level.cell_x_start,
                    level.cell_x_end,
                    level.cell_y_start,
                    level.cell_y_end,
                    level.default_state,
                    if level.has_cell_data { "yes" } else { "no" },
                    level.offset_bytes
                );
            }
        }
        Commands::Query { index, mag, bbox } => {
            let bbox = parse_bbox(&bbox)?;
            let mut reader = WaterIndexReader::open(&index)
                .with_context(|| format!("Failed to open {}", index.display()))?;
            for (cell, data) in reader.query(mag, &bbox)? {
                match data {
                    CellData::State(state) => println!("{cell} {state}"),
                    CellData::Tiles(tiles) => println!("{cell} coast, {} tile(s)", tiles.len()),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_bbox() {
        let bbox = parse_bbox("50.0, 4.0,51.5,6.0").unwrap();
        assert_eq!(bbox.min_lat, 50.0);
        assert_eq!(bbox.min_lon, 4.0);
        assert_eq!(bbox.max_lat, 51.5);
        assert_eq!(bbox.max_lon, 6.0);

        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("1,2,x,4").is_err());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "min_mag = 3\nmax_mag = 9\nassume_land = true").unwrap();

        let cfg = build_config(Some(file.path()), None, Some(6), true).unwrap();
        assert_eq!(cfg.min_mag, 3);
        assert_eq!(cfg.max_mag, 6);
        assert!(!cfg.assume_land);

        assert!(build_config(None, Some(8), Some(2), false).is_err());
    }

    #[test]
    fn test_cli_parses_build() {
        let cli = Cli::try_parse_from([
            "butterfly-water",
            "build",
            "--dataset",
            "in.json",
            "--output",
            "water.idx",
            "--max-mag",
            "10",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Build { max_mag, no_assume_land, .. } => {
                assert_eq!(max_mag, Some(10));
                assert!(!no_assume_land);
            }
            _ => panic!("Expected build command"),
        }
    }
}
