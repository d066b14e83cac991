//! Input records consumed by the generator
//!
//! The import pipeline hands over raw coastline and data-polygon fragments as
//! node-id sequences, a node coordinate lookup, typed ways and the dataset
//! bounding box. `Dataset` bundles all of them in one JSON document.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Error, Result};
use crate::geometry::{GeoBox, GeoCoord};

/// A node resolved by a coordinate lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedNode {
    /// Stable internal number, never 0 (0 marks synthesized points)
    pub serial: u64,
    pub coord: GeoCoord,
}

/// Batch node id to coordinate lookup
pub trait CoordLookup {
    /// Resolve all `ids`. Ids without coordinates are simply absent from the
    /// result; an `Err` means the lookup itself failed.
    fn resolve(&self, ids: &[i64]) -> Result<FxHashMap<i64, ResolvedNode>>;
}

/// Raw coastline or data-polygon fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCoastline {
    pub id: i64,
    #[serde(default)]
    pub is_area: bool,
    pub nodes: Vec<i64>,
}

/// Way with a feature type, only used to assume land
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedWay {
    #[serde(rename = "type")]
    pub type_name: String,
    /// The type is excluded from sea/land inference
    #[serde(default)]
    pub ignore_sea_land: bool,
    #[serde(default)]
    pub tunnel: bool,
    #[serde(default)]
    pub bridge: bool,
    pub points: Vec<GeoCoord>,
}

impl TypedWay {
    /// Whether the way's presence implies dry land under it
    pub fn implies_land(&self) -> bool {
        !self.ignore_sea_land && !self.tunnel && !self.bridge && self.points.len() >= 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

/// All generator inputs in one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub bounding_box: GeoBox,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub coastlines: Vec<RawCoastline>,
    #[serde(default)]
    pub data_polygons: Vec<RawCoastline>,
    #[serde(default)]
    pub ways: Vec<TypedWay>,
}

impl Dataset {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingInput {
                what: "dataset",
                path: path.to_path_buf(),
            });
        }
        let reader = BufReader::new(File::open(path)?);
        let dataset: Dataset = serde_json::from_reader(reader)?;
        Ok(dataset)
    }

    pub fn node_lookup(&self) -> InMemoryLookup {
        InMemoryLookup::new(self.nodes.iter().map(|n| (n.id, GeoCoord::new(n.lat, n.lon))))
    }
}

/// Lookup over nodes held in memory; serials follow insertion order
#[derive(Debug, Clone, Default)]
pub struct InMemoryLookup {
    nodes: FxHashMap<i64, ResolvedNode>,
}

impl InMemoryLookup {
    pub fn new<I: IntoIterator<Item = (i64, GeoCoord)>>(nodes: I) -> Self {
        let mut map = FxHashMap::default();
        for (id, coord) in nodes {
            let serial = map.len() as u64 + 1;
            map.entry(id).or_insert(ResolvedNode { serial, coord });
        }
        Self { nodes: map }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl CoordLookup for InMemoryLookup {
    fn resolve(&self, ids: &[i64]) -> Result<FxHashMap<i64, ResolvedNode>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|node| (*id, *node)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_lookup_skips_unknown_ids() {
        let lookup = InMemoryLookup::new(vec![
            (10, GeoCoord::new(1.0, 2.0)),
            (11, GeoCoord::new(3.0, 4.0)),
        ]);
        let resolved = lookup.resolve(&[10, 12]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[&10].serial, 1);
        assert_eq!(resolved[&10].coord, GeoCoord::new(1.0, 2.0));
    }

    #[test]
    fn test_dataset_from_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "bounding_box": {{"min_lat": 0.0, "min_lon": 0.0, "max_lat": 1.0, "max_lon": 1.0}},
                "nodes": [{{"id": 1, "lat": 0.1, "lon": 0.2}}],
                "coastlines": [{{"id": 7, "nodes": [1, 1]}}],
                "ways": [{{
                    "type": "highway",
                    "points": [{{"lat": 0.1, "lon": 0.1}}, {{"lat": 0.2, "lon": 0.2}}]
                }}]
            }}"#
        )
        .unwrap();

        let dataset = Dataset::from_file(file.path()).unwrap();
        assert_eq!(dataset.coastlines.len(), 1);
        assert!(!dataset.coastlines[0].is_area);
        assert!(dataset.data_polygons.is_empty());
        assert!(dataset.ways[0].implies_land());
        assert_eq!(dataset.node_lookup().len(), 1);
    }

    #[test]
    fn test_missing_dataset() {
        let err = Dataset::from_file("/nonexistent/dataset.json").unwrap_err();
        assert!(matches!(err, Error::MissingInput { what: "dataset", .. }));
    }

    #[test]
    fn test_bridges_do_not_imply_land() {
        let way = TypedWay {
            type_name: "highway".into(),
            ignore_sea_land: false,
            tunnel: false,
            bridge: true,
            points: vec![GeoCoord::new(0.0, 0.0), GeoCoord::new(1.0, 1.0)],
        };
        assert!(!way.implies_land());
    }
}
