//! Binary file formats

pub mod varint;
pub mod water_idx;

pub use water_idx::{
    encode_level, write_index, CellData, LevelHeader, LevelPayload, WaterIndexReader,
};
