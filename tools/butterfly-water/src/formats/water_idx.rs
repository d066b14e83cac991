//! water.idx format - per-level land/water/coast cell index with ground tiles
//!
//! ```text
//! varint min_mag, varint max_mag
//! per level (ascending):
//!   u8 has_cell_data, u8 offset_bytes, u8 default_state
//!   u64 index_data_offset (absolute, 0 without cell data)
//!   varint cell_x_start, cell_x_end, cell_y_start, cell_y_end
//! per level with cell data, at index_data_offset:
//!   bitmap  x_count * y_count entries of offset_bytes each, row-major;
//!           < 4 is a literal state, else an offset into the data section
//!   data    4 zero bytes, then per tiled cell:
//!           varint tile_count, per tile: u8 type, varint coord_count,
//!           coord_count x (u16 x | COAST_FLAG, u16 y)
//! ```
//!
//! All fixed-width integers are little-endian.

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use log::debug;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::varint::{read_varint, varint_len, write_varint};
use crate::config::MAX_SUPPORTED_MAG;
use crate::error::{Error, Result};
use crate::geometry::GeoBox;
use crate::level::{Level, Pixel, State};
use crate::tile::{GroundTile, TileCoord, TileType, COAST_FLAG};

/// Zero placeholder at the start of every data section; real offsets are >= 4
const DATA_PREFIX: u64 = 4;

/// Fixed part of a level header: three flag bytes plus the u64 offset
const LEVEL_HEADER_FIXED: usize = 3 + 8;

/// Header of one level as stored in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelHeader {
    pub magnification: u32,
    pub has_cell_data: bool,
    /// Width of a bitmap entry in bytes
    pub offset_bytes: u8,
    pub default_state: State,
    /// Absolute file offset of the bitmap
    pub index_data_offset: u64,
    pub cell_x_start: u32,
    pub cell_x_end: u32,
    pub cell_y_start: u32,
    pub cell_y_end: u32,
}

impl LevelHeader {
    pub fn cell_x_count(&self) -> u64 {
        (self.cell_x_end - self.cell_x_start) as u64 + 1
    }

    pub fn cell_y_count(&self) -> u64 {
        (self.cell_y_end - self.cell_y_start) as u64 + 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.cell_x_start
            && x <= self.cell_x_end
            && y >= self.cell_y_start
            && y <= self.cell_y_end
    }

    fn bitmap_len(&self) -> u64 {
        self.cell_x_count() * self.cell_y_count() * self.offset_bytes as u64
    }

    /// Absolute file offset of the data section, `None` on overflow
    fn data_offset(&self) -> Option<u64> {
        self.index_data_offset.checked_add(self.bitmap_len())
    }

    fn encoded_len(&self) -> usize {
        LEVEL_HEADER_FIXED
            + varint_len(self.cell_x_start as u64)
            + varint_len(self.cell_x_end as u64)
            + varint_len(self.cell_y_start as u64)
            + varint_len(self.cell_y_end as u64)
    }

    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(self.has_cell_data as u8)?;
        writer.write_u8(self.offset_bytes)?;
        writer.write_u8(self.default_state.as_u8())?;
        writer.write_u64::<LE>(self.index_data_offset)?;
        write_varint(writer, self.cell_x_start as u64)?;
        write_varint(writer, self.cell_x_end as u64)?;
        write_varint(writer, self.cell_y_start as u64)?;
        write_varint(writer, self.cell_y_end as u64)?;
        Ok(())
    }
}

/// Encoded level: header plus bitmap and data section, ready to be placed
/// in the file
#[derive(Debug, Clone, PartialEq)]
pub struct LevelPayload {
    pub header: LevelHeader,
    pub body: Vec<u8>,
    pub tiled_cells: usize,
}

/// Minimum number of bytes that can hold `value`
pub fn bytes_needed(value: u64) -> u8 {
    let bits = 64 - value.leading_zeros();
    bits.div_ceil(8).max(1) as u8
}

fn write_tiles<W: Write>(writer: &mut W, tiles: &[GroundTile]) -> io::Result<()> {
    write_varint(writer, tiles.len() as u64)?;
    for tile in tiles {
        writer.write_u8(tile.tile_type.as_u8())?;
        write_varint(writer, tile.coords.len() as u64)?;
        for coord in &tile.coords {
            let x = if coord.coast { coord.x | COAST_FLAG } else { coord.x };
            writer.write_u16::<LE>(x)?;
            writer.write_u16::<LE>(coord.y)?;
        }
    }
    Ok(())
}

/// Encode a finished level. The absolute `index_data_offset` is assigned
/// when the payload is placed by [`write_index`].
pub fn encode_level(level: &Level) -> Result<LevelPayload> {
    let mut header = LevelHeader {
        magnification: level.magnification,
        has_cell_data: level.has_cell_data,
        offset_bytes: 0,
        default_state: level.default_state,
        index_data_offset: 0,
        cell_x_start: level.cell_x_start,
        cell_x_end: level.cell_x_end,
        cell_y_start: level.cell_y_start,
        cell_y_end: level.cell_y_end,
    };

    if !level.has_cell_data {
        debug!(
            "Level {}: all cells are '{}', no cell index needed",
            level.magnification, level.default_state
        );
        return Ok(LevelPayload {
            header,
            body: Vec::new(),
            tiled_cells: 0,
        });
    }

    let mut cells: Vec<(&Pixel, &Vec<GroundTile>)> = level
        .cell_tiles
        .iter()
        .filter(|(cell, tiles)| !tiles.is_empty() && level.contains(**cell))
        .collect();
    cells.sort_by_key(|(cell, _)| (cell.y, cell.x));

    let mut data = vec![0u8; DATA_PREFIX as usize];
    let mut offsets: FxHashMap<Pixel, u64> = FxHashMap::default();
    for (cell, tiles) in &cells {
        offsets.insert(**cell, data.len() as u64);
        write_tiles(&mut data, tiles)?;
    }

    header.offset_bytes = bytes_needed(data.len() as u64);
    let width = header.offset_bytes as usize;

    let mut body = Vec::with_capacity(level.cell_count() * width + data.len());
    for cell in level.cells() {
        let entry = match offsets.get(&cell) {
            Some(offset) => *offset,
            None => level.state(cell).as_u8() as u64,
        };
        body.write_uint::<LE>(entry, width)?;
    }
    body.extend_from_slice(&data);

    debug!(
        "Level {}: {} cells, {} tiled cells, {} bytes/entry, {} bytes",
        level.magnification,
        level.cell_count(),
        cells.len(),
        width,
        body.len()
    );

    Ok(LevelPayload {
        header,
        body,
        tiled_cells: cells.len(),
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_file(path: &Path, min_mag: u32, max_mag: u32, levels: &[LevelPayload]) -> Result<()> {
    let header_size = varint_len(min_mag as u64)
        + varint_len(max_mag as u64)
        + levels.iter().map(|l| l.header.encoded_len()).sum::<usize>();

    // Place every body before writing anything
    let mut headers = Vec::with_capacity(levels.len());
    let mut position = header_size as u64;
    for level in levels {
        let mut header = level.header;
        if header.has_cell_data {
            header.index_data_offset = position;
            position += level.body.len() as u64;
        } else {
            header.index_data_offset = 0;
        }
        headers.push(header);
    }

    let mut writer = BufWriter::new(File::create(path)?);
    write_varint(&mut writer, min_mag as u64)?;
    write_varint(&mut writer, max_mag as u64)?;
    for header in &headers {
        header.write(&mut writer)?;
    }
    for level in levels.iter().filter(|l| l.header.has_cell_data) {
        writer.write_all(&level.body)?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Write the index for `min_mag..=max_mag`; `levels` must hold one payload
/// per magnification in ascending order.
///
/// The file is written next to `path` with a `.tmp` suffix and renamed into
/// place once complete; on failure the temporary file is removed.
pub fn write_index<P: AsRef<Path>>(
    path: P,
    min_mag: u32,
    max_mag: u32,
    levels: &[LevelPayload],
) -> Result<()> {
    let path = path.as_ref();
    let expected: Vec<u32> = (min_mag..=max_mag).collect();
    let actual: Vec<u32> = levels.iter().map(|l| l.header.magnification).collect();
    if expected != actual {
        return Err(Error::Config(format!(
            "level payloads {actual:?} do not match magnifications {min_mag}..={max_mag}"
        )));
    }

    let tmp = temp_path(path);
    if let Err(e) = write_file(&tmp, min_mag, max_mag, levels) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Contents of one cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellData {
    State(State),
    Tiles(Vec<GroundTile>),
}

impl CellData {
    /// Cells carrying tiles are coast cells
    pub fn state(&self) -> State {
        match self {
            CellData::State(state) => *state,
            CellData::Tiles(_) => State::Coast,
        }
    }

    pub fn tiles(&self) -> &[GroundTile] {
        match self {
            CellData::State(_) => &[],
            CellData::Tiles(tiles) => tiles,
        }
    }
}

/// Truncated or undecodable input is a format error, anything else is I/O
fn decode_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => Error::Format(e.to_string()),
        _ => Error::Io(e),
    }
}

fn read_u32_varint<R: Read>(reader: &mut R, what: &str) -> Result<u32> {
    let value = read_varint(reader).map_err(decode_error)?;
    u32::try_from(value).map_err(|_| Error::Format(format!("{what} {value} out of range")))
}

/// Random-access reader over a water index
pub struct WaterIndexReader<R> {
    reader: R,
    len: u64,
    min_mag: u32,
    max_mag: u32,
    levels: Vec<LevelHeader>,
}

impl WaterIndexReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingInput {
                what: "water index",
                path: path.to_path_buf(),
            });
        }
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> WaterIndexReader<R> {
    /// Parse the global and level headers
    pub fn new(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let min_mag = read_u32_varint(&mut reader, "min_mag")?;
        let max_mag = read_u32_varint(&mut reader, "max_mag")?;
        if min_mag > max_mag || max_mag > MAX_SUPPORTED_MAG {
            return Err(Error::Format(format!("bad magnification range {min_mag}..={max_mag}")));
        }

        let mut levels = Vec::with_capacity((max_mag - min_mag + 1) as usize);
        for magnification in min_mag..=max_mag {
            let has_cell_data = reader.read_u8().map_err(decode_error)? != 0;
            let offset_bytes = reader.read_u8().map_err(decode_error)?;
            let raw_state = reader.read_u8().map_err(decode_error)?;
            let default_state = State::from_u8(raw_state).ok_or_else(|| {
                Error::Format(format!("level {magnification}: bad default state {raw_state}"))
            })?;
            let index_data_offset = reader.read_u64::<LE>().map_err(decode_error)?;

            let header = LevelHeader {
                magnification,
                has_cell_data,
                offset_bytes,
                default_state,
                index_data_offset,
                cell_x_start: read_u32_varint(&mut reader, "cell_x_start")?,
                cell_x_end: read_u32_varint(&mut reader, "cell_x_end")?,
                cell_y_start: read_u32_varint(&mut reader, "cell_y_start")?,
                cell_y_end: read_u32_varint(&mut reader, "cell_y_end")?,
            };

            let last = (1u32 << magnification) - 1;
            if header.cell_x_start > header.cell_x_end
                || header.cell_y_start > header.cell_y_end
                || header.cell_x_end > last
                || header.cell_y_end > last
            {
                return Err(Error::Format(format!("level {magnification}: bad cell rectangle")));
            }
            if has_cell_data {
                if !(1..=8).contains(&offset_bytes) {
                    return Err(Error::Format(format!(
                        "level {magnification}: bad offset width {offset_bytes}"
                    )));
                }
                let data_end = header
                    .data_offset()
                    .and_then(|offset| offset.checked_add(DATA_PREFIX));
                if data_end.map_or(true, |end| end > len) {
                    return Err(Error::Format(format!(
                        "level {magnification}: bitmap beyond end of file"
                    )));
                }
            }

            levels.push(header);
        }

        Ok(Self {
            reader,
            len,
            min_mag,
            max_mag,
            levels,
        })
    }

    pub fn min_mag(&self) -> u32 {
        self.min_mag
    }

    pub fn max_mag(&self) -> u32 {
        self.max_mag
    }

    pub fn levels(&self) -> &[LevelHeader] {
        &self.levels
    }

    pub fn level(&self, magnification: u32) -> Option<&LevelHeader> {
        magnification
            .checked_sub(self.min_mag)
            .and_then(|index| self.levels.get(index as usize))
    }

    fn header(&self, magnification: u32) -> Result<LevelHeader> {
        self.level(magnification)
            .copied()
            .ok_or_else(|| Error::Format(format!("magnification {magnification} not in index")))
    }

    /// State or tiles of the absolute cell `(x, y)`; cells outside the level
    /// rectangle are unknown
    pub fn cell(&mut self, magnification: u32, x: u32, y: u32) -> Result<CellData> {
        let header = self.header(magnification)?;
        if !header.contains(x, y) {
            return Ok(CellData::State(State::Unknown));
        }
        if !header.has_cell_data {
            return Ok(CellData::State(header.default_state));
        }

        let id = (y - header.cell_y_start) as u64 * header.cell_x_count()
            + (x - header.cell_x_start) as u64;
        let width = header.offset_bytes as u64;
        // bounded by the bitmap extent checked in `new`
        self.reader
            .seek(SeekFrom::Start(header.index_data_offset + id * width))?;
        let entry = self
            .reader
            .read_uint::<LE>(width as usize)
            .map_err(decode_error)?;

        if entry < DATA_PREFIX {
            return Ok(CellData::State(State::from_u8(entry as u8).unwrap_or_default()));
        }

        let position = header
            .data_offset()
            .and_then(|offset| offset.checked_add(entry))
            .filter(|position| *position < self.len);
        let Some(position) = position else {
            return Err(Error::Format(format!(
                "level {magnification}: cell ({x},{y}) offset {entry} beyond end of file"
            )));
        };
        self.reader.seek(SeekFrom::Start(position))?;
        Ok(CellData::Tiles(self.read_tiles()?))
    }

    fn read_tiles(&mut self) -> Result<Vec<GroundTile>> {
        let count = read_varint(&mut self.reader).map_err(decode_error)?;
        let mut tiles = Vec::new();
        for _ in 0..count {
            let raw_type = self.reader.read_u8().map_err(decode_error)?;
            let tile_type = TileType::from_u8(raw_type)
                .ok_or_else(|| Error::Format(format!("unknown tile type {raw_type}")))?;
            let coord_count = read_varint(&mut self.reader).map_err(decode_error)?;

            let mut tile = GroundTile::new(tile_type);
            for _ in 0..coord_count {
                let x = self.reader.read_u16::<LE>().map_err(decode_error)?;
                let y = self.reader.read_u16::<LE>().map_err(decode_error)?;
                tile.coords
                    .push(TileCoord::new(x & !COAST_FLAG, y, x & COAST_FLAG != 0));
            }
            tiles.push(tile);
        }
        Ok(tiles)
    }

    /// All cells of the level covering `bbox`, clamped to the level rectangle,
    /// row by row from the south
    pub fn query(&mut self, magnification: u32, bbox: &GeoBox) -> Result<Vec<(Pixel, CellData)>> {
        let header = self.header(magnification)?;
        let cells_per_axis = (1u64 << magnification) as f64;
        let cell_width = 360.0 / cells_per_axis;
        let cell_height = 180.0 / cells_per_axis;

        let x_lo = ((bbox.min_lon + 180.0) / cell_width).floor() as i64;
        let x_hi = ((bbox.max_lon + 180.0) / cell_width).floor() as i64;
        let y_lo = ((bbox.min_lat + 90.0) / cell_height).floor() as i64;
        let y_hi = ((bbox.max_lat + 90.0) / cell_height).floor() as i64;

        if x_hi < header.cell_x_start as i64
            || x_lo > header.cell_x_end as i64
            || y_hi < header.cell_y_start as i64
            || y_lo > header.cell_y_end as i64
        {
            return Ok(Vec::new());
        }

        let x_range = x_lo.max(header.cell_x_start as i64) as u32
            ..=x_hi.min(header.cell_x_end as i64) as u32;
        let y_range = y_lo.max(header.cell_y_start as i64) as u32
            ..=y_hi.min(header.cell_y_end as i64) as u32;

        let mut cells = Vec::new();
        for y in y_range {
            for x in x_range.clone() {
                cells.push((Pixel::new(x, y), self.cell(magnification, x, y)?));
            }
        }
        Ok(cells)
    }
}
