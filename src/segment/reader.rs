//! Read-only view of a flushed tile file.
//!
//! For readers outside the session that wrote the file. Only data written
//! before the writer's last `flush()` is visible; the file must not be
//! modified while mapped.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Result, SegmentError};
use crate::segment::geometry::SegmentGeometry;
use crate::segment::tile_file::TileLayout;
use crate::segment::types::{decode_into, CellValue};

/// Memory-mapped tile file reader.
#[derive(Debug)]
pub struct MappedTiles {
    mmap: Mmap,
    geometry: SegmentGeometry,
    layout: TileLayout,
}

impl MappedTiles {
    /// Map `path`, verifying its length matches the geometry.
    pub fn open(
        path: &Path,
        geometry: SegmentGeometry,
        element_size: usize,
        header_bytes: usize,
    ) -> Result<Self> {
        let layout = TileLayout::new(&geometry, element_size, header_bytes)?;
        let file = File::open(path).map_err(|e| SegmentError::io(path, None, e))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SegmentError::io(path, None, e))?;
        if mmap.len() as u64 != layout.file_size() {
            return Err(SegmentError::InvalidFormat(format!(
                "{}: mapped {} bytes, layout needs {}",
                path.display(),
                mmap.len(),
                layout.file_size()
            )));
        }
        Ok(Self {
            mmap,
            geometry,
            layout,
        })
    }

    pub fn geometry(&self) -> &SegmentGeometry {
        &self.geometry
    }

    /// Raw payload bytes of one tile.
    pub fn tile_bytes(&self, tile: usize) -> Result<&[u8]> {
        if tile >= self.layout.tile_count {
            return Err(SegmentError::InvalidGeometry(format!(
                "tile {} out of range ({} tiles)",
                tile, self.layout.tile_count
            )));
        }
        let start = self.layout.payload_offset(tile) as usize;
        Ok(&self.mmap[start..start + self.layout.tile_bytes])
    }

    pub fn get<T: CellValue>(&self, row: usize, col: usize) -> Result<T> {
        self.check_cell::<T>()?;
        let loc = self.geometry.locate(row, col)?;
        let offset = (loc.row * self.geometry.tile_cols + loc.col) * T::SIZE;
        let tile = self.tile_bytes(loc.tile)?;
        Ok(T::read_le(&tile[offset..offset + T::SIZE]))
    }

    pub fn read_row<T: CellValue>(&self, row: usize, buf: &mut [T]) -> Result<()> {
        self.check_cell::<T>()?;
        let geo = self.geometry;
        geo.check_bounds(row, 0)?;
        if buf.len() != geo.cols {
            return Err(SegmentError::InvalidGeometry(format!(
                "row buffer holds {} cells, matrix has {} columns",
                buf.len(),
                geo.cols
            )));
        }
        let row_bytes = (row % geo.tile_rows) * geo.tile_cols * T::SIZE;
        let base = (row / geo.tile_rows) * geo.tiles_per_row();
        for tile_col in 0..geo.tiles_per_row() {
            let col0 = tile_col * geo.tile_cols;
            let width = geo.tile_cols.min(geo.cols - col0);
            let tile = self.tile_bytes(base + tile_col)?;
            decode_into(
                &tile[row_bytes..row_bytes + width * T::SIZE],
                &mut buf[col0..col0 + width],
            );
        }
        Ok(())
    }

    fn check_cell<T: CellValue>(&self) -> Result<()> {
        if T::SIZE * self.geometry.tile_len() != self.layout.tile_bytes {
            return Err(SegmentError::InvalidFormat(format!(
                "reader mapped for {}-byte cells, asked for {}-byte cells",
                self.layout.tile_bytes / self.geometry.tile_len(),
                T::SIZE
            )));
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
