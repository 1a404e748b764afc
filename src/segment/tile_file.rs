//! Backing file for segmented matrices.
//!
//! A tile file is a flat sequence of fixed-size records in tile-index
//! order. Record `i` starts at byte `i * record_size`:
//!
//! ```text
//! [header: header_bytes, reserved zeros][payload: tile_rows * tile_cols * element_size]
//! [header][payload]
//! ...
//! ```
//!
//! The file carries no geometry of its own. Whoever reopens it must supply
//! the same layout it was formatted with; `open_checked` at least verifies
//! the total length.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SegmentError};
use crate::segment::geometry::SegmentGeometry;

// ── Layout ─────────────────────────────────────────────────────────

/// Record layout of a tile file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub tile_count: usize,
    /// Payload bytes per tile.
    pub tile_bytes: usize,
    /// Reserved bytes in front of each payload.
    pub header_bytes: usize,
}

impl TileLayout {
    /// Layout for `geometry`. Fails if a record or the whole file would not
    /// be addressable.
    pub fn new(
        geometry: &SegmentGeometry,
        element_size: usize,
        header_bytes: usize,
    ) -> Result<Self> {
        let overflow = || {
            SegmentError::InvalidGeometry(format!(
                "{} tiles of {}x{} {}-byte cells (header {}) overflow the file size",
                geometry.tile_count(),
                geometry.tile_rows,
                geometry.tile_cols,
                element_size,
                header_bytes
            ))
        };
        let tile_bytes = geometry
            .tile_rows
            .checked_mul(geometry.tile_cols)
            .and_then(|len| len.checked_mul(element_size))
            .ok_or_else(overflow)?;
        let record_size = tile_bytes.checked_add(header_bytes).ok_or_else(overflow)?;
        let tile_count = geometry.tile_count();
        (tile_count as u64)
            .checked_mul(record_size as u64)
            .filter(|&size| usize::try_from(size).is_ok())
            .ok_or_else(overflow)?;
        Ok(Self {
            tile_count,
            tile_bytes,
            header_bytes,
        })
    }

    pub fn record_size(&self) -> usize {
        self.header_bytes + self.tile_bytes
    }

    /// Exact size of a formatted file. `new` guarantees this fits.
    pub fn file_size(&self) -> u64 {
        self.tile_count as u64 * self.record_size() as u64
    }

    /// Byte offset of a tile's payload (past its header).
    pub fn payload_offset(&self, tile: usize) -> u64 {
        tile as u64 * self.record_size() as u64 + self.header_bytes as u64
    }
}

/// How `format` initializes tile records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Every record written with zeros; unwritten cells read as null.
    Filled,
    /// File only sized. Contents of never-written tiles are unspecified.
    Unfilled,
}

impl From<bool> for FillMode {
    fn from(fill: bool) -> Self {
        if fill {
            FillMode::Filled
        } else {
            FillMode::Unfilled
        }
    }
}

/// Counters for record-level I/O issued through a `TileFile`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub tile_reads: u64,
    pub tile_writes: u64,
    pub syncs: u64,
}

// ── TileFile ───────────────────────────────────────────────────────

/// Open handle on a tile file.
///
/// Only one handle per path should be live at a time; concurrent access
/// from another process or session is not coordinated.
#[derive(Debug)]
pub struct TileFile {
    file: File,
    path: PathBuf,
    layout: TileLayout,
    stats: IoStats,
}

impl TileFile {
    /// Create (or truncate) a tile file sized for `geometry`.
    pub fn format(
        path: &Path,
        geometry: &SegmentGeometry,
        element_size: usize,
        header_bytes: usize,
        fill: FillMode,
    ) -> Result<Self> {
        if element_size == 0 {
            return Err(SegmentError::InvalidGeometry(
                "element size must be positive".into(),
            ));
        }
        let layout = TileLayout::new(geometry, element_size, header_bytes)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| SegmentError::io(path, None, e))?;

        match fill {
            FillMode::Filled => {
                let record = vec![0u8; layout.record_size()];
                let mut writer = BufWriter::new(&file);
                for tile in 0..layout.tile_count {
                    writer
                        .write_all(&record)
                        .map_err(|e| SegmentError::io(path, Some(tile), e))?;
                }
                writer.flush().map_err(|e| SegmentError::io(path, None, e))?;
            }
            FillMode::Unfilled => {
                file.set_len(layout.file_size())
                    .map_err(|e| SegmentError::io(path, None, e))?;
            }
        }
        file.sync_data().map_err(|e| SegmentError::io(path, None, e))?;

        tracing::debug!(
            path = %path.display(),
            tiles = layout.tile_count,
            record_size = layout.record_size(),
            ?fill,
            "formatted tile file"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            layout,
            stats: IoStats::default(),
        })
    }

    /// Reopen a file created by `format`. The layout is trusted as given.
    pub fn open(path: &Path, layout: TileLayout) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| SegmentError::io(path, None, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            layout,
            stats: IoStats::default(),
        })
    }

    /// Like `open`, but rejects a file whose length does not match `layout`.
    pub fn open_checked(path: &Path, layout: TileLayout) -> Result<Self> {
        let handle = Self::open(path, layout)?;
        let actual = handle
            .file
            .metadata()
            .map_err(|e| SegmentError::io(path, None, e))?
            .len();
        if actual != layout.file_size() {
            return Err(SegmentError::InvalidFormat(format!(
                "{}: expected {} bytes for {} tiles of {} bytes, found {}",
                path.display(),
                layout.file_size(),
                layout.tile_count,
                layout.record_size(),
                actual
            )));
        }
        Ok(handle)
    }

    /// Handle that can load but never store tiles.
    #[cfg(test)]
    pub(crate) fn open_read_only(path: &Path, layout: TileLayout) -> Result<Self> {
        let file = File::open(path).map_err(|e| SegmentError::io(path, None, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            layout,
            stats: IoStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    pub fn stats(&self) -> IoStats {
        self.stats
    }

    /// Read one tile payload into `buf` (`buf.len() == tile_bytes`).
    pub fn read_tile(&mut self, tile: usize, buf: &mut [u8]) -> Result<()> {
        self.check_record(tile, buf.len())?;
        let offset = self.layout.payload_offset(tile);
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(buf))
            .map_err(|e| SegmentError::io(&self.path, Some(tile), e))?;
        self.stats.tile_reads += 1;
        tracing::trace!(tile, "read tile");
        Ok(())
    }

    /// Write one tile payload. Not durable until `sync`.
    pub fn write_tile(&mut self, tile: usize, buf: &[u8]) -> Result<()> {
        self.check_record(tile, buf.len())?;
        let offset = self.layout.payload_offset(tile);
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(buf))
            .map_err(|e| SegmentError::io(&self.path, Some(tile), e))?;
        self.stats.tile_writes += 1;
        tracing::trace!(tile, "wrote tile");
        Ok(())
    }

    /// Make written records durable.
    pub fn sync(&mut self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|e| SegmentError::io(&self.path, None, e))?;
        self.stats.syncs += 1;
        Ok(())
    }

    /// Close the handle and delete the file.
    pub fn remove(self) -> Result<()> {
        let TileFile { file, path, .. } = self;
        drop(file);
        std::fs::remove_file(&path).map_err(|e| SegmentError::io(&path, None, e))
    }

    fn check_record(&self, tile: usize, len: usize) -> Result<()> {
        if tile >= self.layout.tile_count {
            return Err(SegmentError::InvalidGeometry(format!(
                "tile {} out of range ({} tiles)",
                tile, self.layout.tile_count
            )));
        }
        if len != self.layout.tile_bytes {
            return Err(SegmentError::InvalidGeometry(format!(
                "tile buffer is {} bytes, expected {}",
                len, self.layout.tile_bytes
            )));
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
