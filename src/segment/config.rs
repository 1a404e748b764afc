//! Session configuration and the optional geometry sidecar.
//!
//! Tile files embed no geometry. A session can record its geometry in a
//! small JSON file next to the tile file (`<tile file>.json`) so a later
//! session can reopen it without being told the layout out of band.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::segment::geometry::{MemoryPolicy, SegmentGeometry};
use crate::segment::types::*;

// ── SegmentConfig ──────────────────────────────────────────────────

/// Tunables for a segment session. Missing JSON fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    pub tile_rows: usize,
    pub tile_cols: usize,
    /// Resident tile budget policy.
    pub memory: MemoryPolicy,
    /// Pre-fill new tile files with null cells.
    pub fill: bool,
    /// Reserved bytes before every tile payload.
    pub header_bytes: usize,
    /// Verify file length against geometry on `open`.
    pub open_checked: bool,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            tile_rows: DEFAULT_TILE_ROWS,
            tile_cols: DEFAULT_TILE_COLS,
            memory: MemoryPolicy::default(),
            fill: true,
            header_bytes: DEFAULT_HEADER_BYTES,
            open_checked: false,
        }
    }
}

impl SegmentConfig {
    /// Geometry of a `rows x cols` matrix under this tile shape.
    pub fn geometry(&self, rows: usize, cols: usize) -> Result<SegmentGeometry> {
        SegmentGeometry::new(rows, cols, self.tile_rows, self.tile_cols)
    }
}

// ── Sidecar ────────────────────────────────────────────────────────

/// Everything needed to reopen a tile file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSidecar {
    pub rows: usize,
    pub cols: usize,
    pub element_size: usize,
    pub config: SegmentConfig,
}

impl SegmentSidecar {
    /// Sidecar location for a tile file.
    pub fn path_for(tile_path: &Path) -> PathBuf {
        let mut name = tile_path.as_os_str().to_os_string();
        name.push(".");
        name.push(CONFIG_SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    /// Read the sidecar of `tile_path`. Returns None if it doesn't exist.
    pub fn read_from(tile_path: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(tile_path);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&path).map_err(|e| SegmentError::io(&path, None, e))?;
        let sidecar: Self = serde_json::from_str(&contents)?;
        sidecar.geometry()?;
        Ok(Some(sidecar))
    }

    /// Write the sidecar next to `tile_path`.
    pub fn write_to(&self, tile_path: &Path) -> Result<()> {
        let path = Self::path_for(tile_path);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| SegmentError::io(&path, None, e))?;
        Ok(())
    }

    pub fn geometry(&self) -> Result<SegmentGeometry> {
        self.config.geometry(self.rows, self.cols)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
