//! Tile geometry: tile counts, addressing and cache budgets.
//!
//! All arithmetic is integer-only. A partially covered edge tile counts as
//! a whole tile and is fully allocated on disk.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::segment::resource::SystemResources;

// ── Free Functions ─────────────────────────────────────────────────

/// `ceil(rows/tile_rows) * ceil(cols/tile_cols)`, saturating at `usize::MAX`.
pub fn tile_count(rows: usize, cols: usize, tile_rows: usize, tile_cols: usize) -> usize {
    rows.div_ceil(tile_rows)
        .saturating_mul(cols.div_ceil(tile_cols))
}

/// Recommended number of resident tiles.
///
/// A percent in `(0, 100)` keeps that share of all tiles. Anything else
/// (0, negative, 100 and above) means "use all memory" and falls back to
/// `4 * (rows/tile_rows + cols/tile_cols + 2)`, saturating. Never returns 0.
pub fn resident_budget(
    tile_count: usize,
    memory_percent: i64,
    rows: usize,
    cols: usize,
    tile_rows: usize,
    tile_cols: usize,
) -> usize {
    let budget = if memory_percent > 0 && memory_percent < 100 {
        (memory_percent as u128 * tile_count as u128 / 100) as usize
    } else {
        (rows / tile_rows)
            .saturating_add(cols / tile_cols)
            .saturating_add(2)
            .saturating_mul(4)
    };
    budget.max(1)
}

/// Split `(row, col)` into its tile index and in-tile offsets.
///
/// No bounds check; see [`SegmentGeometry::locate`] for the checked form.
pub fn locate(
    row: usize,
    col: usize,
    tile_rows: usize,
    tile_cols: usize,
    tiles_per_row: usize,
) -> TileLocation {
    TileLocation {
        tile: (row / tile_rows) * tiles_per_row + col / tile_cols,
        row: row % tile_rows,
        col: col % tile_cols,
    }
}

// ── TileLocation ───────────────────────────────────────────────────

/// Tile index plus offset inside that tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileLocation {
    pub tile: usize,
    pub row: usize,
    pub col: usize,
}

// ── MemoryPolicy ───────────────────────────────────────────────────

/// How many tiles the cache may keep resident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPolicy {
    /// Percent of the tile count, with the "all memory" fallback rule.
    Percent(i64),
    /// Absolute tile count, clamped to `[1, tile_count]`.
    Tiles(usize),
    /// Fraction of currently available host memory.
    Available { fraction: f64 },
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        MemoryPolicy::Percent(crate::segment::types::DEFAULT_MEMORY_PERCENT)
    }
}

// ── SegmentGeometry ────────────────────────────────────────────────

/// Matrix dimensions and tile shape of one segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentGeometry {
    pub rows: usize,
    pub cols: usize,
    pub tile_rows: usize,
    pub tile_cols: usize,
}

impl SegmentGeometry {
    /// Validate and build. Every dimension must be positive, and both the
    /// tile count and the cells per tile must fit in `usize`.
    pub fn new(rows: usize, cols: usize, tile_rows: usize, tile_cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(SegmentError::InvalidGeometry(format!(
                "matrix dimensions must be positive, got {}x{}",
                rows, cols
            )));
        }
        if tile_rows == 0 || tile_cols == 0 {
            return Err(SegmentError::InvalidGeometry(format!(
                "tile dimensions must be positive, got {}x{}",
                tile_rows, tile_cols
            )));
        }
        if tile_rows.checked_mul(tile_cols).is_none() {
            return Err(SegmentError::InvalidGeometry(format!(
                "{}x{} tile holds more cells than usize can count",
                tile_rows, tile_cols
            )));
        }
        if rows
            .div_ceil(tile_rows)
            .checked_mul(cols.div_ceil(tile_cols))
            .is_none()
        {
            return Err(SegmentError::InvalidGeometry(format!(
                "{}x{} matrix in {}x{} tiles has more tiles than usize can count",
                rows, cols, tile_rows, tile_cols
            )));
        }
        Ok(Self {
            rows,
            cols,
            tile_rows,
            tile_cols,
        })
    }

    /// Re-check a geometry that did not come through `new` (e.g. deserialized).
    pub fn validate(&self) -> Result<()> {
        Self::new(self.rows, self.cols, self.tile_rows, self.tile_cols).map(|_| ())
    }

    /// Number of tiles along one row of the matrix (column-tile count).
    pub fn tiles_per_row(&self) -> usize {
        self.cols.div_ceil(self.tile_cols)
    }

    /// Number of tiles along one column of the matrix (row-tile count).
    pub fn tiles_per_col(&self) -> usize {
        self.rows.div_ceil(self.tile_rows)
    }

    pub fn tile_count(&self) -> usize {
        tile_count(self.rows, self.cols, self.tile_rows, self.tile_cols)
    }

    /// Elements per tile.
    pub fn tile_len(&self) -> usize {
        self.tile_rows.saturating_mul(self.tile_cols)
    }

    /// Payload bytes per tile. Saturates; `TileLayout::new` rejects overflow.
    pub fn tile_bytes(&self, element_size: usize) -> usize {
        self.tile_len().saturating_mul(element_size)
    }

    /// On-disk record size: reserved header followed by the payload.
    pub fn record_size(&self, element_size: usize, header_bytes: usize) -> usize {
        header_bytes.saturating_add(self.tile_bytes(element_size))
    }

    /// Checked form of [`locate`].
    pub fn locate(&self, row: usize, col: usize) -> Result<TileLocation> {
        self.check_bounds(row, col)?;
        Ok(locate(row, col, self.tile_rows, self.tile_cols, self.tiles_per_row()))
    }

    pub fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(SegmentError::CoordinateOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    /// Percent-rule budget for this geometry.
    pub fn resident_budget(&self, memory_percent: i64) -> usize {
        resident_budget(
            self.tile_count(),
            memory_percent,
            self.rows,
            self.cols,
            self.tile_rows,
            self.tile_cols,
        )
    }

    /// Resolve any policy to a tile budget, probing host memory if needed.
    pub fn budget(&self, policy: &MemoryPolicy, element_size: usize) -> usize {
        match policy {
            MemoryPolicy::Available { .. } => {
                self.budget_with(policy, element_size, &SystemResources::detect())
            }
            _ => self.budget_with(policy, element_size, &SystemResources::default()),
        }
    }

    /// Resolve a policy against an explicit resource snapshot.
    pub fn budget_with(
        &self,
        policy: &MemoryPolicy,
        element_size: usize,
        resources: &SystemResources,
    ) -> usize {
        let total = self.tile_count();
        match *policy {
            MemoryPolicy::Percent(p) => self.resident_budget(p),
            MemoryPolicy::Tiles(n) => n.clamp(1, total),
            MemoryPolicy::Available { fraction } => {
                let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
                let bytes = (resources.available_memory_bytes as f64 * fraction) as u64;
                let per_tile = self.tile_bytes(element_size).max(1) as u64;
                ((bytes / per_tile) as usize).clamp(1, total)
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_count_ceil() {
        assert_eq!(tile_count(10, 10, 4, 4), 9);
        assert_eq!(tile_count(8, 8, 4, 4), 4);
        assert_eq!(tile_count(1, 1, 64, 64), 1);
        assert_eq!(tile_count(65, 1, 64, 64), 2);
    }

    #[test]
    fn test_locate_scenario() {
        let geo = SegmentGeometry::new(10, 10, 4, 4).unwrap();
        assert_eq!(geo.tiles_per_row(), 3);
        let loc = geo.locate(9, 9).unwrap();
        assert_eq!(loc, TileLocation { tile: 8, row: 1, col: 1 });
        assert_eq!(locate(9, 9, 4, 4, 3), loc);
        assert_eq!(geo.locate(0, 0).unwrap().tile, 0);
        assert_eq!(geo.locate(4, 0).unwrap().tile, 3);
        assert_eq!(geo.locate(0, 4).unwrap().tile, 1);
    }

    #[test]
    fn test_locate_out_of_bounds() {
        let geo = SegmentGeometry::new(10, 10, 4, 4).unwrap();
        assert!(geo.locate(10, 0).unwrap_err().is_invalid_geometry());
        assert!(geo.locate(0, 10).unwrap_err().is_invalid_geometry());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(SegmentGeometry::new(0, 10, 4, 4).unwrap_err().is_invalid_geometry());
        assert!(SegmentGeometry::new(10, 10, 0, 4).unwrap_err().is_invalid_geometry());
        assert!(SegmentGeometry::new(10, 10, 4, 0).unwrap_err().is_invalid_geometry());
    }

    #[test]
    fn test_budget_percent() {
        assert_eq!(resident_budget(9, 50, 10, 10, 4, 4), 4);
        // 1% of 9 tiles floors to 0, clamped to 1
        assert_eq!(resident_budget(9, 1, 10, 10, 4, 4), 1);
    }

    #[test]
    fn test_budget_all_memory_sentinel() {
        // 4 * (10/4 + 10/4 + 2) = 4 * 6
        for p in [0, 100, 250, -5] {
            assert_eq!(resident_budget(9, p, 10, 10, 4, 4), 24, "percent {}", p);
        }
    }

    #[test]
    fn test_budget_policies() {
        let geo = SegmentGeometry::new(10, 10, 4, 4).unwrap();
        let res = SystemResources {
            total_memory_bytes: 1 << 30,
            available_memory_bytes: 4 * 16 * 8,
        };
        assert_eq!(geo.budget_with(&MemoryPolicy::Tiles(0), 8, &res), 1);
        assert_eq!(geo.budget_with(&MemoryPolicy::Tiles(5), 8, &res), 5);
        assert_eq!(geo.budget_with(&MemoryPolicy::Tiles(500), 8, &res), 9);
        // 512 bytes available, 128-byte tiles
        assert_eq!(
            geo.budget_with(&MemoryPolicy::Available { fraction: 1.0 }, 8, &res),
            4
        );
        assert_eq!(
            geo.budget_with(&MemoryPolicy::Available { fraction: 0.0 }, 8, &res),
            1
        );
        assert_eq!(geo.budget(&MemoryPolicy::Percent(50), 8), 4);
    }

    #[test]
    fn test_overflowing_geometry_rejected() {
        let half = usize::MAX / 2;
        assert!(SegmentGeometry::new(half, 4, 1, 1).unwrap_err().is_invalid_geometry());
        assert!(SegmentGeometry::new(4, 4, half, 4).unwrap_err().is_invalid_geometry());
        assert_eq!(tile_count(half, 4, 1, 1), usize::MAX);
        // Largest geometry that still counts its tiles
        assert!(SegmentGeometry::new(half, 2, 1, 1).is_ok());
    }

    #[test]
    fn test_budget_sentinel_saturates() {
        assert_eq!(resident_budget(1, 100, usize::MAX / 2, 1, 1, 1), usize::MAX);
        assert_eq!(resident_budget(1, 0, usize::MAX, usize::MAX, 1, 1), usize::MAX);
    }

    #[test]
    fn test_record_size() {
        let geo = SegmentGeometry::new(10, 10, 4, 4).unwrap();
        assert_eq!(geo.tile_bytes(8), 128);
        assert_eq!(geo.record_size(8, 16), 144);
    }
}
