//! Bounded working set of tiles over a `TileFile`.
//!
//! Holds at most `budget` resident tiles. A miss loads the tile from disk;
//! when full, the least recently touched tile is evicted first, written
//! back synchronously if dirty. Dirty tiles otherwise reach disk only on
//! `flush_all`.
//!
//! Tile buffers never leave the cache: callers copy bytes in and out
//! through `read_bytes` / `write_bytes`, so eviction is always safe
//! between calls.
//!
//! NOT Send+Sync -- single owner, blocking I/O.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, SegmentError};
use crate::segment::tile_file::{IoStats, TileFile};

/// In-memory copy of one tile.
#[derive(Debug)]
struct ResidentTile {
    index: usize,
    data: Box<[u8]>,
    dirty: bool,
    /// Recency tick of the last touch; key into the LRU order.
    last_touch: u64,
}

/// Hit/miss counters of a cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Dirty tiles written because they were evicted.
    pub write_backs: u64,
}

/// LRU write-back tile cache owning one tile file handle.
#[derive(Debug)]
pub struct SegmentCache {
    file: TileFile,
    budget: usize,

    /// Resident tiles keyed by tile index.
    tiles: HashMap<usize, ResidentTile>,

    /// Touch tick -> tile index. First entry is the LRU victim.
    lru: BTreeMap<u64, usize>,

    tick: u64,
    stats: CacheStats,
}

impl SegmentCache {
    // -- Constructors ---------------------------------------------------------

    /// Wrap `file` with a cache of `budget` tiles (must be at least 1).
    pub fn new(file: TileFile, budget: usize) -> Result<Self> {
        if budget == 0 {
            return Err(SegmentError::InvalidGeometry(
                "cache budget must be at least one tile".into(),
            ));
        }
        let capacity = budget.min(file.layout().tile_count);
        tracing::debug!(path = %file.path().display(), budget, "segment cache created");
        Ok(Self {
            file,
            budget,
            tiles: HashMap::with_capacity(capacity),
            lru: BTreeMap::new(),
            tick: 0,
            stats: CacheStats::default(),
        })
    }

    // -- Residency ------------------------------------------------------------

    /// Make `tile` resident and most recently used.
    pub fn touch(&mut self, tile: usize) -> Result<()> {
        self.tick += 1;
        let tick = self.tick;

        if let Some(resident) = self.tiles.get_mut(&tile) {
            self.lru.remove(&resident.last_touch);
            resident.last_touch = tick;
            self.lru.insert(tick, tile);
            self.stats.hits += 1;
            return Ok(());
        }

        let tile_count = self.file.layout().tile_count;
        if tile >= tile_count {
            return Err(SegmentError::InvalidGeometry(format!(
                "tile {} out of range ({} tiles)",
                tile, tile_count
            )));
        }

        self.stats.misses += 1;
        let mut data = if self.tiles.len() >= self.budget {
            self.evict_lru()?
        } else {
            vec![0u8; self.file.layout().tile_bytes].into_boxed_slice()
        };

        // On a failed read the reused buffer is dropped; the cache is left
        // one tile smaller, never larger.
        self.file.read_tile(tile, &mut data)?;
        tracing::trace!(tile, "tile loaded");

        self.tiles.insert(
            tile,
            ResidentTile {
                index: tile,
                data,
                dirty: false,
                last_touch: tick,
            },
        );
        self.lru.insert(tick, tile);
        Ok(())
    }

    /// Evict the least recently touched tile and hand back its buffer.
    ///
    /// A dirty victim is written first. If that write fails the victim
    /// stays resident and dirty.
    fn evict_lru(&mut self) -> Result<Box<[u8]>> {
        let (&tick, &victim) = self
            .lru
            .first_key_value()
            .ok_or_else(|| SegmentError::InvalidGeometry("evict from empty cache".into()))?;

        if let Some(resident) = self.tiles.get(&victim) {
            if resident.dirty {
                self.file.write_tile(victim, &resident.data)?;
                self.stats.write_backs += 1;
            }
        }

        self.lru.remove(&tick);
        self.stats.evictions += 1;
        let resident = self.tiles.remove(&victim).ok_or_else(|| {
            SegmentError::InvalidGeometry(format!("LRU entry for non-resident tile {}", victim))
        })?;
        tracing::debug!(tile = victim, dirty = resident.dirty, "tile evicted");
        Ok(resident.data)
    }

    /// Set the dirty flag on a resident tile. No-op if already dirty.
    pub fn mark_dirty(&mut self, tile: usize) -> Result<()> {
        let resident = self.tiles.get_mut(&tile).ok_or_else(|| {
            SegmentError::InvalidGeometry(format!("tile {} is not resident", tile))
        })?;
        resident.dirty = true;
        Ok(())
    }

    // -- Copy In / Copy Out ---------------------------------------------------

    /// Copy `out.len()` bytes starting at `offset` within `tile` into `out`.
    pub fn read_bytes(&mut self, tile: usize, offset: usize, out: &mut [u8]) -> Result<()> {
        self.touch(tile)?;
        let resident = self.resident(tile)?;
        let src = span(&resident.data, offset, out.len())?;
        out.copy_from_slice(src);
        Ok(())
    }

    /// Copy `src` into `tile` at byte `offset` and mark the tile dirty.
    pub fn write_bytes(&mut self, tile: usize, offset: usize, src: &[u8]) -> Result<()> {
        self.touch(tile)?;
        let resident = self.tiles.get_mut(&tile).ok_or_else(|| {
            SegmentError::InvalidGeometry(format!("tile {} is not resident", tile))
        })?;
        let end = offset + src.len();
        if end > resident.data.len() {
            return Err(SegmentError::InvalidGeometry(format!(
                "span {}..{} exceeds tile of {} bytes",
                offset,
                end,
                resident.data.len()
            )));
        }
        resident.data[offset..end].copy_from_slice(src);
        resident.dirty = true;
        Ok(())
    }

    // -- Flush / Release ------------------------------------------------------

    /// Write every dirty tile in ascending tile order, then sync once.
    ///
    /// Returns the number of tiles written. Nothing is written or synced
    /// when no tile is dirty. Tiles stay resident.
    pub fn flush_all(&mut self) -> Result<usize> {
        let mut dirty: Vec<usize> = self
            .tiles
            .values()
            .filter(|t| t.dirty)
            .map(|t| t.index)
            .collect();
        if dirty.is_empty() {
            return Ok(0);
        }
        dirty.sort_unstable();

        for &tile in &dirty {
            if let Some(resident) = self.tiles.get_mut(&tile) {
                self.file.write_tile(tile, &resident.data)?;
                resident.dirty = false;
            }
        }
        self.file.sync()?;
        tracing::debug!(tiles = dirty.len(), "flushed dirty tiles");
        Ok(dirty.len())
    }

    /// Drop all resident tiles without writing them.
    pub fn release_all(&mut self) {
        let lost = self.tiles.values().filter(|t| t.dirty).count();
        if lost > 0 {
            tracing::warn!(dirty = lost, "releasing cache with unflushed tiles");
        }
        self.tiles.clear();
        self.lru.clear();
    }

    /// Give back the tile file handle, discarding resident tiles.
    pub fn into_file(mut self) -> TileFile {
        self.release_all();
        self.file
    }

    // -- Inspection -----------------------------------------------------------

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn resident_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_resident(&self, tile: usize) -> bool {
        self.tiles.contains_key(&tile)
    }

    pub fn is_dirty(&self, tile: usize) -> bool {
        self.tiles.get(&tile).is_some_and(|t| t.dirty)
    }

    /// Resident tile indices, least recently used first.
    pub fn lru_order(&self) -> Vec<usize> {
        self.lru.values().copied().collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn io_stats(&self) -> IoStats {
        self.file.stats()
    }

    pub fn file(&self) -> &TileFile {
        &self.file
    }

    fn resident(&self, tile: usize) -> Result<&ResidentTile> {
        self.tiles.get(&tile).ok_or_else(|| {
            SegmentError::InvalidGeometry(format!("tile {} is not resident", tile))
        })
    }
}

fn span(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    data.get(offset..offset + len).ok_or_else(|| {
        SegmentError::InvalidGeometry(format!(
            "span {}..{} exceeds tile of {} bytes",
            offset,
            offset + len,
            data.len()
        ))
    })
}

// ── Tests ──────────────────────────────────────────────────────────
