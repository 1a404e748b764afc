//! Segment manager: the public face of one segmented matrix.
//!
//! Translates row and cell access into tile reads and writes through a
//! `SegmentCache`, and owns the session lifecycle:
//!
//! ```text
//! Idle --format/init/open--> Active --release--> Released --resume/open--> Active
//!   \                          |                    |
//!    `------------------------close----------------'--> Closed (terminal)
//! ```
//!
//! Reads within a session always see earlier writes of the same session,
//! flushed or not. Another reader of the file sees them only after
//! `flush()`.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::error::{Result, SegmentError, StorageState};
use crate::segment::cache::{CacheStats, SegmentCache};
use crate::segment::config::{SegmentConfig, SegmentSidecar};
use crate::segment::geometry::{MemoryPolicy, SegmentGeometry};
use crate::segment::tile_file::{FillMode, IoStats, TileFile, TileLayout};
use crate::segment::types::{decode_into, encode_from, CellValue};

#[derive(Debug)]
enum Session {
    Idle,
    Active(SegmentCache),
    Released(TileFile),
    Closed,
}

/// Out-of-core `rows x cols` matrix of `T`, paged through fixed-size tiles.
#[derive(Debug)]
pub struct SegmentManager<T: CellValue> {
    geometry: SegmentGeometry,
    policy: MemoryPolicy,
    header_bytes: usize,
    open_checked: bool,
    /// Fill mode of the last `format`, recorded in the sidecar.
    fill: FillMode,
    session: Session,

    /// Tile file this manager formatted or opened; deleted by `close()`.
    path: Option<PathBuf>,

    /// Byte staging for one tile row span.
    scratch: Vec<u8>,

    _cell: PhantomData<T>,
}

impl<T: CellValue> SegmentManager<T> {
    // -- Constructors ---------------------------------------------------------

    pub fn new(geometry: SegmentGeometry, policy: MemoryPolicy) -> Result<Self> {
        geometry.validate()?;
        TileLayout::new(&geometry, T::SIZE, 0)?;
        Ok(Self {
            geometry,
            policy,
            header_bytes: 0,
            open_checked: false,
            fill: FillMode::Filled,
            session: Session::Idle,
            path: None,
            scratch: vec![0u8; geometry.tile_cols * T::SIZE],
            _cell: PhantomData,
        })
    }

    /// Manager for a `rows x cols` matrix using the tile shape and policy
    /// of `config`.
    pub fn from_config(rows: usize, cols: usize, config: &SegmentConfig) -> Result<Self> {
        let mut manager = Self::new(config.geometry(rows, cols)?, config.memory)?;
        manager.header_bytes = config.header_bytes;
        manager.open_checked = config.open_checked;
        manager.fill = FillMode::from(config.fill);
        manager.layout()?;
        Ok(manager)
    }

    /// Reopen a tile file described by its sidecar (see [`Self::write_sidecar`]).
    pub fn open_with_sidecar(path: &Path) -> Result<Self> {
        let sidecar = SegmentSidecar::read_from(path)?.ok_or_else(|| {
            SegmentError::Storage(StorageState::MissingFile(SegmentSidecar::path_for(path)))
        })?;
        if sidecar.element_size != T::SIZE {
            return Err(SegmentError::InvalidFormat(format!(
                "{} stores {}-byte cells, opened as {}-byte cells",
                path.display(),
                sidecar.element_size,
                T::SIZE
            )));
        }
        let mut manager = Self::from_config(sidecar.rows, sidecar.cols, &sidecar.config)?;
        manager.open_checked = true;
        manager.open(path)?;
        Ok(manager)
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Create the tile file at `path`. The handle goes to [`Self::init`].
    ///
    /// From `Released`, the released handle is dropped and its file left on
    /// disk; `path()` and `close()` then refer to the new file.
    pub fn format(&mut self, path: &Path, fill: bool) -> Result<TileFile> {
        self.ensure_can_attach()?;
        let fill = FillMode::from(fill);
        let file = TileFile::format(path, &self.geometry, T::SIZE, self.header_bytes, fill)?;
        if let Session::Released(old) = std::mem::replace(&mut self.session, Session::Idle) {
            tracing::debug!(path = %old.path().display(), "dropped released tile file");
        }
        self.path = Some(path.to_path_buf());
        self.fill = fill;
        Ok(file)
    }

    /// Format a fresh file under the system temp directory.
    pub fn format_temp(&mut self, fill: bool) -> Result<TileFile> {
        self.ensure_can_attach()?;
        let temp_dir = std::env::temp_dir();
        let temp = tempfile::Builder::new()
            .prefix("rseg-")
            .suffix(".tiles")
            .tempfile_in(&temp_dir)
            .map_err(|e| SegmentError::io(&temp_dir, None, e))?;
        let path = temp
            .into_temp_path()
            .keep()
            .map_err(|e| SegmentError::io(&temp_dir, None, e.error))?;
        self.format(&path, fill)
    }

    /// Start a session on a formatted tile file.
    pub fn init(&mut self, file: TileFile) -> Result<()> {
        self.ensure_can_attach()?;
        let expected = self.layout()?;
        if *file.layout() != expected {
            return Err(SegmentError::InvalidFormat(format!(
                "{}: tile layout {:?} does not match manager layout {:?}",
                file.path().display(),
                file.layout(),
                expected
            )));
        }
        let budget = self.geometry.budget(&self.policy, T::SIZE);
        let path = file.path().to_path_buf();
        let cache = SegmentCache::new(file, budget)?;
        tracing::debug!(
            path = %path.display(),
            rows = self.geometry.rows,
            cols = self.geometry.cols,
            tiles = self.geometry.tile_count(),
            budget,
            "segment session started"
        );
        self.path = Some(path);
        self.session = Session::Active(cache);
        Ok(())
    }

    /// Open an existing tile file and start a session on it.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        self.ensure_can_attach()?;
        if !path.exists() {
            return Err(SegmentError::Storage(StorageState::MissingFile(
                path.to_path_buf(),
            )));
        }
        let layout = self.layout()?;
        let file = if self.open_checked {
            TileFile::open_checked(path, layout)?
        } else {
            TileFile::open(path, layout)?
        };
        // A released handle on another path is dropped here.
        self.session = Session::Idle;
        self.init(file)
    }

    /// Restart a session on the handle kept by `release()`.
    pub fn resume(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Released(file) => self.init(file),
            Session::Closed => {
                self.session = Session::Closed;
                Err(SegmentError::Storage(StorageState::Closed))
            }
            other => {
                let state = match other {
                    Session::Active(_) => StorageState::AlreadyActive,
                    _ => StorageState::NotInitialized,
                };
                self.session = other;
                Err(SegmentError::Storage(state))
            }
        }
    }

    /// Write every dirty tile to disk. Returns the number written.
    pub fn flush(&mut self) -> Result<usize> {
        self.cache_mut()?.flush_all()
    }

    /// Drop the cache without writing. The tile file stays on disk.
    pub fn release(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Active(cache) => {
                self.session = Session::Released(cache.into_file());
                Ok(())
            }
            Session::Released(file) => {
                self.session = Session::Released(file);
                Ok(())
            }
            Session::Idle => Err(SegmentError::Storage(StorageState::NotInitialized)),
            Session::Closed => {
                self.session = Session::Closed;
                Err(SegmentError::Storage(StorageState::Closed))
            }
        }
    }

    /// Flush, release and delete the tile file. Terminal.
    pub fn close(&mut self) -> Result<()> {
        if let Session::Active(cache) = &mut self.session {
            cache.flush_all()?;
        }
        let session = std::mem::replace(&mut self.session, Session::Closed);
        let file = match session {
            Session::Active(cache) => Some(cache.into_file()),
            Session::Released(file) => Some(file),
            Session::Idle => None,
            Session::Closed => return Err(SegmentError::Storage(StorageState::Closed)),
        };

        let path = self.path.take();
        match (file, &path) {
            (Some(file), _) => file.remove()?,
            (None, Some(path)) if path.exists() => {
                std::fs::remove_file(path).map_err(|e| SegmentError::io(path, None, e))?
            }
            _ => {}
        }
        if let Some(path) = &path {
            let sidecar = SegmentSidecar::path_for(path);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar).map_err(|e| SegmentError::io(&sidecar, None, e))?;
            }
        }
        tracing::debug!("segment session closed");
        Ok(())
    }

    /// Record geometry next to the tile file for [`Self::open_with_sidecar`].
    pub fn write_sidecar(&self) -> Result<PathBuf> {
        let path = self
            .path
            .as_deref()
            .ok_or(SegmentError::Storage(StorageState::NotInitialized))?;
        let sidecar = SegmentSidecar {
            rows: self.geometry.rows,
            cols: self.geometry.cols,
            element_size: T::SIZE,
            config: SegmentConfig {
                tile_rows: self.geometry.tile_rows,
                tile_cols: self.geometry.tile_cols,
                memory: self.policy,
                fill: self.fill == FillMode::Filled,
                header_bytes: self.header_bytes,
                open_checked: self.open_checked,
            },
        };
        sidecar.write_to(path)?;
        Ok(SegmentSidecar::path_for(path))
    }

    // -- Row Access -----------------------------------------------------------

    /// Copy row `row` into `buf` (`buf.len() == cols`).
    pub fn get_row(&mut self, row: usize, buf: &mut [T]) -> Result<()> {
        self.check_row(row, buf.len())?;
        let geo = self.geometry;
        let Self { session, scratch, .. } = self;
        let cache = active(session)?;

        let row_bytes = (row % geo.tile_rows) * geo.tile_cols * T::SIZE;
        let base = (row / geo.tile_rows) * geo.tiles_per_row();
        for tile_col in 0..geo.tiles_per_row() {
            let col0 = tile_col * geo.tile_cols;
            let width = geo.tile_cols.min(geo.cols - col0);
            let bytes = &mut scratch[..width * T::SIZE];
            cache.read_bytes(base + tile_col, row_bytes, bytes)?;
            decode_into(bytes, &mut buf[col0..col0 + width]);
        }
        Ok(())
    }

    /// Write `buf` (`buf.len() == cols`) as row `row`.
    pub fn put_row(&mut self, row: usize, buf: &[T]) -> Result<()> {
        self.check_row(row, buf.len())?;
        let geo = self.geometry;
        let Self { session, scratch, .. } = self;
        let cache = active(session)?;

        let row_bytes = (row % geo.tile_rows) * geo.tile_cols * T::SIZE;
        let base = (row / geo.tile_rows) * geo.tiles_per_row();
        for tile_col in 0..geo.tiles_per_row() {
            let col0 = tile_col * geo.tile_cols;
            let width = geo.tile_cols.min(geo.cols - col0);
            let bytes = &mut scratch[..width * T::SIZE];
            encode_from(&buf[col0..col0 + width], bytes);
            cache.write_bytes(base + tile_col, row_bytes, bytes)?;
        }
        Ok(())
    }

    // -- Cell Access ----------------------------------------------------------

    pub fn get(&mut self, row: usize, col: usize) -> Result<T> {
        let loc = self.geometry.locate(row, col)?;
        let offset = (loc.row * self.geometry.tile_cols + loc.col) * T::SIZE;
        let Self { session, scratch, .. } = self;
        let bytes = &mut scratch[..T::SIZE];
        active(session)?.read_bytes(loc.tile, offset, bytes)?;
        Ok(T::read_le(bytes))
    }

    pub fn put(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let loc = self.geometry.locate(row, col)?;
        let offset = (loc.row * self.geometry.tile_cols + loc.col) * T::SIZE;
        let Self { session, scratch, .. } = self;
        let bytes = &mut scratch[..T::SIZE];
        value.write_le(bytes);
        active(session)?.write_bytes(loc.tile, offset, bytes)
    }

    /// Tile holding `(row, col)`.
    pub fn tile_index(&self, row: usize, col: usize) -> Result<usize> {
        Ok(self.geometry.locate(row, col)?.tile)
    }

    // -- Inspection -----------------------------------------------------------

    pub fn geometry(&self) -> &SegmentGeometry {
        &self.geometry
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.session, Session::Active(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.session, Session::Closed)
    }

    /// Resident tile budget of the active session.
    pub fn budget(&self) -> Result<usize> {
        Ok(self.cache()?.budget())
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.cache()?.stats())
    }

    pub fn io_stats(&self) -> Result<IoStats> {
        Ok(self.cache()?.io_stats())
    }

    /// Record layout this manager formats and expects.
    pub fn layout(&self) -> Result<TileLayout> {
        TileLayout::new(&self.geometry, T::SIZE, self.header_bytes)
    }

    // -- Internal Helpers -----------------------------------------------------

    fn cache(&self) -> Result<&SegmentCache> {
        match &self.session {
            Session::Active(cache) => Ok(cache),
            Session::Closed => Err(SegmentError::Storage(StorageState::Closed)),
            _ => Err(SegmentError::Storage(StorageState::NotInitialized)),
        }
    }

    fn cache_mut(&mut self) -> Result<&mut SegmentCache> {
        active(&mut self.session)
    }

    fn ensure_can_attach(&self) -> Result<()> {
        match self.session {
            Session::Closed => Err(SegmentError::Storage(StorageState::Closed)),
            Session::Active(_) => Err(SegmentError::Storage(StorageState::AlreadyActive)),
            _ => Ok(()),
        }
    }

    fn check_row(&self, row: usize, len: usize) -> Result<()> {
        if let Session::Closed = self.session {
            return Err(SegmentError::Storage(StorageState::Closed));
        }
        if row >= self.geometry.rows {
            return Err(SegmentError::CoordinateOutOfBounds {
                row,
                col: 0,
                rows: self.geometry.rows,
                cols: self.geometry.cols,
            });
        }
        if len != self.geometry.cols {
            return Err(SegmentError::InvalidGeometry(format!(
                "row buffer holds {} cells, matrix has {} columns",
                len, self.geometry.cols
            )));
        }
        Ok(())
    }
}

fn active(session: &mut Session) -> Result<&mut SegmentCache> {
    match session {
        Session::Active(cache) => Ok(cache),
        Session::Closed => Err(SegmentError::Storage(StorageState::Closed)),
        _ => Err(SegmentError::Storage(StorageState::NotInitialized)),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
