//! Error types for segment storage

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SegmentError>;

/// Lifecycle state that made an operation illegal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageState {
    /// No tile file has been attached with `init`/`open`.
    NotInitialized,
    /// `init`/`open` called while a session is already active.
    AlreadyActive,
    /// Session was terminated by `close()`.
    Closed,
    /// `open` was given a path that does not exist.
    MissingFile(PathBuf),
}

impl std::fmt::Display for StorageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageState::NotInitialized => write!(f, "session not initialized"),
            StorageState::AlreadyActive => write!(f, "session already active"),
            StorageState::Closed => write!(f, "session is closed"),
            StorageState::MissingFile(p) => write!(f, "tile file not found: {}", p.display()),
        }
    }
}

fn tile_label(tile: &Option<usize>) -> String {
    tile.map_or_else(|| "-".to_string(), |t| t.to_string())
}

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Coordinate ({row}, {col}) outside {rows}x{cols} matrix")]
    CoordinateOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("IO error on {} (tile {}): {source}", .path.display(), tile_label(.tile))]
    Io {
        path: PathBuf,
        tile: Option<usize>,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoPlain(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(StorageState),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SegmentError {
    /// Attach a path (and optionally a tile index) to an I/O failure.
    pub fn io(path: impl Into<PathBuf>, tile: Option<usize>, source: std::io::Error) -> Self {
        SegmentError::Io {
            path: path.into(),
            tile,
            source,
        }
    }

    /// True for bad dimensions and out-of-range coordinates.
    pub fn is_invalid_geometry(&self) -> bool {
        matches!(
            self,
            SegmentError::InvalidGeometry(_) | SegmentError::CoordinateOutOfBounds { .. }
        )
    }

    /// Stable error class code for callers mapping failures to exit status.
    pub fn code(&self) -> &'static str {
        match self {
            SegmentError::InvalidGeometry(_) | SegmentError::CoordinateOutOfBounds { .. } => {
                "INVALID_GEOMETRY"
            }
            SegmentError::Io { .. } | SegmentError::IoPlain(_) => "IO_ERROR",
            SegmentError::Storage(_) => "STORAGE_ERROR",
            SegmentError::InvalidFormat(_) => "INVALID_FORMAT",
            SegmentError::Json(_) => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_message_names_path_and_tile() {
        let err = SegmentError::io(
            "/tmp/seg.tiles",
            Some(7),
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/seg.tiles"), "{}", msg);
        assert!(msg.contains("tile 7"), "{}", msg);
        assert_eq!(err.code(), "IO_ERROR");
    }

    #[test]
    fn test_codes() {
        let oob = SegmentError::CoordinateOutOfBounds { row: 10, col: 0, rows: 10, cols: 10 };
        assert!(oob.is_invalid_geometry());
        assert_eq!(oob.code(), "INVALID_GEOMETRY");
        assert_eq!(SegmentError::Storage(StorageState::Closed).code(), "STORAGE_ERROR");
        assert!(!SegmentError::Storage(StorageState::Closed).is_invalid_geometry());
    }
}
