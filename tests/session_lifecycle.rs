//! Integration test: segment session lifecycle and persistence semantics.
//!
//! Validates that:
//! - Flushed tiles survive dropping the manager and reopening the file
//! - Released (unflushed) writes are lost, flushed ones kept
//! - close() deletes the tile file and ends the session
//! - An external reader sees exactly what was flushed

use rseg::segment::{MappedTiles, SegmentSidecar};
use rseg::{MemoryPolicy, SegmentConfig, SegmentError, SegmentGeometry, SegmentManager, StorageState};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn geometry() -> SegmentGeometry {
    SegmentGeometry::new(37, 23, 8, 5).unwrap()
}

fn value(row: usize, col: usize) -> f32 {
    row as f32 * 100.0 + col as f32
}

fn write_all_rows(mgr: &mut SegmentManager<f32>) {
    let cols = mgr.geometry().cols;
    for row in 0..mgr.geometry().rows {
        let buf: Vec<f32> = (0..cols).map(|c| value(row, c)).collect();
        mgr.put_row(row, &buf).unwrap();
    }
}

fn assert_all_rows(mgr: &mut SegmentManager<f32>) {
    let cols = mgr.geometry().cols;
    let mut buf = vec![0.0f32; cols];
    for row in 0..mgr.geometry().rows {
        mgr.get_row(row, &mut buf).unwrap();
        for (c, v) in buf.iter().enumerate() {
            assert_eq!(*v, value(row, c), "mismatch at ({}, {})", row, c);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests: Persistence Across Sessions
// ---------------------------------------------------------------------------

#[test]
fn flushed_rows_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("elev.tiles");

    {
        let mut mgr = SegmentManager::<f32>::new(geometry(), MemoryPolicy::Tiles(3)).unwrap();
        let file = mgr.format(&path, true).unwrap();
        mgr.init(file).unwrap();
        write_all_rows(&mut mgr);
        mgr.flush().unwrap();
        // Drop without close: file stays
    }

    let mut mgr = SegmentManager::<f32>::new(geometry(), MemoryPolicy::Percent(50)).unwrap();
    mgr.open(&path).unwrap();
    assert_all_rows(&mut mgr);
}

#[test]
fn unflushed_writes_lost_on_release() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("elev.tiles");

    let mut mgr = SegmentManager::<f32>::new(geometry(), MemoryPolicy::Percent(0)).unwrap();
    let file = mgr.format(&path, true).unwrap();
    mgr.init(file).unwrap();
    mgr.put(0, 0, 1.0).unwrap();
    mgr.flush().unwrap();
    mgr.put(36, 22, 2.0).unwrap();
    mgr.release().unwrap();

    let mut other = SegmentManager::<f32>::new(geometry(), MemoryPolicy::Tiles(1)).unwrap();
    other.open(&path).unwrap();
    assert_eq!(other.get(0, 0).unwrap(), 1.0, "flushed cell must survive");
    assert_eq!(other.get(36, 22).unwrap(), 0.0, "released cell must not survive");
}

#[test]
fn unfilled_format_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.tiles");

    let mut mgr = SegmentManager::<f32>::new(geometry(), MemoryPolicy::Tiles(2)).unwrap();
    let file = mgr.format(&path, false).unwrap();
    assert_eq!(
        std::fs::metadata(&path).unwrap().len(),
        mgr.layout().unwrap().file_size()
    );
    mgr.init(file).unwrap();
    write_all_rows(&mut mgr);
    assert_all_rows(&mut mgr);
}

#[test]
fn checked_reopen_detects_geometry_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.tiles");

    let mut mgr = SegmentManager::<f32>::new(geometry(), MemoryPolicy::default()).unwrap();
    mgr.format(&path, false).unwrap();

    let config = SegmentConfig {
        tile_rows: 4,
        tile_cols: 4,
        open_checked: true,
        ..Default::default()
    };
    let mut wrong = SegmentManager::<f32>::from_config(37, 23, &config).unwrap();
    let err = wrong.open(&path).unwrap_err();
    assert!(matches!(err, SegmentError::InvalidFormat(_)), "got {:?}", err);
}

#[test]
fn sidecar_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.tiles");

    {
        let config = SegmentConfig {
            tile_rows: 8,
            tile_cols: 5,
            header_bytes: 16,
            memory: MemoryPolicy::Tiles(4),
            ..Default::default()
        };
        let mut mgr = SegmentManager::<f32>::from_config(37, 23, &config).unwrap();
        let file = mgr.format(&path, true).unwrap();
        mgr.init(file).unwrap();
        write_all_rows(&mut mgr);
        mgr.flush().unwrap();
        let side = mgr.write_sidecar().unwrap();
        assert_eq!(side, SegmentSidecar::path_for(&path));
    }

    let mut mgr = SegmentManager::<f32>::open_with_sidecar(&path).unwrap();
    assert_eq!(*mgr.geometry(), geometry());
    assert_eq!(mgr.budget().unwrap(), 4);
    assert_all_rows(&mut mgr);

    // Element size is part of the sidecar contract
    assert!(matches!(
        SegmentManager::<f64>::open_with_sidecar(&path).unwrap_err(),
        SegmentError::InvalidFormat(_)
    ));
}

// ---------------------------------------------------------------------------
// Tests: External Reader
// ---------------------------------------------------------------------------

#[test]
fn mapped_reader_sees_flushed_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.tiles");

    let mut mgr = SegmentManager::<f32>::new(geometry(), MemoryPolicy::Tiles(2)).unwrap();
    let file = mgr.format(&path, true).unwrap();
    mgr.init(file).unwrap();
    write_all_rows(&mut mgr);
    mgr.flush().unwrap();

    let reader = MappedTiles::open(&path, geometry(), 4, 0).unwrap();
    let mut buf = vec![0.0f32; 23];
    for row in 0..37 {
        reader.read_row(row, &mut buf).unwrap();
        assert_eq!(buf[22], value(row, 22));
    }
    assert_eq!(reader.get::<f32>(17, 9).unwrap(), value(17, 9));
}

// ---------------------------------------------------------------------------
// Tests: Close
// ---------------------------------------------------------------------------

#[test]
fn close_deletes_file_and_ends_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.tiles");

    let mut mgr = SegmentManager::<f32>::new(geometry(), MemoryPolicy::Tiles(2)).unwrap();
    let file = mgr.format(&path, true).unwrap();
    mgr.init(file).unwrap();
    mgr.put(5, 5, 5.0).unwrap();
    mgr.close().unwrap();

    assert!(!path.exists());
    assert!(matches!(
        mgr.get(5, 5).unwrap_err(),
        SegmentError::Storage(StorageState::Closed)
    ));
    let mut donor = SegmentManager::<f32>::new(geometry(), MemoryPolicy::Tiles(1)).unwrap();
    let other_file = donor.format(&dir.path().join("n.tiles"), true).unwrap();
    assert!(matches!(
        mgr.init(other_file).unwrap_err(),
        SegmentError::Storage(StorageState::Closed)
    ));
}
