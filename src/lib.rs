//! RSEG (Raster SEGment store) — disk-backed tiled matrix storage.
//!
//! Lets row-sequential raster code treat a grid larger than memory as if it
//! were resident. See [`segment::SegmentManager`] for the entry point.

pub mod error;
pub mod segment;

pub use error::{Result, SegmentError, StorageState};
pub use segment::{
    CellValue, FillMode, MemoryPolicy, SegmentConfig, SegmentGeometry, SegmentManager,
};
