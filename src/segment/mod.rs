//! Segmented out-of-core matrix storage.
//!
//! A matrix too large for memory is cut into fixed-size tiles stored in a
//! flat tile file; a bounded LRU cache keeps the working set resident and
//! pages the rest to disk.

pub mod types;
pub mod geometry;
pub mod resource;
pub mod tile_file;
pub mod cache;
pub mod manager;
pub mod reader;
pub mod config;

pub use types::{CellValue, RasterType};
pub use geometry::{locate, resident_budget, tile_count, MemoryPolicy, SegmentGeometry, TileLocation};
pub use resource::SystemResources;
pub use tile_file::{FillMode, IoStats, TileFile, TileLayout};
pub use cache::{CacheStats, SegmentCache};
pub use manager::SegmentManager;
pub use reader::MappedTiles;
pub use config::{SegmentConfig, SegmentSidecar};
