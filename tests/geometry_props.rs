//! Property tests for tile geometry and cell round-trips.

use std::collections::HashSet;

use proptest::prelude::*;
use rseg::segment::{resident_budget, tile_count};
use rseg::{MemoryPolicy, SegmentGeometry, SegmentManager};
use tempfile::TempDir;

proptest! {
    #[test]
    fn tile_count_matches_distinct_located_tiles(
        rows in 1usize..40,
        cols in 1usize..40,
        tile_rows in 1usize..12,
        tile_cols in 1usize..12,
    ) {
        let geo = SegmentGeometry::new(rows, cols, tile_rows, tile_cols).unwrap();
        let mut seen = HashSet::new();
        for r in 0..rows {
            for c in 0..cols {
                let loc = geo.locate(r, c).unwrap();
                prop_assert!(loc.row < tile_rows && loc.col < tile_cols);
                seen.insert(loc.tile);
            }
        }
        prop_assert_eq!(seen.len(), tile_count(rows, cols, tile_rows, tile_cols));
        prop_assert_eq!(seen.iter().max().copied(), Some(geo.tile_count() - 1));
    }

    #[test]
    fn budget_is_never_zero(
        rows in 1usize..100_000,
        cols in 1usize..100_000,
        tile_rows in 1usize..1024,
        tile_cols in 1usize..1024,
        percent in -50i64..200,
    ) {
        let n = tile_count(rows, cols, tile_rows, tile_cols);
        prop_assert!(resident_budget(n, percent, rows, cols, tile_rows, tile_cols) >= 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn put_then_get_round_trip(
        cells in prop::collection::vec((0usize..23, 0usize..31, any::<i32>()), 1..60),
        budget in 1usize..6,
        flush_between in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let geo = SegmentGeometry::new(23, 31, 4, 6).unwrap();
        let mut mgr = SegmentManager::<i32>::new(geo, MemoryPolicy::Tiles(budget)).unwrap();
        let file = mgr.format(&dir.path().join("p.tiles"), true).unwrap();
        mgr.init(file).unwrap();

        for &(r, c, v) in &cells {
            mgr.put(r, c, v).unwrap();
            if flush_between {
                mgr.flush().unwrap();
            }
            prop_assert_eq!(mgr.get(r, c).unwrap(), v);
        }

        // Last write per coordinate wins
        let mut last = std::collections::HashMap::new();
        for &(r, c, v) in &cells {
            last.insert((r, c), v);
        }
        for (&(r, c), &v) in &last {
            prop_assert_eq!(mgr.get(r, c).unwrap(), v);
        }
    }
}
