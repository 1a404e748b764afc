//! Segment profile: cache behavior of row scans at various budgets.
//!
//! Writes then reads every row of a float matrix through a segment file
//! and reports cache and I/O counters per budget. Prints a comparison
//! table to stdout.
//!
//! Run: cargo run --release --bin seg_profile [rows] [cols] [tile]

use std::time::Instant;

use rseg::segment::{CacheStats, IoStats};
use rseg::{MemoryPolicy, Result, SegmentGeometry, SegmentManager};
use sysinfo::{ProcessRefreshKind, RefreshKind, System};

// ── RSS measurement ────────────────────────────────────────────────────

fn get_process_rss() -> u64 {
    let mut sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
    );
    sys.refresh_all();
    match sysinfo::get_current_pid() {
        Ok(pid) => sys.process(pid).map(|p| p.memory()).unwrap_or(0),
        Err(_) => 0,
    }
}

// ── Scan ───────────────────────────────────────────────────────────────

struct ScanReport {
    budget: usize,
    cache: CacheStats,
    io: IoStats,
    millis: u128,
    rss_delta: u64,
}

fn scan(geometry: SegmentGeometry, policy: MemoryPolicy) -> Result<ScanReport> {
    let baseline = get_process_rss();
    let start = Instant::now();

    let mut mgr = SegmentManager::<f32>::new(geometry, policy)?;
    let file = mgr.format_temp(false)?;
    mgr.init(file)?;

    let mut row = vec![0.0f32; geometry.cols];
    for r in 0..geometry.rows {
        for (c, v) in row.iter_mut().enumerate() {
            *v = (r * geometry.cols + c) as f32;
        }
        mgr.put_row(r, &row)?;
    }
    mgr.flush()?;
    for r in 0..geometry.rows {
        mgr.get_row(r, &mut row)?;
    }

    let report = ScanReport {
        budget: mgr.budget()?,
        cache: mgr.cache_stats()?,
        io: mgr.io_stats()?,
        millis: start.elapsed().as_millis(),
        rss_delta: get_process_rss().saturating_sub(baseline),
    };
    mgr.close()?;
    Ok(report)
}

// ── Main ───────────────────────────────────────────────────────────────

fn parse_arg(args: &[String], index: usize, default: usize) -> usize {
    match args.get(index) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("Error: '{}' is not a positive integer", raw);
            std::process::exit(1);
        }),
        None => default,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: seg_profile [rows] [cols] [tile]");
        std::process::exit(0);
    }
    let rows = parse_arg(&args, 1, 2048);
    let cols = parse_arg(&args, 2, 2048);
    let tile = parse_arg(&args, 3, 64);

    let geometry = match SegmentGeometry::new(rows, cols, tile, tile) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "RSEG Segment Profile ({}x{} f32, {}x{} tiles, {} tiles)",
        rows,
        cols,
        tile,
        tile,
        geometry.tile_count()
    );
    println!("==========================================================");
    println!();
    println!(
        "{:<14} {:>7} {:>9} {:>9} {:>9} {:>9} {:>8} {:>9}",
        "Policy", "Budget", "Misses", "Evict", "Reads", "Writes", "ms", "RSS (MB)"
    );
    println!("{:-<82}", "");

    let policies = [
        ("tiles:1", MemoryPolicy::Tiles(1)),
        ("percent:10", MemoryPolicy::Percent(10)),
        ("percent:50", MemoryPolicy::Percent(50)),
        ("all-memory", MemoryPolicy::Percent(100)),
    ];
    for (label, policy) in policies {
        match scan(geometry, policy) {
            Ok(r) => println!(
                "{:<14} {:>7} {:>9} {:>9} {:>9} {:>9} {:>8} {:>9.1}",
                label,
                r.budget,
                r.cache.misses,
                r.cache.evictions,
                r.io.tile_reads,
                r.io.tile_writes,
                r.millis,
                r.rss_delta as f64 / (1024.0 * 1024.0),
            ),
            Err(e) => {
                eprintln!("Error: {} failed: {}", label, e);
                std::process::exit(1);
            }
        }
    }

    println!();
    println!("Note: RSS includes OS page cache effects.");
    println!("      Numbers are relative, not absolute memory cost.");
}
