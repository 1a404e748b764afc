//! Host memory detection for memory-based cache budgets.
//!
//! Probes available RAM so `MemoryPolicy::Available` can size the tile
//! cache against the host instead of the matrix. Stateless: each call to
//! `SystemResources::detect()` re-probes the system.

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Snapshot of detected hardware resources.
#[derive(Debug, Clone, Default)]
pub struct SystemResources {
    /// Total physical RAM in bytes.
    pub total_memory_bytes: u64,
    /// Available (re-usable) RAM in bytes.
    pub available_memory_bytes: u64,
}

impl SystemResources {
    /// Probe the current system for RAM information.
    pub fn detect() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();

        let res = Self {
            total_memory_bytes: sys.total_memory(),
            available_memory_bytes: sys.available_memory(),
        };
        tracing::debug!(
            total = res.total_memory_bytes,
            available = res.available_memory_bytes,
            "probed host memory"
        );
        res
    }
}
