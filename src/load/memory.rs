//! Memory introspection for adaptive batching
//!
//! Free-memory readings scale the batch size and drive the
//! backpressure pauses between batches. Readings come through a trait
//! so tests can pin them.

use parking_lot::Mutex;
use sysinfo::System;

/// One reading of system memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySnapshot {
    pub total_mb: u64,
    pub available_mb: u64,
    /// Used fraction of total, in percent
    pub used_pct: f64,
}

/// Pressure bands derived from the used percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Normal,
    High,
    Critical,
}

impl MemorySnapshot {
    /// Classify against the configured thresholds.
    pub fn pressure(&self, high_pct: u8, critical_pct: u8) -> MemoryPressure {
        if self.used_pct > critical_pct as f64 {
            MemoryPressure::Critical
        } else if self.used_pct > high_pct as f64 {
            MemoryPressure::High
        } else {
            MemoryPressure::Normal
        }
    }
}

/// Source of memory readings.
pub trait MemoryMonitor: Send + Sync {
    fn snapshot(&self) -> MemorySnapshot;
}

/// Live readings via `sysinfo`.
pub struct SysMemoryMonitor {
    system: Mutex<System>,
}

impl SysMemoryMonitor {
    pub fn new() -> Self {
        SysMemoryMonitor {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysMemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMonitor for SysMemoryMonitor {
    fn snapshot(&self) -> MemorySnapshot {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        let available = system.available_memory();
        let used = system.used_memory();
        MemorySnapshot {
            total_mb: total / (1024 * 1024),
            available_mb: available / (1024 * 1024),
            used_pct: if total == 0 {
                0.0
            } else {
                used as f64 / total as f64 * 100.0
            },
        }
    }
}

/// Fixed readings for tests.
pub struct FixedMemoryMonitor {
    snapshot: MemorySnapshot,
}

impl FixedMemoryMonitor {
    pub fn new(snapshot: MemorySnapshot) -> Self {
        FixedMemoryMonitor { snapshot }
    }

    /// A comfortable reading: plenty free, low usage.
    pub fn relaxed() -> Self {
        FixedMemoryMonitor::new(MemorySnapshot {
            total_mb: 8192,
            available_mb: 4096,
            used_pct: 50.0,
        })
    }
}

impl MemoryMonitor for FixedMemoryMonitor {
    fn snapshot(&self) -> MemorySnapshot {
        self.snapshot
    }
}

/// Batch-size bounds.
pub const MIN_BATCH_SIZE: usize = 50;
pub const MAX_BATCH_SIZE: usize = 5000;

/// Payload divisor feeding the base batch size.
const BATCH_DIVISOR: usize = 10;

/// Free memory below which the batch size halves.
const LOW_MEMORY_MB: u64 = 512;

/// Compute the adaptive batch size for a payload.
///
/// `clamp(total/10, 50, 5000)`, scaled by `min(2.0, free_mb/1024)`,
/// halved under low memory, and re-clamped.
pub fn compute_batch_size(total_rows: usize, snapshot: &MemorySnapshot) -> usize {
    let base = (total_rows / BATCH_DIVISOR).clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
    let scale = (snapshot.available_mb as f64 / 1024.0).min(2.0);
    let mut size = (base as f64 * scale) as usize;
    if snapshot.available_mb < LOW_MEMORY_MB {
        size /= 2;
    }
    size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}
