//! Collection and allocation statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters accumulated over the lifetime of a heap.
#[derive(Debug)]
pub struct GcStats {
    /// Total bytes handed out by the spaces.
    pub bytes_allocated: AtomicU64,
    /// Total objects allocated.
    pub objects_allocated: AtomicU64,

    /// New-space collection cycles.
    pub new_space_collections: AtomicU64,
    /// Old-space collection cycles.
    pub old_space_collections: AtomicU64,
    /// Total collector time in nanoseconds.
    pub gc_time_ns: AtomicU64,

    /// Objects copied during evacuation (both targets).
    pub objects_evacuated: AtomicU64,
    /// Bytes copied during evacuation.
    pub bytes_evacuated: AtomicU64,
    /// Objects promoted to old space.
    pub objects_promoted: AtomicU64,
    /// Bytes promoted to old space.
    pub bytes_promoted: AtomicU64,
    /// Weak-reference callbacks fired.
    pub weak_callbacks_fired: AtomicU64,
}

impl GcStats {
    /// Create zeroed statistics.
    pub const fn new() -> Self {
        Self {
            bytes_allocated: AtomicU64::new(0),
            objects_allocated: AtomicU64::new(0),
            new_space_collections: AtomicU64::new(0),
            old_space_collections: AtomicU64::new(0),
            gc_time_ns: AtomicU64::new(0),
            objects_evacuated: AtomicU64::new(0),
            bytes_evacuated: AtomicU64::new(0),
            objects_promoted: AtomicU64::new(0),
            bytes_promoted: AtomicU64::new(0),
            weak_callbacks_fired: AtomicU64::new(0),
        }
    }

    /// Record one allocation.
    #[inline]
    pub fn record_allocation(&self, size: usize) {
        self.bytes_allocated
            .fetch_add(size as u64, Ordering::Relaxed);
        self.objects_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Total collection cycles of either kind.
    pub fn total_collections(&self) -> u64 {
        self.new_space_collections.load(Ordering::Relaxed)
            + self.old_space_collections.load(Ordering::Relaxed)
    }

    /// Print a summary to stderr.
    pub fn report(&self) {
        eprintln!("=== Heap Statistics ===");
        eprintln!(
            "allocated:  {} objects / {} bytes",
            self.objects_allocated.load(Ordering::Relaxed),
            self.bytes_allocated.load(Ordering::Relaxed),
        );
        eprintln!(
            "cycles:     {} new-space, {} old-space ({} ns total)",
            self.new_space_collections.load(Ordering::Relaxed),
            self.old_space_collections.load(Ordering::Relaxed),
            self.gc_time_ns.load(Ordering::Relaxed),
        );
        eprintln!(
            "evacuated:  {} objects / {} bytes",
            self.objects_evacuated.load(Ordering::Relaxed),
            self.bytes_evacuated.load(Ordering::Relaxed),
        );
        eprintln!(
            "promoted:   {} objects / {} bytes",
            self.objects_promoted.load(Ordering::Relaxed),
            self.bytes_promoted.load(Ordering::Relaxed),
        );
        eprintln!(
            "weak fired: {}",
            self.weak_callbacks_fired.load(Ordering::Relaxed),
        );
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}
