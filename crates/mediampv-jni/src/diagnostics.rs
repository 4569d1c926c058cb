//! Handle registry and debug counters.
//!
//! ## Always-on (release + debug)
//!
//! **Handle registry**: live handle addresses in a `HashSet<usize>`.
//! - `register_handle(ptr)`: adds the address, false if already present.
//! - `unregister_handle(ptr)`: removes it, false if unknown (double finalize).
//! - `is_live_handle(ptr)`: checked by every entry point before the pointer
//!   is dereferenced.
//!
//! ## Debug-only (`cfg(debug_assertions)`)
//!
//! **Metrics**: handles created/finalized, peak live handles and entry point
//! calls, exposed through `snapshot()`.
//!
//! ## Limitations
//!
//! Address-only tracking cannot tell a stale pointer from a new handle that
//! the allocator placed at the same address. It also does not keep a handle
//! alive for the duration of a call: `nFinalize` racing another entry point on
//! the same handle is the caller's bug, as with any JNI peer object.

use std::collections::HashSet;
use std::sync::LazyLock;

use parking_lot::Mutex;

// =========================================================================
// Handle registry (always-on)
// =========================================================================

static HANDLE_REGISTRY: LazyLock<Mutex<HashSet<usize>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Registers a handle address. Returns `false` if already registered (bug).
pub fn register_handle(ptr: *const u8) -> bool {
    HANDLE_REGISTRY.lock().insert(ptr as usize)
}

/// Unregisters a handle address. Returns `false` if unknown.
pub fn unregister_handle(ptr: *const u8) -> bool {
    HANDLE_REGISTRY.lock().remove(&(ptr as usize))
}

pub fn is_live_handle(ptr: *const u8) -> bool {
    HANDLE_REGISTRY.lock().contains(&(ptr as usize))
}

pub fn live_handle_count() -> usize {
    HANDLE_REGISTRY.lock().len()
}

// =========================================================================
// Metrics (debug-only)
// =========================================================================

#[cfg(debug_assertions)]
mod metrics {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::LazyLock;

    use parking_lot::Mutex;

    struct EntryMetrics {
        handles_created: AtomicU64,
        handles_finalized: AtomicU64,
        handles_peak: AtomicU64,
        entry_calls: AtomicU64,
        // Peak is updated under this lock
        handles_live: Mutex<u64>,
    }

    static METRICS: LazyLock<EntryMetrics> = LazyLock::new(|| EntryMetrics {
        handles_created: AtomicU64::new(0),
        handles_finalized: AtomicU64::new(0),
        handles_peak: AtomicU64::new(0),
        entry_calls: AtomicU64::new(0),
        handles_live: Mutex::new(0),
    });

    pub fn record_handle_created() {
        METRICS.handles_created.fetch_add(1, Ordering::Relaxed);
        let mut live = METRICS.handles_live.lock();
        *live += 1;
        METRICS.handles_peak.fetch_max(*live, Ordering::Relaxed);
    }

    pub fn record_handle_finalized() {
        METRICS.handles_finalized.fetch_add(1, Ordering::Relaxed);
        let mut live = METRICS.handles_live.lock();
        *live = live.saturating_sub(1);
    }

    pub fn record_entry_call() {
        METRICS.entry_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[derive(Debug, Clone, Copy, Default)]
    pub struct EntryMetricsSnapshot {
        pub handles_created: u64,
        pub handles_finalized: u64,
        pub handles_peak: u64,
        pub handles_live: u64,
        pub entry_calls: u64,
    }

    pub fn snapshot() -> EntryMetricsSnapshot {
        EntryMetricsSnapshot {
            handles_created: METRICS.handles_created.load(Ordering::Relaxed),
            handles_finalized: METRICS.handles_finalized.load(Ordering::Relaxed),
            handles_peak: METRICS.handles_peak.load(Ordering::Relaxed),
            handles_live: *METRICS.handles_live.lock(),
            entry_calls: METRICS.entry_calls.load(Ordering::Relaxed),
        }
    }
}

#[cfg(debug_assertions)]
pub use metrics::{
    record_entry_call, record_handle_created, record_handle_finalized, snapshot, EntryMetricsSnapshot,
};
