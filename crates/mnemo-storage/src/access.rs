//! Batched access tracking.
//!
//! Every semantic retrieval would otherwise write to the database; the
//! accumulator collapses N accesses into one UPDATE. Counts survive
//! clean shutdown: SIGINT/SIGTERM hooks and `shutdown()` flush whatever
//! is still buffered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use dashmap::DashMap;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, warn};

use mnemo_core::constants::{ACCESS_FLUSH_THRESHOLD, ACCESS_INCREMENT};
use mnemo_core::errors::MnemoResult;
use mnemo_core::MnemoError;

use crate::engine::MemoryStore;
use crate::queries::access_ops;

struct SignalHooks {
    handle: Handle,
    thread: JoinHandle<()>,
}

/// In-memory fractional accumulator, flushed per-id at a threshold and
/// wholesale at shutdown.
pub struct AccessTracker {
    accumulator: DashMap<i64, f64>,
    increment: f64,
    threshold: f64,
    hooks: Mutex<Option<SignalHooks>>,
    registered: AtomicBool,
    closed: AtomicBool,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::with_thresholds(ACCESS_INCREMENT, ACCESS_FLUSH_THRESHOLD)
    }

    pub fn with_thresholds(increment: f64, threshold: f64) -> Self {
        Self {
            accumulator: DashMap::new(),
            increment,
            threshold,
            hooks: Mutex::new(None),
            registered: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Record one access. When the id's accumulated value crosses the
    /// flush threshold, that id alone is written out and cleared.
    pub fn track_access(&self, store: &MemoryStore, id: i64) -> MnemoResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MnemoError::NotInitialized {
                component: "access tracker",
            });
        }

        let value = {
            let mut entry = self.accumulator.entry(id).or_insert(0.0);
            *entry += self.increment;
            *entry
        };

        // Tiny slack so accumulated float drift cannot postpone the
        // threshold crossing by one access.
        if value >= self.threshold - 1e-9 {
            self.accumulator.remove(&id);
            let increments = whole_increments(value, self.increment);
            store.with_conn_sync(|conn| access_ops::apply_increment(conn, id, increments))?;
            debug!(id, increments, "flushed access accumulator for id");
        }
        Ok(())
    }

    /// Write out every remaining accumulator entry in one transaction
    /// and clear the map. Fractions round up to whole increments.
    pub fn flush_access_counts(&self, store: &MemoryStore) -> MnemoResult<()> {
        let pending: Vec<(i64, i64)> = self
            .accumulator
            .iter()
            .map(|entry| (*entry.key(), whole_increments(*entry.value(), self.increment)))
            .filter(|(_, n)| *n > 0)
            .collect();
        self.accumulator.clear();

        if pending.is_empty() {
            return Ok(());
        }
        store.with_conn_sync(|conn| access_ops::apply_increments(conn, &pending))
    }

    /// Number of ids with buffered counts. Exposed for tests and stats.
    pub fn buffered_ids(&self) -> usize {
        self.accumulator.len()
    }

    /// Register SIGINT/SIGTERM hooks that flush once and then re-raise
    /// the default disposition. Returns false when hooks were already
    /// registered; registration never doubles up.
    pub fn register_shutdown_hooks(
        self: &Arc<Self>,
        store: Arc<MemoryStore>,
    ) -> MnemoResult<bool> {
        if self.registered.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
            self.registered.store(false, Ordering::SeqCst);
            MnemoError::validation(format!("signal registration failed: {e}"))
        })?;
        let handle = signals.handle();

        let tracker = Arc::clone(self);
        let thread = std::thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                // Errors are tolerated silently: a failed flush must not
                // block process teardown.
                if let Err(e) = tracker.flush_access_counts(&store) {
                    warn!(error = %e, "access flush on signal failed");
                }
                let _ = signal_hook::low_level::emulate_default_handler(signal);
            }
        });

        *self.hooks.lock().expect("hooks mutex poisoned") = Some(SignalHooks { handle, thread });
        Ok(true)
    }

    /// Flush and deregister. Safe to call multiple times; later calls
    /// are no-ops.
    pub fn shutdown(&self, store: &MemoryStore) -> MnemoResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.flush_access_counts(store);

        if let Some(hooks) = self.hooks.lock().expect("hooks mutex poisoned").take() {
            hooks.handle.close();
            let _ = hooks.thread.join();
        }
        self.registered.store(false, Ordering::SeqCst);
        result
    }
}

impl Default for AccessTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Integer increments owed for an accumulated value: `ceil(value / step)`
/// with a snap for values that are whole multiples up to float error.
fn whole_increments(value: f64, step: f64) -> i64 {
    let ratio = value / step;
    if (ratio - ratio.round()).abs() < 1e-6 {
        ratio.round() as i64
    } else {
        ratio.ceil() as i64
    }
}

/// Popularity on a log scale: `log10(count + 1) / 3`, clamped to [0, 1].
/// 999 accesses saturate the scale.
pub fn popularity_score(access_count: i64) -> f64 {
    ((access_count.max(0) as f64 + 1.0).log10() / 3.0).clamp(0.0, 1.0)
}
