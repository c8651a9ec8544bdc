use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Approximates the original runtime's `count_coroutine` introspection
/// value, which this crate has no equivalent of since Tokio does not expose
/// a public per-process task count.
///
/// The statistics engine's preamble log line (spec.md §4.4) reports this
/// alongside buffer cache occupancy; `PeriodicDriver` registers itself on
/// start and the sweep phase registers each in-flight close so the number
/// reflects genuinely concurrent work rather than a constant.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    active: Arc<AtomicUsize>,
}

/// RAII guard: increments on creation, decrements on drop. Holding one
/// across an `.await` is exactly the intended use — it marks the span of a
/// single logical unit of concurrent work (a sweep close, the driver's own
/// loop).
pub struct TaskGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

impl TaskRegistry {
    pub fn new() -> TaskRegistry {
        TaskRegistry::default()
    }

    pub fn enter(&self) -> TaskGuard {
        self.active.fetch_add(1, Ordering::Relaxed);
        TaskGuard {
            active: self.active.clone(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}
