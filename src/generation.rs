//! Monotonic generation counter used to invalidate stale asynchronous work.
//!
//! Incrementing the counter invalidates every job tagged with an older
//! generation. Workers check [`GenerationCounter::is_current`] before each
//! observable mutation and exit silently when stale; the underlying service
//! call is not aborted, its results are simply dropped.

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque tag identifying one request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

#[derive(Debug, Default)]
pub struct GenerationCounter {
    latest: AtomicU64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically advance and return the new current generation.
    /// All older generations become stale.
    pub fn next(&self) -> Generation {
        Generation(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Generation {
        Generation(self.latest.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.latest.load(Ordering::SeqCst) == generation.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_invalidates_older_generations() {
        let counter = GenerationCounter::new();
        let g1 = counter.next();
        assert!(counter.is_current(g1));

        let g2 = counter.next();
        assert!(g2 > g1);
        assert!(!counter.is_current(g1));
        assert!(counter.is_current(g2));
    }

    #[test]
    fn current_matches_last_issued() {
        let counter = GenerationCounter::new();
        let g = counter.next();
        assert_eq!(counter.current(), g);
    }
}
