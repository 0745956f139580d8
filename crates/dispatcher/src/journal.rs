//! MemoryJournal - in-process offset marker

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use contracts::{Journal, Offset};
use tracing::trace;

/// Monotonic committed offset held in memory
#[derive(Debug, Default)]
pub struct MemoryJournal {
    mark: AtomicU64,
    /// Set after the first commit; `mark` is meaningless before
    has_committed: AtomicBool,
    commits: AtomicU64,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commit calls that advanced the mark
    pub fn advances(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

impl Journal for MemoryJournal {
    fn commit(&self, offset: Offset) {
        let previous = self.mark.fetch_max(offset, Ordering::AcqRel);
        let first = !self.has_committed.swap(true, Ordering::AcqRel);
        if first || offset > previous {
            self.commits.fetch_add(1, Ordering::Relaxed);
            observability::record_offset_committed(offset);
            trace!(offset, "Offset committed");
        }
    }

    fn committed(&self) -> Option<Offset> {
        self.has_committed
            .load(Ordering::Acquire)
            .then(|| self.mark.load(Ordering::Acquire))
    }
}
