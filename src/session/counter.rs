use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of transaction ids.
///
/// Clones share one sequence. A [`DatabaseRegistry`](crate::DatabaseRegistry)
/// hands its counter to every session configured with
/// [`CounterScope::Global`](crate::config::CounterScope::Global); a session built
/// with [`TransactionCounter::new`] counts on its own.
#[derive(Debug, Clone, Default)]
pub struct TransactionCounter {
    next: Arc<AtomicU64>,
}

impl TransactionCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current value and move the sequence forward.
    pub fn advance(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Value the next [`advance`](Self::advance) will return.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn shares_sequence_with(&self, other: &TransactionCounter) -> bool {
        Arc::ptr_eq(&self.next, &other.next)
    }
}
