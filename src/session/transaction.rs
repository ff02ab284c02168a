use std::fmt;

use super::listener::TransactionListener;

/// Locking mode requested for a transaction frame. Only the default is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

/// One frame of a session's nested transaction stack.
#[derive(Default)]
pub struct Transaction {
    pub(crate) id: u64,
    pub(crate) mode: TransactionMode,
    pub(crate) parent: Option<usize>,
    pub(crate) listener: Option<Box<dyn TransactionListener>>,
    pub(crate) statement: String,
    pub(crate) child_failed: bool,
    pub(crate) marked_successful: bool,
}

impl Transaction {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Pool slot of the enclosing frame.
    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    #[must_use]
    pub fn is_child_failed(&self) -> bool {
        self.child_failed
    }

    #[must_use]
    pub fn is_marked_successful(&self) -> bool {
        self.marked_successful
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("parent", &self.parent)
            .field("statement", &self.statement)
            .field("child_failed", &self.child_failed)
            .field("marked_successful", &self.marked_successful)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction[id:{}, statement:{}, successful:{}, childFailed:{}]",
            self.id, self.statement, self.marked_successful, self.child_failed
        )
    }
}

/// Arena of transaction records with a free-slot stack.
///
/// A slot is either referenced from a session's live stack or listed in `free`,
/// never both.
#[derive(Debug, Default)]
pub struct TransactionPool {
    slots: Vec<Transaction>,
    free: Vec<usize>,
}

impl TransactionPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a recycled record, or allocate one, and attach `listener`.
    pub fn obtain(&mut self, listener: Option<Box<dyn TransactionListener>>) -> usize {
        let slot = if let Some(slot) = self.free.pop() {
            let transaction = &mut self.slots[slot];
            transaction.parent = None;
            transaction.marked_successful = false;
            transaction.child_failed = false;
            transaction.mode = TransactionMode::default();
            slot
        } else {
            self.slots.push(Transaction::default());
            tracing::trace!(allocated = self.slots.len(), "allocated transaction record");
            self.slots.len() - 1
        };
        self.slots[slot].listener = listener;
        slot
    }

    /// Return a record to the free stack, dropping its links.
    pub fn recycle(&mut self, slot: usize) {
        let transaction = &mut self.slots[slot];
        transaction.parent = None;
        transaction.listener = None;
        transaction.statement.clear();
        self.free.push(slot);
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> &Transaction {
        &self.slots[slot]
    }

    pub fn get_mut(&mut self, slot: usize) -> &mut Transaction {
        &mut self.slots[slot]
    }

    /// Records ever allocated by this pool.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    /// Records currently waiting for reuse.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Whether `slot` is waiting on the free stack.
    #[must_use]
    pub fn is_free(&self, slot: usize) -> bool {
        self.free.contains(&slot)
    }
}
