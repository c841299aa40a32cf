// src/naming.rs

//! Default names for operations and queues.

use std::cell::Cell;
use std::rc::Rc;

/// Monotonic counter handing out default names ("1", "2", ...).
///
/// Clones share the same count. Operations and queues each use their own
/// thread-local shared counter unless one is passed in explicitly.
#[derive(Debug, Clone, Default)]
pub struct NameCounter {
    next: Rc<Cell<u64>>,
}

thread_local! {
    static OPERATIONS: NameCounter = NameCounter::new();
    static QUEUES: NameCounter = NameCounter::new();
}

impl NameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter used by `Operation::new`.
    pub fn operations() -> Self {
        OPERATIONS.with(Clone::clone)
    }

    /// Shared counter used by `OperationQueue::new`.
    pub fn queues() -> Self {
        QUEUES.with(Clone::clone)
    }

    pub fn next_name(&self) -> String {
        let value = self.next.get() + 1;
        self.next.set(value);
        value.to_string()
    }

    pub fn reset(&self) {
        self.next.set(0);
    }
}
