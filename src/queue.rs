// src/queue.rs

//! The operation queue.
//!
//! A queue accepts operations, moves each one to `Pending`, waits until
//! every dependency has reached `Finished` (wherever those dependencies
//! are queued), and then starts it on a later scheduling turn. Membership
//! is queue-local: an operation stays in [`OperationQueue::operations`]
//! from the moment it is added until it finishes.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error};

use crate::config::QueueSection;
use crate::errors::{OpQueueError, Result};
use crate::naming::NameCounter;
use crate::operation::{Operation, OperationId};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::state::OperationState;

#[derive(Debug)]
struct QueueInner {
    name: String,
    // Keyed by insertion sequence so snapshots keep the order of `add`.
    operations: BTreeMap<u64, Operation>,
    sequence: HashMap<OperationId, u64>,
    next_sequence: u64,
}

/// Handle to an operation queue. Clones share the same queue.
#[derive(Clone)]
pub struct OperationQueue {
    inner: Rc<RefCell<QueueInner>>,
    scheduler: Rc<dyn Scheduler>,
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationQueue")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationQueue {
    /// Queue named by the thread's shared queue counter, running steps on
    /// the current `LocalSet`.
    pub fn new() -> Self {
        Self::with_scheduler(NameCounter::queues().next_name(), TokioScheduler)
    }

    pub fn with_scheduler(name: impl Into<String>, scheduler: impl Scheduler + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(QueueInner {
                name: name.into(),
                operations: BTreeMap::new(),
                sequence: HashMap::new(),
                next_sequence: 0,
            })),
            scheduler: Rc::new(scheduler),
        }
    }

    /// Build a queue from the `[queue]` config section.
    pub fn from_config(section: &QueueSection) -> Self {
        let name = section
            .name
            .clone()
            .unwrap_or_else(|| NameCounter::queues().next_name());
        Self::with_scheduler(name, TokioScheduler)
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.borrow_mut().name = name.into();
    }

    /// Snapshot of the operations added and not yet finished.
    pub fn operations(&self) -> Vec<Operation> {
        self.inner.borrow().operations.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().operations.is_empty()
    }

    /// Add one operation.
    ///
    /// Fails if the operation was ever added to any queue before. An
    /// operation that is already cancelled is accepted but never registered
    /// or started.
    pub fn add(&self, operation: &Operation) -> Result<()> {
        self.enqueue(operation)
    }

    /// Add operations in order, stopping at the first one that fails.
    pub fn add_all<'a>(&self, operations: impl IntoIterator<Item = &'a Operation>) -> Result<()> {
        for operation in operations {
            self.enqueue(operation)?;
        }
        Ok(())
    }

    /// Cancel every operation currently registered in this queue.
    pub fn cancel_all(&self) {
        let operations = self.operations();
        debug!(queue = %self.name(), count = operations.len(), "cancelling all operations");
        for operation in operations {
            operation.cancel();
        }
    }

    fn enqueue(&self, operation: &Operation) -> Result<()> {
        if operation.was_enqueued() {
            return Err(OpQueueError::AlreadyEnqueued(operation.name()));
        }
        operation.mark_enqueued();

        let queue_name = self.name();

        if operation.is_cancelled() {
            debug!(
                queue = %queue_name,
                operation = %operation.name(),
                "operation was cancelled before being enqueued; skipping"
            );
            return Ok(());
        }

        self.register(operation)?;

        let queue = Rc::downgrade(&self.inner);
        let weak_operation = operation.downgrade();
        operation.on_state(OperationState::Finished, move || {
            let Some(operation) = weak_operation.upgrade() else {
                return;
            };
            if let Err(err) = unregister(&queue, &operation) {
                error!(%err, "failed to dequeue finished operation");
                panic!("{err}");
            }
        });

        debug!(queue = %queue_name, operation = %operation.name(), "enqueue operation");
        operation.on_enqueue()?;

        let scheduler = Rc::clone(&self.scheduler);
        let pending = operation.clone();
        wait_until_finished(&operation.dependencies(), move || {
            debug!(
                queue = %queue_name,
                operation = %pending.name(),
                "satisfied dependencies of operation"
            );
            scheduler.defer(Box::new(move || execute_operation(&queue_name, &pending)));
        });

        Ok(())
    }

    fn register(&self, operation: &Operation) -> Result<()> {
        let state = operation.state();
        if matches!(state, OperationState::Executing | OperationState::Finished) {
            return Err(OpQueueError::Membership {
                queue: self.name(),
                detail: format!("cannot register operation '{}' that is {state}", operation.name()),
            });
        }
        let mut inner = self.inner.borrow_mut();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.sequence.insert(operation.id(), sequence);
        inner.operations.insert(sequence, operation.clone());
        Ok(())
    }
}

fn unregister(queue: &Weak<RefCell<QueueInner>>, operation: &Operation) -> Result<()> {
    // The queue handle may be gone while its operations are still running.
    let Some(queue) = queue.upgrade() else {
        return Ok(());
    };
    let mut inner = queue.borrow_mut();

    if !operation.is_finished() {
        return Err(OpQueueError::Membership {
            queue: inner.name.clone(),
            detail: format!(
                "cannot dequeue operation '{}' that is {}",
                operation.name(),
                operation.state()
            ),
        });
    }

    let Some(sequence) = inner.sequence.remove(&operation.id()) else {
        return Err(OpQueueError::Membership {
            queue: inner.name.clone(),
            detail: format!("operation '{}' is not registered", operation.name()),
        });
    };

    inner.operations.remove(&sequence);
    debug!(queue = %inner.name, operation = %operation.name(), "dequeue operation");
    Ok(())
}

/// Deferred step: start the operation unless it was cancelled meanwhile.
fn execute_operation(queue_name: &str, operation: &Operation) -> Result<()> {
    match operation.state() {
        OperationState::Pending => {
            debug!(queue = %queue_name, operation = %operation.name(), "run operation");
            operation.main()
        }
        OperationState::Finished if operation.is_cancelled() => {
            debug!(
                queue = %queue_name,
                operation = %operation.name(),
                "not running operation (was cancelled)"
            );
            Ok(())
        }
        state => Err(OpQueueError::UnexpectedState {
            operation: operation.name(),
            state,
            cancelled: operation.is_cancelled(),
        }),
    }
}

/// Call `on_finish` once every operation in `operations` has finished,
/// in whatever order and on whatever queue that happens.
fn wait_until_finished(operations: &[Operation], on_finish: impl FnOnce() + 'static) {
    if operations.is_empty() {
        on_finish();
        return;
    }

    let remaining = Rc::new(Cell::new(operations.len()));
    let on_finish: Rc<RefCell<Option<Box<dyn FnOnce()>>>> =
        Rc::new(RefCell::new(Some(Box::new(on_finish))));

    for operation in operations {
        let remaining = Rc::clone(&remaining);
        let on_finish = Rc::clone(&on_finish);
        let mark_finished = move || {
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                let callback = on_finish.borrow_mut().take();
                if let Some(callback) = callback {
                    callback();
                }
            }
        };

        if operation.is_finished() {
            mark_finished();
        } else {
            operation.on_state(OperationState::Finished, mark_finished);
        }
    }
}
