// src/operation.rs

//! The unit of work and its lifecycle.
//!
//! An [`Operation`] is a cheap, clonable handle. Host code configures it
//! (dependencies, observers, completion callback) while it is
//! `Initialized`; after that only the owning queue and the operation's own
//! body drive it forward:
//!
//! ```text
//! Initialized --enqueue--> Pending --main--> Executing --finish--> Finished
//!      \                      \                  (cancel marks only)  ^
//!       `------------------cancel--------------------------------------'
//! ```
//!
//! No borrow of the shared state is held while user code (body, observers,
//! completion callback, state waiters) runs, so that code is free to call
//! back into the operation, e.g. to cancel it.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace};

use crate::errors::{OpQueueError, Result};
use crate::naming::NameCounter;
use crate::observer::Observer;
use crate::state::{OperationState, StateMachine, StateWaiter};

type Body = Box<dyn FnOnce(Finisher)>;
type CompletionHandler = Box<dyn FnOnce()>;

/// Input extension: fills the input slot right before execution and
/// reports whether it ended up populated.
pub(crate) trait InputResolver {
    fn resolve(&self) -> bool;
}

/// Output extension: lets `finish` check that a result was produced.
pub(crate) trait OutputProbe {
    fn has_output(&self) -> bool;
}

struct Inner {
    name: String,
    machine: StateMachine,
    dependencies: Vec<Operation>,
    observers: Vec<Rc<dyn Observer>>,
    on_completion: Option<CompletionHandler>,
    cancelled: bool,
    enqueued: bool,
    body: Option<Body>,
    input: Option<Rc<dyn InputResolver>>,
    output: Option<Rc<dyn OutputProbe>>,
}

impl Drop for Inner {
    // Releasing the last handle of a long dependency chain would otherwise
    // recurse once per link.
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.dependencies);
        while let Some(dependency) = stack.pop() {
            if let Ok(cell) = Rc::try_unwrap(dependency.inner) {
                let mut inner = cell.into_inner();
                stack.append(&mut inner.dependencies);
            }
        }
    }
}

/// Identity of an operation, stable for as long as any handle is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(usize);

/// Handle to a unit of work.
///
/// Clones refer to the same operation; equality is identity.
#[derive(Clone)]
pub struct Operation {
    inner: Rc<RefCell<Inner>>,
}

/// Non-owning handle, used by queues so that bookkeeping callbacks do not
/// keep an operation alive.
#[derive(Clone)]
pub struct WeakOperation {
    inner: Weak<RefCell<Inner>>,
}

impl WeakOperation {
    pub fn upgrade(&self) -> Option<Operation> {
        self.inner.upgrade().map(|inner| Operation { inner })
    }
}

impl Operation {
    /// Create an operation named by the thread's shared operation counter.
    ///
    /// The body receives a [`Finisher`] and must call
    /// [`Finisher::finish`] exactly once, synchronously or later.
    pub fn new(body: impl FnOnce(Finisher) + 'static) -> Self {
        Self::with_counter(&NameCounter::operations(), body)
    }

    /// Create an operation named by `counter`.
    pub fn with_counter(counter: &NameCounter, body: impl FnOnce(Finisher) + 'static) -> Self {
        Self::from_parts(counter.next_name(), Box::new(body), None, None)
    }

    pub(crate) fn from_parts(
        name: String,
        body: Body,
        input: Option<Rc<dyn InputResolver>>,
        output: Option<Rc<dyn OutputProbe>>,
    ) -> Self {
        let inner = Inner {
            name,
            machine: StateMachine::new(),
            dependencies: Vec::new(),
            observers: Vec::new(),
            on_completion: None,
            cancelled: false,
            enqueued: false,
            body: Some(body),
            input,
            output,
        };

        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    pub fn id(&self) -> OperationId {
        OperationId(Rc::as_ptr(&self.inner) as *const () as usize)
    }

    pub fn downgrade(&self) -> WeakOperation {
        WeakOperation {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        self.ensure_initialized("rename the operation")?;
        self.inner.borrow_mut().name = name.into();
        Ok(())
    }

    pub fn state(&self) -> OperationState {
        self.inner.borrow().machine.current()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == OperationState::Finished
    }

    pub fn is_executing(&self) -> bool {
        self.state() == OperationState::Executing
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().cancelled
    }

    /// Whether the operation has ever been handed to a queue.
    pub fn was_enqueued(&self) -> bool {
        self.inner.borrow().enqueued
    }

    pub(crate) fn mark_enqueued(&self) {
        self.inner.borrow_mut().enqueued = true;
    }

    /// Snapshot of the dependency list, in insertion order.
    pub fn dependencies(&self) -> Vec<Operation> {
        self.inner.borrow().dependencies.clone()
    }

    pub fn add_dependency(&self, dependency: &Operation) -> Result<()> {
        self.ensure_initialized("add a dependency")?;
        self.inner
            .borrow_mut()
            .dependencies
            .push(dependency.clone());
        Ok(())
    }

    pub fn add_dependencies<'a>(
        &self,
        dependencies: impl IntoIterator<Item = &'a Operation>,
    ) -> Result<()> {
        for dependency in dependencies {
            self.add_dependency(dependency)?;
        }
        Ok(())
    }

    pub fn add_observer(&self, observer: impl Observer + 'static) -> Result<()> {
        self.ensure_initialized("add an observer")?;
        self.inner.borrow_mut().observers.push(Rc::new(observer));
        Ok(())
    }

    /// Set the completion callback, replacing any previous one.
    ///
    /// It runs once, after the observers were notified of the outcome.
    pub fn set_on_completion(&self, handler: impl FnOnce() + 'static) -> Result<()> {
        self.ensure_initialized("set a completion handler")?;
        self.inner.borrow_mut().on_completion = Some(Box::new(handler));
        Ok(())
    }

    /// Register a one-shot callback for the transition into `target`.
    ///
    /// The callback never fires if `target` has already been reached or is
    /// skipped by cancellation.
    pub fn on_state(&self, target: OperationState, callback: impl FnOnce() + 'static) {
        self.inner
            .borrow_mut()
            .machine
            .subscribe(target, Box::new(callback));
    }

    /// Cancel the operation.
    ///
    /// The flag is sticky. An operation that has not started executing
    /// finishes right away with the cancelled outcome. An executing one is
    /// only marked: its body still has to call `finish`, and that call
    /// completes it as cancelled.
    pub fn cancel(&self) {
        let state = {
            let mut inner = self.inner.borrow_mut();
            inner.cancelled = true;
            inner.machine.current()
        };

        match state {
            OperationState::Finished => {
                trace!(operation = %self.name(), "cancel on a finished operation ignored");
            }
            OperationState::Executing => {
                debug!(
                    operation = %self.name(),
                    "cancelled while executing; completion waits for the body to finish"
                );
            }
            OperationState::Initialized | OperationState::Pending => {
                if let Err(err) = self.complete() {
                    error!(operation = %self.name(), %err, "failed to complete cancelled operation");
                    panic!("cancelling operation '{}' failed: {err}", self.name());
                }
            }
        }
    }

    /// Called by a queue when it accepts the operation.
    pub(crate) fn on_enqueue(&self) -> Result<()> {
        let (from, waiters, observers) = {
            let mut inner = self.inner.borrow_mut();
            let from = inner.machine.current();
            let waiters = inner.machine.advance(OperationState::Pending)?;
            (from, waiters, inner.observers.clone())
        };

        debug!(operation = %self.name(), %from, to = %OperationState::Pending, "state transition");
        fire(waiters);

        for observer in &observers {
            observer.enqueued(self);
        }

        Ok(())
    }

    /// Called by a queue once every dependency has finished.
    pub(crate) fn main(&self) -> Result<()> {
        let (state, cancelled, input) = {
            let inner = self.inner.borrow();
            (inner.machine.current(), inner.cancelled, inner.input.clone())
        };

        if state != OperationState::Pending {
            return Err(OpQueueError::UnexpectedState {
                operation: self.name(),
                state,
                cancelled,
            });
        }

        if let Some(input) = input {
            if !input.resolve() {
                debug!(operation = %self.name(), "input was not provided by injected operations; cancelling");
                self.cancel();
                return Ok(());
            }
        }

        debug!(operation = %self.name(), "operation will execute");
        let observers = self.inner.borrow().observers.clone();
        for observer in &observers {
            observer.will_execute(self);
        }

        let (waiters, body) = {
            let mut inner = self.inner.borrow_mut();
            // An observer may have cancelled the operation.
            if inner.machine.current() != OperationState::Pending {
                trace!(operation = %inner.name, "operation cancelled by an observer before executing");
                return Ok(());
            }
            let waiters = inner.machine.advance(OperationState::Executing)?;
            (waiters, inner.body.take())
        };

        debug!(
            operation = %self.name(),
            from = %OperationState::Pending,
            to = %OperationState::Executing,
            "state transition"
        );
        fire(waiters);

        if let Some(body) = body {
            body(Finisher {
                operation: self.clone(),
            });
        }

        Ok(())
    }

    /// Mark the operation finished. A second call is a no-op.
    pub(crate) fn finish(&self) -> Result<()> {
        let (state, cancelled, output) = {
            let inner = self.inner.borrow();
            (inner.machine.current(), inner.cancelled, inner.output.clone())
        };

        match state {
            OperationState::Finished => {
                trace!(operation = %self.name(), "ignored an attempt to finish the operation twice");
                return Ok(());
            }
            OperationState::Initialized => {
                return Err(OpQueueError::CannotFinish {
                    operation: self.name(),
                    state,
                });
            }
            OperationState::Pending | OperationState::Executing => {}
        }

        if let Some(output) = output {
            if !cancelled && !output.has_output() {
                return Err(OpQueueError::MissingOutput(self.name()));
            }
        }

        self.complete()
    }

    fn complete(&self) -> Result<()> {
        let (from, waiters, observers, cancelled, completion, body) = {
            let mut inner = self.inner.borrow_mut();
            let from = inner.machine.current();
            let waiters = inner.machine.advance(OperationState::Finished)?;
            (
                from,
                waiters,
                inner.observers.clone(),
                inner.cancelled,
                inner.on_completion.take(),
                inner.body.take(),
            )
        };
        // A body that never ran is released here, outside the borrow.
        drop(body);

        debug!(
            operation = %self.name(),
            %from,
            to = %OperationState::Finished,
            cancelled,
            "state transition"
        );
        fire(waiters);

        for observer in &observers {
            if cancelled {
                observer.cancelled(self);
            } else {
                observer.finished(self);
            }
        }

        if let Some(completion) = completion {
            completion();
        }

        Ok(())
    }

    pub(crate) fn ensure_initialized(&self, action: &'static str) -> Result<()> {
        let inner = self.inner.borrow();
        let state = inner.machine.current();
        if state == OperationState::Initialized {
            Ok(())
        } else {
            Err(OpQueueError::NotInitialized {
                operation: inner.name.clone(),
                action,
                state,
            })
        }
    }
}

fn fire(waiters: Vec<StateWaiter>) {
    for waiter in waiters {
        waiter();
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Operation {}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Operation")
                .field("name", &inner.name)
                .field("state", &inner.machine.current())
                .field("cancelled", &inner.cancelled)
                .field("dependencies", &inner.dependencies.len())
                .finish_non_exhaustive(),
            Err(_) => f.debug_struct("Operation").finish_non_exhaustive(),
        }
    }
}

/// The "declare finished" capability handed to an operation's body.
#[derive(Clone)]
pub struct Finisher {
    operation: Operation,
}

impl Finisher {
    /// Finish the operation. Calling it again is a harmless no-op.
    ///
    /// If the operation was cancelled while executing, this completes it
    /// with the cancelled outcome.
    pub fn finish(&self) -> Result<()> {
        self.operation.finish()
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn is_cancelled(&self) -> bool {
        self.operation.is_cancelled()
    }
}

impl fmt::Debug for Finisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finisher")
            .field("operation", &self.operation)
            .finish()
    }
}
